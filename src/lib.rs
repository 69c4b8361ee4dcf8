// Thumbgate image transformation gateway library

pub mod analytics;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod resolver;
pub mod router;
pub mod signing;
pub mod store;
pub mod transform;
