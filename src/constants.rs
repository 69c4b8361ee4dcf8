// Constants module - centralized default values for configuration
//
// Every serde default in `config` resolves to one of these.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Image backend defaults
// =============================================================================

/// Default backend request timeout in seconds
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// Plain-HTTP port of the internal image backend
pub const DEFAULT_BACKEND_PORT: u16 = 80;

// =============================================================================
// CDN defaults
// =============================================================================

/// Default result-storage prefix written into cache entries
pub const DEFAULT_RESULT_STORAGE: &str = "results";

/// TLS port used when proxying hits to the CDN
pub const DEFAULT_CDN_TLS_PORT: u16 = 443;

/// Plain port used when proxying hits to the CDN over http
pub const DEFAULT_CDN_PLAIN_PORT: u16 = 80;

// =============================================================================
// Database defaults
// =============================================================================

/// Default SQLite database file
pub const DEFAULT_SQLITE_PATH: &str = "thumbgate.db";

/// Default MySQL pool size
pub const DEFAULT_MYSQL_MAX_CONNECTIONS: u32 = 10;

// =============================================================================
// Analytics defaults
// =============================================================================

/// Default timeout for the CDN byte-size probe in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Logging defaults
// =============================================================================

/// Default log level when RUST_LOG is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";
