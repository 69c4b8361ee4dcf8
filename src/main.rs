use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use thumbgate::analytics::{AnalyticsAggregator, HttpSizeProbe};
use thumbgate::config::Config;
use thumbgate::proxy::ThumbgateProxy;
use thumbgate::resolver::CacheResolver;
use thumbgate::store::{ImageStore, LazyStore};

/// Thumbgate - image transformation gateway built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "thumbgate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,
}

fn main() {
    let args = Args::parse();

    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    thumbgate::logging::init_subscriber(&config.logging)
        .expect("Failed to initialize logging subsystem");

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        backend = %config.backend.host,
        cdn = %config.cdn.origin,
        hit_mode = ?config.cdn.hit_mode,
        "Configuration loaded successfully"
    );

    // Opened on first use, inside the proxy runtime and after any daemon fork.
    let store: Arc<dyn ImageStore> = Arc::new(LazyStore::new(config.database.clone()));

    let probe = HttpSizeProbe::new(config.analytics.probe_timeout()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create size probe");
        std::process::exit(1);
    });
    let analytics = AnalyticsAggregator::new(store.clone(), Arc::new(probe));
    let resolver = CacheResolver::new(store.clone(), analytics, config.cdn.clone());

    let opt = Opt {
        daemon: args.daemon,
        test: args.test,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt)).expect("Failed to create Pingora server");
    server.bootstrap();

    let listen_addr = format!("{}:{}", config.server.address, config.server.port);
    let threads = config.server.threads;
    let proxy = ThumbgateProxy::new(config, store, resolver);

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    proxy_service.add_tcp(&listen_addr);
    proxy_service.threads = Some(threads);

    tracing::info!(
        address = %listen_addr,
        threads = threads,
        "Starting Thumbgate"
    );

    server.add_service(proxy_service);

    // Run server forever (blocks until shutdown)
    server.run_forever();
}
