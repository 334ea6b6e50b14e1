use std::sync::Arc;

use tracing::{error, info};

use newsdesk::{Aggregator, Config, WebServer};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = newsdesk::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        newsdesk::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Newsdesk - RSS aggregator");
    info!(sources = config.sources.len(), "Source registry loaded");

    let aggregator = match Aggregator::from_config(&config) {
        Ok(aggregator) => Arc::new(aggregator),
        Err(e) => {
            error!("Failed to create aggregator: {}", e);
            std::process::exit(1);
        }
    };

    let server = match WebServer::new(&config.server, aggregator, config.dedupe.default_threshold)
    {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create web server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
