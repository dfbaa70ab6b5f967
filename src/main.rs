use attendance::app;
use attendance::config::Config;
use tracing_subscriber::EnvFilter;

/// Main entry point for the attendance web application
///
/// Loads `.env`, initializes logging, reads the configuration from the
/// environment, and runs the server until it is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    app::run(config).await
}
