//! Podwatch - pod restart alerts for chat webhooks
//!
//! Main entry point for the podwatch CLI.

use anyhow::Result;

use podwatch::cli::{Cli, Commands};
use podwatch::commands;
use podwatch::config::Config;
use podwatch::watcher::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load(&cli.config, &cli)?;

    // Validate configuration
    config.validate()?;

    init_logging(&config.logging)?;
    init_metrics_exporter();

    match cli.command {
        Commands::Validate(args) => {
            tracing::debug!("Validating subscriptions from {}", args.subscriptions.display());
            commands::validate::run_validate(args)?;
            Ok(())
        }
        Commands::Replay(args) => {
            tracing::info!("Starting replay");
            commands::replay::run_replay(config, args).await?;
            Ok(())
        }
    }
}

/// Install the Prometheus exporter when built with the `prometheus` feature
fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let _ = PrometheusBuilder::new().install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
