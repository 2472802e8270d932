mod app;

use quant_publisher::config::{self, Config};
use quant_publisher::models::types::PublishOutcome;
use quant_publisher::utils::logging;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var(config::CONFIG_PATH_VAR).ok();
    let config = Config::load(config_path.as_deref());

    // Logging comes up before config errors are reported
    let logging_config = config.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    logging::init(&logging_config);

    let config = config.map_err(|e| {
        error!("Failed to load config: {}", e);
        e
    })?;

    info!(
        model = %config.model.model_id,
        bits = config.quantization.bits,
        group_size = config.quantization.group_size,
        formats = %config.quantization.formats,
        method = %config.quantization.method,
        "Starting quantization run"
    );

    let app = app::App::initialize(&config);
    let report = app.run(&config).await.map_err(|e| {
        error!(error = %e, "Run failed");
        e
    })?;

    match &report.outcome {
        PublishOutcome::Uploaded { url, .. } => {
            info!(url = %url, "Artifact published");
        }
        PublishOutcome::UploadFailed { .. } | PublishOutcome::UnsupportedTarget(_) => {
            warn!(
                archive = %report.archive.path.display(),
                outcome = %report.outcome,
                "Run finished without publishing; archive kept"
            );
        }
        PublishOutcome::Disabled | PublishOutcome::KeptLocal => {
            info!(
                archive = %report.archive.path.display(),
                size = report.archive.size,
                "Run finished; archive kept locally"
            );
        }
    }

    Ok(())
}
