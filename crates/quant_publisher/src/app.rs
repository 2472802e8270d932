//! Run sequencing: quantize, then publish

use quant_publisher::config::Config;
use quant_publisher::models::error::PipelineError;
use quant_publisher::models::types::{ArtifactDirectory, PublishReport};
use quant_publisher::services::pipeline::PublishPipeline;
use quant_publisher::services::quantizer::QuantizerRunner;
use tokio::fs;
use tracing::info;

pub struct App {
    artifact: ArtifactDirectory,
    quantizer: Option<QuantizerRunner>,
    pipeline: PublishPipeline,
}

impl App {
    pub fn initialize(config: &Config) -> Self {
        let artifact = ArtifactDirectory::for_model(
            &config.model.output_dir,
            &config.model.model_id,
            config.quantization.bits,
        );

        let quantizer = if config.quantizer.skip {
            None
        } else {
            Some(QuantizerRunner::new(&config.quantizer))
        };

        Self {
            artifact,
            quantizer,
            pipeline: PublishPipeline::from_config(&config.upload),
        }
    }

    /// Quantizer and archive failures are fatal; upload failures only show up
    /// in the returned report.
    pub async fn run(&self, config: &Config) -> Result<PublishReport, PipelineError> {
        match &self.quantizer {
            Some(runner) => {
                fs::create_dir_all(&config.model.output_dir).await?;
                runner
                    .quantize(&config.model, &config.quantization, &self.artifact)
                    .await?;
            }
            None => {
                info!(
                    artifact = %self.artifact.path.display(),
                    "Quantizer skipped, publishing existing artifact"
                );
            }
        }

        Ok(self.pipeline.run(&self.artifact.path).await?)
    }
}
