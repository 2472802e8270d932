//! Runs the external quantizer program
//!
//! The quantizer is opaque: it reads its parameters from the environment and
//! must leave the artifact directory at `OUTPUT_PATH`.

use crate::config::{ModelConfig, QuantizationConfig, QuantizerConfig};
use crate::models::error::QuantizeError;
use crate::models::types::ArtifactDirectory;
use std::process::Command;
use tracing::{info, instrument};

pub struct QuantizerRunner {
    command: Vec<String>,
}

impl QuantizerRunner {
    pub fn new(config: &QuantizerConfig) -> Self {
        Self {
            command: config.command.clone(),
        }
    }

    pub fn from_command<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
        }
    }

    #[instrument(skip_all, fields(model = %model.model_id, artifact = %artifact.name))]
    pub async fn quantize(
        &self,
        model: &ModelConfig,
        quantization: &QuantizationConfig,
        artifact: &ArtifactDirectory,
    ) -> Result<(), QuantizeError> {
        let mut cmd = self.build_command(model, quantization, artifact)?;

        info!(
            bits = quantization.bits,
            group_size = quantization.group_size,
            formats = %quantization.formats,
            method = %quantization.method,
            output = %artifact.path.display(),
            "Starting quantizer"
        );

        let status = tokio::task::spawn_blocking(move || cmd.status())
            .await
            .map_err(|e| QuantizeError::Spawn(std::io::Error::other(format!("Task join error: {}", e))))??;

        if !status.success() {
            return Err(QuantizeError::CommandFailed(status.to_string()));
        }

        if !artifact.path.is_dir() {
            return Err(QuantizeError::MissingOutput(artifact.path.clone()));
        }

        info!(output = %artifact.path.display(), "Quantizer finished");
        Ok(())
    }

    fn build_command(
        &self,
        model: &ModelConfig,
        quantization: &QuantizationConfig,
        artifact: &ArtifactDirectory,
    ) -> Result<Command, QuantizeError> {
        let (program, args) = self.command.split_first().ok_or(QuantizeError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("MODEL_ID", &model.model_id)
            .env("BITS", quantization.bits.to_string())
            .env("GROUP_SIZE", quantization.group_size.to_string())
            .env("FORMATS", &quantization.formats)
            .env("RECIPE", &quantization.recipe)
            .env("LOW_MEM", quantization.low_mem.to_string())
            .env("QUANT_METHOD", quantization.method.as_str())
            .env("OUTPUT_PATH", &artifact.path);

        if let Some(dataset) = &quantization.dataset {
            cmd.env("DATASET", dataset);
        }

        Ok(cmd)
    }
}
