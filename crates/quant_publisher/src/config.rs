use crate::models::error::ConfigError;
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const CONFIG_PATH_VAR: &str = "QUANT_PUBLISHER_CONFIG";

#[derive(Debug, Clone)]
pub struct Config {
    pub model: ModelConfig,
    pub quantization: QuantizationConfig,
    pub quantizer: QuantizerConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_id: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct QuantizationConfig {
    pub method: QuantMethod,
    pub bits: u8,
    /// `-1` asks for per-channel quantization.
    pub group_size: i32,
    pub formats: String,
    pub recipe: String,
    pub low_mem: bool,
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantMethod {
    /// Rounding-based post-training quantization.
    AutoRound,
    /// Calibration-driven GPTQ.
    Gptq,
}

impl QuantMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantMethod::AutoRound => "auto-round",
            QuantMethod::Gptq => "gptq",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "auto-round" | "auto_round" | "autoround" => Ok(QuantMethod::AutoRound),
            "gptq" => Ok(QuantMethod::Gptq),
            other => Err(ConfigError::Invalid {
                key: "QUANT_METHOD",
                reason: format!("unknown method '{}', expected auto-round or gptq", other),
            }),
        }
    }
}

impl fmt::Display for QuantMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct QuantizerConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub skip: bool,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub enabled: bool,
    pub target: UploadTarget,
}

/// Where a finished archive goes once uploading is enabled.
#[derive(Debug, Clone)]
pub enum UploadTarget {
    Local,
    Zipline(FileHostConfig),
    Unsupported(String),
}

impl UploadTarget {
    pub fn name(&self) -> &str {
        match self {
            UploadTarget::Local => "local",
            UploadTarget::Zipline(_) => "zipline",
            UploadTarget::Unsupported(name) => name,
        }
    }

    fn select(name: &str, host: FileHostConfig) -> Self {
        match name.trim().to_lowercase().as_str() {
            "local" => UploadTarget::Local,
            "zipline" => UploadTarget::Zipline(host),
            _ => UploadTarget::Unsupported(name.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileHostConfig {
    pub domain: String,
    pub token: SecretString,
    pub scheme: String,
}

impl FileHostConfig {
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            token: SecretString::new(token.into()),
            scheme: "https".to_string(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                reason: format!("unknown format '{}', expected pretty or json", other),
            }),
        }
    }
}

// Flat view of the environment; keys are the lowercased variable names.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    model_id: Option<String>,
    bits: u8,
    group_size: i32,
    formats: String,
    recipe: String,
    low_mem: bool,
    quant_method: String,
    dataset: Option<String>,
    output_dir: PathBuf,
    quantizer_command: String,
    skip_quantize: bool,
    upload_enabled: bool,
    upload_type: String,
    zipline_domain: String,
    zipline_token: String,
    zipline_scheme: String,
    log_level: String,
    log_format: String,
}

impl Config {
    /// Layers an optional settings file under the process environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::from_sources(path, config::Environment::default())
    }

    pub fn from_sources(path: Option<&str>, env: config::Environment) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("bits", 4_i64)?
            .set_default("group_size", 128_i64)?
            .set_default("formats", "auto_round")?
            .set_default("recipe", "auto-round")?
            .set_default("low_mem", false)?
            .set_default("quant_method", "auto-round")?
            .set_default("output_dir", "/app/output")?
            .set_default("quantizer_command", "python3 /app/quantize.py")?
            .set_default("skip_quantize", false)?
            .set_default("upload_enabled", false)?
            .set_default("upload_type", "local")?
            .set_default("zipline_domain", "")?
            .set_default("zipline_token", "")?
            .set_default("zipline_scheme", "https")?
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder.add_source(env).build()?;
        let raw: EnvSettings = settings.try_deserialize()?;
        raw.into_config()
    }
}

impl EnvSettings {
    fn into_config(self) -> Result<Config, ConfigError> {
        let model_id = self
            .model_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::Missing("MODEL_ID"))?;

        if !(1..=8).contains(&self.bits) {
            return Err(ConfigError::Invalid {
                key: "BITS",
                reason: format!("{} is outside 1..=8", self.bits),
            });
        }

        if self.group_size == 0 || self.group_size < -1 {
            return Err(ConfigError::Invalid {
                key: "GROUP_SIZE",
                reason: format!("{} must be positive or -1", self.group_size),
            });
        }

        let formats = self.formats.trim().to_string();
        if formats.is_empty() || formats.contains(',') {
            return Err(ConfigError::Invalid {
                key: "FORMATS",
                reason: format!("'{}' must name exactly one format", self.formats),
            });
        }

        let command: Vec<String> = self
            .quantizer_command
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if command.is_empty() && !self.skip_quantize {
            return Err(ConfigError::Invalid {
                key: "QUANTIZER_COMMAND",
                reason: "command is empty".to_string(),
            });
        }

        let host = FileHostConfig::new(self.zipline_domain.trim(), self.zipline_token.trim())
            .with_scheme(self.zipline_scheme.trim());

        Ok(Config {
            model: ModelConfig {
                model_id,
                output_dir: self.output_dir,
            },
            quantization: QuantizationConfig {
                method: QuantMethod::parse(&self.quant_method)?,
                bits: self.bits,
                group_size: self.group_size,
                formats,
                recipe: self.recipe,
                low_mem: self.low_mem,
                dataset: self.dataset.filter(|d| !d.trim().is_empty()),
            },
            quantizer: QuantizerConfig {
                command,
                skip: self.skip_quantize,
            },
            upload: UploadConfig {
                enabled: self.upload_enabled,
                target: UploadTarget::select(&self.upload_type, host),
            },
            logging: LoggingConfig {
                level: self.log_level,
                format: LogFormat::parse(&self.log_format)?,
            },
        })
    }
}
