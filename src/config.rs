use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Where the persisted artifacts live
    #[validate(nested)]
    pub artifacts: ArtifactConfig,

    /// Batch processing configuration
    #[serde(default)]
    #[validate(nested)]
    pub batch: BatchConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CONFIG_PATH").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load configuration, layering an explicit file over the embedded defaults
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        // Override with config file if it exists
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Config = builder
            // Override with environment variables (prefix: SRE__)
            .add_source(
                config::Environment::with_prefix("SRE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Path of the tabular copy of the batch output
    pub fn batch_csv_path(&self) -> PathBuf {
        self.batch.output_path.with_extension("csv")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ArtifactConfig {
    /// Fitted classifier artifact
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Fitted feature transform artifact
    #[serde(default = "default_transform_path")]
    pub transform_path: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            transform_path: default_transform_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchConfig {
    /// Default CSV input for batch runs
    #[serde(default)]
    pub input_path: Option<PathBuf>,

    /// JSON output for batch runs; the CSV copy sits next to it
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Log progress every N records
    #[serde(default = "default_progress_interval")]
    #[validate(range(min = 1))]
    pub progress_interval: usize,

    /// Number of recommendation actions kept per batch row
    #[serde(default = "default_top_recommendations")]
    #[validate(range(min = 1, max = 8))]
    pub top_recommendations: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: default_output_path(),
            progress_interval: default_progress_interval(),
            top_recommendations: default_top_recommendations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

// Default value functions
fn default_model_path() -> PathBuf {
    PathBuf::from("models/final_model.json")
}

fn default_transform_path() -> PathBuf {
    PathBuf::from("models/preprocessor.json")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("results/batch_predictions.json")
}

fn default_progress_interval() -> usize {
    100
}

fn default_top_recommendations() -> usize {
    3
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.batch.progress_interval, 100);
        assert_eq!(config.batch.top_recommendations, 3);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embedded_defaults_match_default_impl() {
        let loaded = Config::load_from(None).unwrap();
        let default = Config::default();
        assert_eq!(loaded.artifacts.model_path, default.artifacts.model_path);
        assert_eq!(loaded.artifacts.transform_path, default.artifacts.transform_path);
        assert_eq!(loaded.batch.output_path, default.batch.output_path);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[artifacts]\nmodel_path = \"/srv/models/gbt.json\"\n\n[batch]\nprogress_interval = 25"
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.artifacts.model_path, PathBuf::from("/srv/models/gbt.json"));
        assert_eq!(config.batch.progress_interval, 25);
        assert_eq!(
            config.artifacts.transform_path,
            PathBuf::from("models/preprocessor.json")
        );
    }

    #[test]
    fn test_zero_progress_interval_rejected() {
        let mut config = Config::default();
        config.batch.progress_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_csv_path() {
        let config = Config::default();
        assert_eq!(
            config.batch_csv_path(),
            PathBuf::from("results/batch_predictions.csv")
        );
    }
}
