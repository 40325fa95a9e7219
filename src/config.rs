//! Configuration for seqflow runs.

use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Input configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// File to read records from (`None` or `-` reads stdin)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File to write records to (`None` or `-` writes stdout)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of chunks transformed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Records per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Capacity of the completion channel (defaults to concurrency)
    #[serde(default)]
    pub completion_buffer: Option<usize>,

    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Enable metrics reporting
    #[serde(default)]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            completion_buffer: None,
            worker_threads: None,
            enable_metrics: false,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
        }
    }
}

impl ProcessingConfig {
    /// Settings for the core pipeline.
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.concurrency,
            completion_buffer: self.completion_buffer,
            enable_metrics: self.enable_metrics,
            metrics_interval_secs: self.metrics_interval_secs,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // Try YAML first (it's a superset of JSON)
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing.concurrency == 0 {
            anyhow::bail!("Concurrency must be > 0");
        }
        if self.processing.chunk_size == 0 {
            anyhow::bail!("Chunk size must be > 0");
        }
        if self.processing.completion_buffer == Some(0) {
            anyhow::bail!("Completion buffer must be > 0");
        }
        if self.processing.worker_threads == Some(0) {
            anyhow::bail!("Worker threads must be > 0");
        }
        if self.processing.enable_metrics && self.processing.metrics_interval_secs == 0 {
            anyhow::bail!("Metrics interval must be > 0 when metrics are enabled");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_concurrency() -> usize { 4 }
fn default_chunk_size() -> usize { 1000 }
fn default_metrics_interval() -> u64 { 10 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_processing() {
        let processing = ProcessingConfig::default();
        assert_eq!(processing.concurrency, 4);
        assert_eq!(processing.chunk_size, 1000);
        assert_eq!(processing.metrics_interval_secs, 10);
        assert!(!processing.enable_metrics);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.input.path.is_none());
        assert!(config.output.path.is_none());
        assert_eq!(config.processing.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
input:
  path: reads.txt
processing:
  concurrency: 16
  chunk_size: 250
  completion_buffer: 64
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.input.path, Some(PathBuf::from("reads.txt")));
        assert_eq!(config.processing.concurrency, 16);
        assert_eq!(config.processing.chunk_size, 250);

        let pipeline = config.processing.to_pipeline_config();
        assert_eq!(pipeline.concurrency, 16);
        assert_eq!(pipeline.completion_capacity(), 64);
    }

    #[test]
    fn test_from_json() {
        let config =
            Config::from_json(r#"{"processing": {"concurrency": 2, "enable_metrics": true}}"#)
                .unwrap();
        assert_eq!(config.processing.concurrency, 2);
        assert!(config.processing.enable_metrics);
        assert_eq!(config.processing.chunk_size, 1000);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.processing.concurrency = 12;
        config.output.path = Some(PathBuf::from("out.txt"));

        let parsed = Config::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed.processing.concurrency, 12);
        assert_eq!(parsed.output.path, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("config.json");
        std::fs::write(&json_path, r#"{"processing": {"chunk_size": 10}}"#).unwrap();
        assert_eq!(Config::from_file(&json_path).unwrap().processing.chunk_size, 10);

        let yaml_path = dir.path().join("config.conf");
        std::fs::write(&yaml_path, "processing:\n  chunk_size: 20\n").unwrap();
        assert_eq!(Config::from_file(&yaml_path).unwrap().processing.chunk_size, 20);
    }

    #[test]
    fn test_config_validation_invalid() {
        let mut config = Config::default();
        config.processing.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processing.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processing.completion_buffer = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processing.enable_metrics = true;
        config.processing.metrics_interval_secs = 0;
        assert!(config.validate().is_err());

        // Interval is ignored while metrics are off
        config.processing.enable_metrics = false;
        assert!(config.validate().is_ok());
    }
}
