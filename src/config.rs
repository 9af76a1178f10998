//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Built-in defaults
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables with an `APP_` prefix
//! - `HOST`/`PORT` overrides used by deployment platforms
//!
//! Later sources win. `validate()` runs after loading so a bad port or an
//! unknown model name fails at startup instead of on the first request.

use crate::model::catalog::ModelSize;
use crate::model::device::DevicePreference;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub jobs: JobsConfig,
    pub model: ModelConfig,
    pub worker: WorkerConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Job lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How many transcriptions may run at once. The accelerator serves one
    /// inference at a time, so 1 is the sensible default.
    pub max_concurrent: usize,

    /// How long finished job records stay queryable before the sweep deletes
    /// them, in seconds.
    pub retention_seconds: u64,

    /// How often the retention sweep runs, in seconds.
    pub sweep_interval_seconds: u64,

    /// Minimum spacing between timestamp-derived progress updates, in
    /// milliseconds.
    pub progress_interval_ms: u64,

    /// Where uploaded audio lands until its job finishes
    pub temp_input_dir: PathBuf,

    /// Where workers write result artifacts
    pub temp_output_dir: PathBuf,
}

/// Model slot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used when a submission does not name one
    pub default_model: String,

    /// Idle seconds before the loaded model is evicted; 0 disables eviction
    pub idle_timeout_seconds: u64,

    /// Device preference: auto, cpu, cuda, metal
    pub device: String,

    /// Base URL of the sibling service asked to free accelerator memory
    /// before a model load. Disabled when unset.
    pub sibling_url: Option<String>,
}

/// Transcriber process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Program and leading arguments; input path, artifact path, and model
    /// name are appended per job
    pub command: Vec<String>,

    /// Seconds a terminated worker gets before SIGKILL
    pub grace_period_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            jobs: JobsConfig {
                max_concurrent: 1,
                retention_seconds: 3600,
                sweep_interval_seconds: 300,
                progress_interval_ms: 1000,
                temp_input_dir: PathBuf::from("temp_inputs"),
                temp_output_dir: PathBuf::from("temp_outputs"),
            },
            model: ModelConfig {
                default_model: "tiny".to_string(),
                idle_timeout_seconds: 300,
                device: "auto".to_string(),
                sibling_url: None,
            },
            worker: WorkerConfig {
                command: vec!["python3".to_string(), "transcribe.py".to_string()],
                grace_period_seconds: 5,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly provide these without the prefix.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check that the loaded values can actually run a server.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.jobs.max_concurrent == 0 {
            return Err(anyhow::anyhow!("jobs.max_concurrent must be greater than 0"));
        }

        if self.jobs.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!(
                "jobs.sweep_interval_seconds must be greater than 0"
            ));
        }

        if self.worker.command.is_empty() {
            return Err(anyhow::anyhow!("worker.command cannot be empty"));
        }

        if self.worker.grace_period_seconds == 0 {
            return Err(anyhow::anyhow!(
                "worker.grace_period_seconds must be greater than 0"
            ));
        }

        ModelSize::from_str(&self.model.default_model)
            .map_err(|err| anyhow::anyhow!("model.default_model: {}", err))?;
        DevicePreference::from_str(&self.model.device)
            .map_err(|err| anyhow::anyhow!("model.device: {}", err))?;

        Ok(())
    }

    pub fn device_preference(&self) -> DevicePreference {
        DevicePreference::from_str(&self.model.device).unwrap_or_default()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.model.idle_timeout_seconds)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.jobs.retention_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.jobs.sweep_interval_seconds)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.jobs.progress_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.worker.grace_period_seconds)
    }
}
