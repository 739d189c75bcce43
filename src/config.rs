use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::profile::AgentProfile;

/// Main configuration structure for the Society Protocol services
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SocietyConfig {
    /// Log store location
    pub storage: StorageConfig,
    /// Message bus settings
    pub bus: BusConfig,
    /// Fusion coordinator settings
    pub fusion: FusionConfig,
    /// Health scoring weights and windows
    pub health: HealthConfig,
    /// Recovery orchestrator settings and agent profiles
    pub recovery: RecoveryConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the JSONL logs
    pub data_dir: PathBuf,
    /// Satisfaction feed file, relative paths resolve against `data_dir`
    pub satisfaction_feed: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".society"),
            satisfaction_feed: PathBuf::from("satisfaction.jsonl"),
        }
    }
}

impl StorageConfig {
    pub fn satisfaction_feed_path(&self) -> PathBuf {
        if self.satisfaction_feed.is_absolute() {
            self.satisfaction_feed.clone()
        } else {
            self.data_dir.join(&self.satisfaction_feed)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bounded dispatch queue capacity
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { queue_capacity: 1024 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Bus name the coordinator registers under; agents reply to it
    pub agent_name: String,
    /// Timeout applied when a request does not carry its own
    pub default_timeout_secs: u64,
    /// Completed results kept in memory before falling back to the log
    pub max_cached_results: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            agent_name: "fusion_protocol".to_string(),
            default_timeout_secs: 30,
            max_cached_results: 1000,
        }
    }
}

/// Health score weights. The defaults are empirical and meant to be tuned.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub response_weight: f64,
    pub response_target: f64,
    pub satisfaction_weight: f64,
    pub satisfaction_target: f64,
    pub error_weight: f64,
    /// Silence tolerated before the inactivity penalty starts
    pub active_window_hours: f64,
    /// Hours over which the penalty ramps up to its cap
    pub inactivity_ramp_hours: f64,
    pub max_inactivity_penalty: f64,
    pub never_active_penalty: f64,
    pub default_satisfaction: f64,
    /// Number of most recent satisfaction samples averaged
    pub satisfaction_sample_window: usize,
    /// Threshold for agents whose profile does not set one
    pub default_threshold: f64,
    /// Recovery records within the window that trip the loop breaker
    pub loop_breaker_attempts: usize,
    pub loop_breaker_window_hours: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            response_weight: 0.5,
            response_target: 0.8,
            satisfaction_weight: 0.3,
            satisfaction_target: 0.5,
            error_weight: 0.7,
            active_window_hours: 24.0,
            inactivity_ramp_hours: 48.0,
            max_inactivity_penalty: 0.5,
            never_active_penalty: 0.3,
            default_satisfaction: 0.5,
            satisfaction_sample_window: 10,
            default_threshold: 0.5,
            loop_breaker_attempts: 3,
            loop_breaker_window_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Bus name used as sender of `agent_resurrected` broadcasts
    pub agent_name: String,
    /// Upper bound on a configured restart command
    pub restart_timeout_secs: u64,
    /// Interval of the `watch` sweep
    pub sweep_interval_secs: u64,
    /// Agents under recovery supervision
    pub agents: Vec<AgentProfile>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            agent_name: "resurrection_engine".to_string(),
            restart_timeout_secs: 60,
            sweep_interval_secs: 300,
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl SocietyConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`society.toml`, or the explicit path)
    /// 3. Environment variables (prefixed with `SOCIETY__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None if Path::new("society.toml").exists() => {
                builder = builder.add_source(File::with_name("society"));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("SOCIETY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: SocietyConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_weights() {
        let health = HealthConfig::default();
        assert_eq!(health.response_weight, 0.5);
        assert_eq!(health.satisfaction_weight, 0.3);
        assert_eq!(health.error_weight, 0.7);
        assert_eq!(health.loop_breaker_attempts, 3);
        assert_eq!(health.loop_breaker_window_hours, 24);
    }

    #[test]
    fn test_load_from_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("society.toml");
        std::fs::write(
            &path,
            r#"
[bus]
queue_capacity = 16

[[recovery.agents]]
name = "Anima"
main_artifact = "agents/anima.py"
backup_dir = "backups"
health_threshold = 0.4
"#,
        )
        .unwrap();

        let config = SocietyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bus.queue_capacity, 16);
        assert_eq!(config.fusion.default_timeout_secs, 30);
        assert_eq!(config.recovery.agents.len(), 1);
        assert_eq!(config.recovery.agents[0].health_threshold, 0.4);
        assert_eq!(config.recovery.agents[0].backups_to_keep, 5);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = SocietyConfig::default();
        config.fusion.default_timeout_secs = 7;
        config.save_to_file(&path).unwrap();

        let reloaded = SocietyConfig::load(Some(&path)).unwrap();
        assert_eq!(reloaded.fusion.default_timeout_secs, 7);
        assert_eq!(reloaded.health, HealthConfig::default());
    }

    #[test]
    fn test_relative_feed_path_resolves_against_data_dir() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/var/society"),
            satisfaction_feed: PathBuf::from("feed.jsonl"),
        };
        assert_eq!(
            storage.satisfaction_feed_path(),
            PathBuf::from("/var/society/feed.jsonl")
        );
    }
}
