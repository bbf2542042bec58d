//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so a partial file (or no file) is valid.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::error::{AftError, Result};
use crate::programming::{AckMode, Persistence};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Programming log behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammingConfig {
    /// Whether results wait for forwarding-plane confirmation
    #[serde(default = "default_ack_mode")]
    pub ack_mode: AckMode,

    /// What happens to a session's entries when it closes
    #[serde(default = "default_persistence")]
    pub persistence: Persistence,

    /// Upper bound on waiting for a FIB acknowledgement
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,

    /// Forwarding table size; 0 means unbounded
    #[serde(default)]
    pub fib_capacity: usize,

    /// Completed operation results retained for later queries; 0 keeps all,
    /// otherwise at least [`MIN_RESULT_HISTORY`]
    #[serde(default = "default_result_history")]
    pub result_history: usize,
}

/// Resolution engine limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Maximum number of backup hops plus nested lookups per resolution
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

/// Traffic validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Absolute tolerance for loss and per-egress ratios (0.02 = 2%)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Skip traffic checks entirely when false
    #[serde(default = "default_traffic_checks")]
    pub traffic_checks: bool,

    /// Packets sent per flow by simulated traffic runs
    #[serde(default = "default_packets_per_flow")]
    pub packets_per_flow: u64,
}

/// Polling used while waiting for resolution to converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Parameters for scale scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default = "default_prefix_count")]
    pub prefix_count: usize,

    /// Distinct groups the prefixes are spread over
    #[serde(default = "default_nhg_pool")]
    pub nhg_pool: usize,

    #[serde(default = "default_network_instances")]
    pub network_instances: usize,

    /// Times the full delete batch is replayed
    #[serde(default = "default_delete_passes")]
    pub delete_passes: usize,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AftConfig {
    #[serde(default)]
    pub programming: ProgrammingConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub convergence: ConvergenceConfig,

    #[serde(default)]
    pub scale: ScaleConfig,
}

fn default_ack_mode() -> AckMode {
    AckMode::RibAndFib
}

fn default_persistence() -> Persistence {
    Persistence::Preserve
}

fn default_ack_timeout() -> u64 {
    60
}

/// Smallest bounded result history. A batch larger than this still keeps
/// its own results until they settle.
pub const MIN_RESULT_HISTORY: usize = 64;

fn default_result_history() -> usize {
    65_536
}

fn default_max_depth() -> u32 {
    8
}

fn default_tolerance() -> f64 {
    0.02
}

fn default_traffic_checks() -> bool {
    true
}

fn default_packets_per_flow() -> u64 {
    10_000
}

fn default_attempts() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    500
}

fn default_prefix_count() -> usize {
    1_000
}

fn default_nhg_pool() -> usize {
    500
}

fn default_network_instances() -> usize {
    4
}

fn default_delete_passes() -> usize {
    4
}

impl Default for ProgrammingConfig {
    fn default() -> Self {
        Self {
            ack_mode: default_ack_mode(),
            persistence: default_persistence(),
            ack_timeout_secs: default_ack_timeout(),
            fib_capacity: 0,
            result_history: default_result_history(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            traffic_checks: default_traffic_checks(),
            packets_per_flow: default_packets_per_flow(),
        }
    }
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            prefix_count: default_prefix_count(),
            nhg_pool: default_nhg_pool(),
            network_instances: default_network_instances(),
            delete_passes: default_delete_passes(),
        }
    }
}

impl AftConfig {
    /// Loads configuration from `path`, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let (config, defaulted): (Self, bool) = match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    AftError::Config(format!("failed to parse {}: {}", path.display(), e))
                })?;
                (config, false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("AftConfig: {} not found, using defaults", path.display());
                (Self::default(), true)
            }
            Err(e) => return Err(e.into()),
        };
        let record = AuditRecord::new(AuditCategory::ConfigurationChange, "AftConfig", "load")
            .with_object_id(path.display().to_string())
            .with_object_type("config_file")
            .with_details(serde_json::json!({ "defaults": defaulted }));
        if let Err(e) = config.validate() {
            audit_log!(record.with_error(e.to_string()));
            return Err(e);
        }
        audit_log!(record.with_outcome(AuditOutcome::Success));
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| AftError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        audit_log!(AuditRecord::new(AuditCategory::ConfigurationChange, "AftConfig", "save")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(path.display().to_string())
            .with_object_type("config_file"));
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.programming.ack_timeout_secs)
    }

    pub fn convergence_interval(&self) -> Duration {
        Duration::from_millis(self.convergence.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let tolerance = self.validation.tolerance;
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(AftError::Config(format!(
                "tolerance must be in [0, 1], got {tolerance}"
            )));
        }
        let history = self.programming.result_history;
        if history > 0 && history < MIN_RESULT_HISTORY {
            return Err(AftError::Config(format!(
                "result_history must be 0 or at least {MIN_RESULT_HISTORY}, got {history}"
            )));
        }
        if self.resolution.max_depth == 0 {
            return Err(AftError::Config("max_depth must be > 0".to_string()));
        }
        if self.programming.ack_timeout_secs == 0 {
            return Err(AftError::Config("ack_timeout_secs must be > 0".to_string()));
        }
        if self.convergence.attempts == 0 {
            return Err(AftError::Config("convergence attempts must be > 0".to_string()));
        }
        if self.scale.nhg_pool == 0 || self.scale.network_instances == 0 {
            return Err(AftError::Config(
                "nhg_pool and network_instances must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
