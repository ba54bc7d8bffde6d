//! Pipeline configuration stored in `opsflow.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::contract::StageContract;
use crate::core::error::PipelineError;
use crate::core::pricing::PricingParams;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "opsflow.toml";

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// storefront was launched with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum stock for a catalog row to be eligible for sourcing.
    pub min_stock: u32,

    /// Exact number of SKUs sourcing must select.
    pub selection_size: usize,

    /// Eligible rows shown to the sourcing oracle, in catalog order.
    pub catalog_sample_limit: usize,

    pub platform_fee_rate: f64,
    pub platform_fee_fixed: f64,
    pub tax_rate: f64,
    pub min_margin: f64,

    /// Wall-clock budget for the whole run in seconds.
    pub run_timeout_secs: u64,

    /// Cap for a single oracle call in seconds (bounded by the run budget).
    pub oracle_timeout_secs: u64,

    /// Attempts per oracle-backed stage before the stage fails.
    pub oracle_max_attempts: u32,

    /// Truncate oracle stdout beyond this many bytes.
    pub oracle_output_limit_bytes: usize,

    /// Ask the manager agent for handoff details between stages.
    pub consult_manager: bool,

    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Command for low-temperature tasks (manager, sourcing, report).
    pub reasoning_command: Vec<String>,
    /// Command for copywriting tasks (listing).
    pub creative_command: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            reasoning_command: vec!["ollama".to_string(), "run".to_string(), "llama3".to_string()],
            creative_command: vec!["ollama".to_string(), "run".to_string(), "mistral".to_string()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let pricing = PricingParams::default();
        Self {
            min_stock: 10,
            selection_size: 10,
            catalog_sample_limit: 30,
            platform_fee_rate: pricing.platform_fee_rate,
            platform_fee_fixed: pricing.platform_fee_fixed,
            tax_rate: pricing.tax_rate,
            min_margin: pricing.min_margin,
            run_timeout_secs: 30 * 60,
            oracle_timeout_secs: 10 * 60,
            oracle_max_attempts: 2,
            oracle_output_limit_bytes: 1_000_000,
            consult_manager: true,
            oracle: OracleConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that make a run impossible before it starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pricing().validate()?;
        if self.selection_size == 0 {
            return Err(invalid("selection_size must be > 0"));
        }
        if self.catalog_sample_limit < self.selection_size {
            return Err(invalid(format!(
                "catalog_sample_limit ({}) must be >= selection_size ({})",
                self.catalog_sample_limit, self.selection_size
            )));
        }
        if self.run_timeout_secs == 0 {
            return Err(invalid("run_timeout_secs must be > 0"));
        }
        if self.oracle_timeout_secs == 0 {
            return Err(invalid("oracle_timeout_secs must be > 0"));
        }
        if !(1..=5).contains(&self.oracle_max_attempts) {
            return Err(invalid("oracle_max_attempts must be between 1 and 5"));
        }
        if self.oracle_output_limit_bytes == 0 {
            return Err(invalid("oracle_output_limit_bytes must be > 0"));
        }
        for (name, command) in [
            ("oracle.reasoning_command", &self.oracle.reasoning_command),
            ("oracle.creative_command", &self.oracle.creative_command),
        ] {
            if command.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(invalid(format!("{name} must be a non-empty array")));
            }
        }
        Ok(())
    }

    pub fn pricing(&self) -> PricingParams {
        PricingParams {
            platform_fee_rate: self.platform_fee_rate,
            platform_fee_fixed: self.platform_fee_fixed,
            tax_rate: self.tax_rate,
            min_margin: self.min_margin,
        }
    }

    pub fn contract(&self) -> StageContract {
        StageContract {
            selection_size: self.selection_size,
            min_stock: self.min_stock,
            min_margin: self.min_margin,
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

fn invalid(reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfiguration {
        reason: reason.into(),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::artifacts::write_atomic(path, &buf)
}
