//! Error taxonomy for a pipeline run.
//!
//! Every variant is local to one run. The orchestrator converts the first error
//! it observes into a [`FailureRecord`] and stops; nothing here is retried across
//! stage boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::stage::Stage;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Fee/margin settings make a price floor impossible, or a setting is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("invalid price input: {field} = {value}")]
    InvalidPriceInput { field: &'static str, value: f64 },

    #[error("no catalog rows with stock >= {min_stock}")]
    EmptyEligibleSet { min_stock: u32 },

    #[error("contract violation in {stage}: {reason}")]
    ContractViolation { stage: Stage, reason: String },

    #[error("oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    #[error("malformed oracle output for {task}: {reason}")]
    MalformedOracleOutput { task: String, reason: String },

    #[error("timed out during {stage}")]
    Timeout { stage: Stage },

    /// A handoff suggestion named a stage outside the fixed order. Never fatal.
    #[error("unexpected transition from {from} to '{requested}'")]
    UnexpectedTransition { from: Stage, requested: String },

    #[error("failed to write {stage} artifact: {reason}")]
    ArtifactWrite { stage: Stage, reason: String },
}

impl PipelineError {
    pub fn violation(stage: Stage, reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            stage,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidConfiguration { .. } | Self::InvalidPriceInput { .. } => {
                FailureKind::InvalidConfiguration
            }
            Self::EmptyEligibleSet { .. } => FailureKind::EmptyEligibleSet,
            // Bad generated content is indistinguishable from a broken postcondition.
            Self::ContractViolation { .. } | Self::MalformedOracleOutput { .. } => {
                FailureKind::ContractViolation
            }
            Self::OracleUnavailable { .. } => FailureKind::OracleUnavailable,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::UnexpectedTransition { .. } => FailureKind::UnexpectedTransition,
            Self::ArtifactWrite { .. } => FailureKind::ArtifactWrite,
        }
    }

    /// True if a bounded retry around a single oracle call may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContractViolation { .. }
                | Self::MalformedOracleOutput { .. }
                | Self::OracleUnavailable { .. }
        )
    }
}

/// Stable classification recorded in `run.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidConfiguration,
    EmptyEligibleSet,
    ContractViolation,
    OracleUnavailable,
    Timeout,
    UnexpectedTransition,
    ArtifactWrite,
}

/// The single failure recorded when a run enters `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage that was running when the failure occurred.
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureRecord {
    pub fn from_error(stage: Stage, err: &PipelineError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}
