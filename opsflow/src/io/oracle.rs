//! Oracle abstraction for generated content and judgement calls.
//!
//! The [`TaskOracle`] trait decouples stage handlers from the text generation
//! backend (by default a local model invoked as a command). Tests use scripted
//! oracles that return predetermined replies without spawning processes.
//!
//! Oracle replies are untrusted: they may differ between identical calls, may
//! fail, and may be malformed. [`propose_json`] is the only way handlers read a
//! reply, and it validates the reply against the task's JSON Schema before
//! deserializing.

use std::fmt;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use jsonschema::validator_for;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::error::PipelineError;
use crate::core::stage::Stage;
use crate::io::config::PipelineConfig;
use crate::io::process::run_command_with_timeout;

const SELECTION_SCHEMA: &str = include_str!("../../schemas/selection.schema.json");
const LISTINGS_SCHEMA: &str = include_str!("../../schemas/listings.schema.json");
const HANDOFF_SCHEMA: &str = include_str!("../../schemas/handoff.schema.json");
const REPORT_SCHEMA: &str = include_str!("../../schemas/report_summary.schema.json");

static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex")
});

/// Kind of work requested from the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Sourcing,
    Listing,
    Handoff,
    Report,
}

/// Backend profile a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleProfile {
    /// Low temperature, used for decisions.
    Reasoning,
    /// Higher temperature, used for copywriting.
    Creative,
}

impl TaskKind {
    pub fn profile(self) -> OracleProfile {
        match self {
            TaskKind::Listing => OracleProfile::Creative,
            TaskKind::Sourcing | TaskKind::Handoff | TaskKind::Report => OracleProfile::Reasoning,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Sourcing => "sourcing",
            TaskKind::Listing => "listing",
            TaskKind::Handoff => "handoff",
            TaskKind::Report => "report",
        }
    }

    /// JSON Schema the reply must satisfy.
    pub fn output_schema(self) -> &'static str {
        match self {
            TaskKind::Sourcing => SELECTION_SCHEMA,
            TaskKind::Listing => LISTINGS_SCHEMA,
            TaskKind::Handoff => HANDOFF_SCHEMA,
            TaskKind::Report => REPORT_SCHEMA,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub kind: TaskKind,
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Structured input embedded in the prompt, logged at debug level.
    pub payload: Value,
    /// Maximum time to wait for a reply.
    pub timeout: Duration,
}

/// Failure of the oracle call itself (as opposed to a bad reply).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
}

/// Abstraction over content/reasoning backends.
///
/// Calls are not idempotent and may return different valid replies for the
/// same request. Implementations must honor `request.timeout`.
pub trait TaskOracle {
    /// Return the raw reply text for `request`.
    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Oracle that pipes the prompt into a configured command and reads stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    reasoning_command: Vec<String>,
    creative_command: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandOracle {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            reasoning_command: cfg.oracle.reasoning_command.clone(),
            creative_command: cfg.oracle.creative_command.clone(),
            output_limit_bytes: cfg.oracle_output_limit_bytes,
        }
    }

    fn command_for(&self, profile: OracleProfile) -> &[String] {
        match profile {
            OracleProfile::Reasoning => &self.reasoning_command,
            OracleProfile::Creative => &self.creative_command,
        }
    }
}

impl TaskOracle for CommandOracle {
    #[instrument(skip_all, fields(kind = %request.kind, timeout_secs = request.timeout.as_secs()))]
    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let argv = self.command_for(request.kind.profile());
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| OracleError::Unavailable("empty oracle command".to_string()))?;
        info!(program = %program, "invoking oracle command");
        debug!(payload = %request.payload, "oracle payload");

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| OracleError::Unavailable(format!("{err:#}")))?;

        if output.timed_out {
            return Err(OracleError::Timeout(request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(OracleError::Unavailable(format!(
                "{program} exited with {:?}: {}",
                output.status.code(),
                output.stderr_tail()
            )));
        }
        debug!(bytes = output.stdout.len(), "oracle replied");
        Ok(output.stdout_lossy())
    }
}

/// Call the oracle and parse its reply as schema-valid JSON of type `T`.
///
/// `stage` is only used to attribute a timeout.
pub fn propose_json<O: TaskOracle + ?Sized, T: DeserializeOwned>(
    oracle: &O,
    request: &OracleRequest,
    stage: Stage,
) -> Result<T, PipelineError> {
    let raw = oracle.propose(request).map_err(|err| match err {
        OracleError::Timeout(_) => PipelineError::Timeout { stage },
        OracleError::Unavailable(reason) => PipelineError::OracleUnavailable { reason },
    })?;
    parse_reply(request.kind, &raw)
}

/// Extract, validate and deserialize a JSON reply.
pub fn parse_reply<T: DeserializeOwned>(kind: TaskKind, raw: &str) -> Result<T, PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedOracleOutput {
        task: kind.to_string(),
        reason,
    };

    let json = extract_json(raw).ok_or_else(|| malformed("no JSON object in reply".to_string()))?;
    let value: Value =
        serde_json::from_str(json).map_err(|err| malformed(format!("invalid JSON: {err}")))?;

    let schema: Value = serde_json::from_str(kind.output_schema())
        .map_err(|err| malformed(format!("invalid {kind} schema: {err}")))?;
    let validator =
        validator_for(&schema).map_err(|err| malformed(format!("invalid {kind} schema: {err}")))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(malformed(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }

    serde_json::from_value(value).map_err(|err| malformed(format!("unexpected shape: {err}")))
}

/// Locate the JSON object in a reply that may wrap it in prose or code fences.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON_RE.captures(raw) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}
