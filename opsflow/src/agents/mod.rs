//! Stage handlers and the manager agent.
//!
//! Handlers read the current [`WorkflowState`] and return a [`StageResult`];
//! they never mutate state. Oracle-backed handlers validate each attempt against
//! the stage contract and retry within `oracle_max_attempts`.

use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use crate::core::budget::call_budget;
use crate::core::contract::StageContract;
use crate::core::error::PipelineError;
use crate::core::stage::Stage;
use crate::core::state::{StageOutput, WorkflowState};
use crate::io::config::PipelineConfig;
use crate::io::oracle::{OracleRequest, TaskKind, TaskOracle};
use crate::io::prompt::PromptEngine;

pub mod listing;
pub mod manager;
pub mod pricing;
pub mod reporting;
pub mod routing;
pub mod sourcing;

/// Everything a handler may read besides the state.
pub struct StageContext<'a, O: TaskOracle + ?Sized> {
    pub oracle: &'a O,
    pub prompts: &'a PromptEngine,
    pub config: &'a PipelineConfig,
    /// Wall-clock deadline for the whole run.
    pub deadline: Instant,
    /// Instructions carried over from the handoff into this stage.
    pub task_details: &'a str,
}

impl<O: TaskOracle + ?Sized> StageContext<'_, O> {
    pub fn contract(&self) -> StageContract {
        self.config.contract()
    }

    /// Build an oracle request whose timeout fits the remaining run budget.
    pub fn request(
        &self,
        kind: TaskKind,
        stage: Stage,
        prompt: String,
        payload: Value,
    ) -> Result<OracleRequest, PipelineError> {
        Ok(OracleRequest {
            kind,
            prompt,
            payload,
            timeout: call_budget(self.deadline, self.config.oracle_timeout(), stage)?,
        })
    }
}

/// Handler output plus the rendered document for text artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub output: StageOutput,
    /// Markdown body of `report.md`; only set by the reporting stage.
    pub document: Option<String>,
}

impl From<StageOutput> for StageResult {
    fn from(output: StageOutput) -> Self {
        Self {
            output,
            document: None,
        }
    }
}

/// Run the handler registered for `stage`.
pub fn run_stage<O: TaskOracle + ?Sized>(
    stage: Stage,
    ctx: &StageContext<'_, O>,
    state: &WorkflowState,
) -> Result<StageResult, PipelineError> {
    match stage {
        Stage::Sourcing => sourcing::run(ctx, state).map(StageResult::from),
        Stage::Listing => listing::run(ctx, state).map(StageResult::from),
        Stage::Pricing => pricing::run(ctx.config, state).map(StageResult::from),
        Stage::Routing => Ok(routing::run(state).into()),
        Stage::Reporting => reporting::run(ctx, state),
        Stage::Init | Stage::Done | Stage::Failed => Err(PipelineError::violation(
            stage,
            format!("no handler registered for {stage}"),
        )),
    }
}

/// Call `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is spent. Each retry receives the previous error message.
pub(crate) fn with_attempts<T>(
    stage: Stage,
    max_attempts: u32,
    mut attempt: impl FnMut(Option<&str>) -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    let mut feedback: Option<String> = None;
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt(feedback.as_deref()) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && tries < max_attempts => {
                warn!(stage = %stage, attempt = tries, max_attempts, err = %err, "stage attempt rejected, retrying");
                feedback = Some(err.to_string());
            }
            Err(err) => return Err(err),
        }
    }
}

/// Prompt rendering failures surface as an unusable oracle.
pub(crate) fn prompt_error(stage: Stage, err: &anyhow::Error) -> PipelineError {
    PipelineError::OracleUnavailable {
        reason: format!("render {stage} prompt: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn retries_retryable_errors_with_feedback() {
        let calls = Cell::new(0);
        let result = with_attempts(Stage::Listing, 3, |feedback| {
            calls.set(calls.get() + 1);
            match feedback {
                None => Err(PipelineError::violation(Stage::Listing, "title too long")),
                Some(reason) => {
                    assert!(reason.contains("title too long"));
                    Ok(7)
                }
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_attempts(Stage::Sourcing, 2, |_| {
            calls.set(calls.get() + 1);
            Err(PipelineError::OracleUnavailable {
                reason: "connection refused".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn timeout_is_never_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_attempts(Stage::Sourcing, 5, |_| {
            calls.set(calls.get() + 1);
            Err(PipelineError::Timeout {
                stage: Stage::Sourcing,
            })
        });
        assert_eq!(
            result,
            Err(PipelineError::Timeout {
                stage: Stage::Sourcing
            })
        );
        assert_eq!(calls.get(), 1);
    }
}
