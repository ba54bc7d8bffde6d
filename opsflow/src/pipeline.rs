//! Orchestrator state machine for one pipeline run.
//!
//! The run walks `Init -> Sourcing -> Listing -> Pricing -> Routing ->
//! Reporting -> Done`. For each stage the orchestrator:
//!
//! 1. checks the run deadline,
//! 2. runs the handler against the current state,
//! 3. applies the handler output to a copy and validates the stage contract,
//! 4. writes the stage artifact atomically,
//! 5. commits the copy and appends a `passed` history entry.
//!
//! Any error moves the run to `Failed` with the first failure recorded. State is
//! never partially updated: a stage either commits both its field and its
//! artifact, or neither. `run.json` is written at every terminal stage.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::agents::{self, StageContext, manager};
use crate::core::budget::remaining_budget;
use crate::core::error::{FailureRecord, PipelineError};
use crate::core::handoff::{HandoffDecision, resolve_handoff};
use crate::core::stage::Stage;
use crate::core::state::WorkflowState;
use crate::core::types::{RejectedHandoff, TransitionOutcome};
use crate::io::artifacts::ArtifactStore;
use crate::io::catalog::{load_catalog, load_orders};
use crate::io::config::PipelineConfig;
use crate::io::oracle::TaskOracle;
use crate::io::prompt::PromptEngine;

/// Result of a finished run (either `Done` or `Failed`).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final state, including history and any failure.
    pub state: WorkflowState,
    /// Artifact files written, in stage order.
    pub artifacts: Vec<PathBuf>,
    pub summary_path: PathBuf,
}

impl RunOutcome {
    pub fn final_stage(&self) -> Stage {
        self.state.stage
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.state.failure.as_ref()
    }

    pub fn succeeded(&self) -> bool {
        self.state.stage == Stage::Done
    }
}

/// Load the catalog and order book into a fresh `Init` state.
///
/// Rows that fail validation are skipped with a warning.
pub fn load_inputs(catalog_path: &Path, orders_path: &Path) -> Result<WorkflowState> {
    let catalog = load_catalog(catalog_path)?;
    let orders = load_orders(orders_path)?;
    if catalog.skipped > 0 || orders.skipped > 0 {
        warn!(
            catalog_skipped = catalog.skipped,
            orders_skipped = orders.skipped,
            "some input rows were skipped"
        );
    }
    info!(
        catalog_rows = catalog.rows.len(),
        orders = orders.rows.len(),
        "inputs loaded"
    );
    Ok(WorkflowState::new(catalog.rows, orders.rows))
}

/// Drives a [`WorkflowState`] through every stage.
pub struct Orchestrator<'a, O: TaskOracle + ?Sized> {
    oracle: &'a O,
    config: PipelineConfig,
    prompts: PromptEngine,
    store: ArtifactStore,
}

impl<'a, O: TaskOracle + ?Sized> Orchestrator<'a, O> {
    /// Fails with `InvalidConfiguration` before any stage runs.
    pub fn new(oracle: &'a O, config: PipelineConfig, out_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            oracle,
            config,
            prompts: PromptEngine::new()?,
            store: ArtifactStore::new(out_dir),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `state` to a terminal stage and write `run.json`.
    ///
    /// Stage failures end in `Ok` with `Failed` as the final stage. `Err` is
    /// reserved for a state that did not start at `Init` or an unwritable
    /// run summary.
    #[instrument(skip_all, fields(
        catalog_rows = state.catalog_records.len(),
        orders = state.order_records.len(),
        out_dir = %self.store.out_dir().display(),
    ))]
    pub fn run(&self, state: WorkflowState) -> Result<RunOutcome> {
        let deadline = Instant::now() + self.config.run_timeout();
        self.run_until(state, deadline)
    }

    fn run_until(&self, mut state: WorkflowState, deadline: Instant) -> Result<RunOutcome> {
        if state.stage != Stage::Init || !state.history.is_empty() {
            bail!("run must start from a fresh init state, found {}", state.stage);
        }
        state.record_transition(Stage::Init, TransitionOutcome::Started, Utc::now());
        info!("run started");

        let mut artifacts = Vec::new();
        let mut completed = Stage::Init;
        while let Some(decision) = self.decide_next(&mut state, completed, deadline) {
            let stage = decision.next;
            if stage == Stage::Done {
                state.stage = Stage::Done;
                state.record_transition(Stage::Done, TransitionOutcome::Completed, Utc::now());
                info!("run completed");
                break;
            }

            state.stage = stage;
            match self.execute(stage, &state, deadline, &decision.task_details) {
                Ok(mut committed) => {
                    committed.record_transition(stage, TransitionOutcome::Passed, Utc::now());
                    state = committed;
                    artifacts.extend(self.store.path_for(stage));
                    info!(stage = %stage, "stage passed");
                    completed = stage;
                }
                Err(err) => {
                    warn!(stage = %stage, kind = ?err.kind(), err = %err, "stage failed");
                    state.fail(FailureRecord::from_error(stage, &err), Utc::now());
                    break;
                }
            }
        }

        let summary_path = self
            .store
            .write_summary(&state)
            .context("write run summary")?;
        Ok(RunOutcome {
            state,
            artifacts,
            summary_path,
        })
    }

    /// Run one stage handler and return the validated state with its artifact
    /// already on disk.
    fn execute(
        &self,
        stage: Stage,
        state: &WorkflowState,
        deadline: Instant,
        task_details: &str,
    ) -> Result<WorkflowState, PipelineError> {
        remaining_budget(deadline, stage)?;
        let ctx = self.context(deadline, task_details);
        let result = agents::run_stage(stage, &ctx, state)?;
        if result.output.stage() != stage {
            return Err(PipelineError::violation(
                stage,
                format!("handler produced {} output", result.output.stage()),
            ));
        }

        let candidate = result.output.applied(state);
        self.config.contract().validate(stage, state, &candidate)?;
        self.store
            .write_stage(stage, &candidate, result.document.as_deref())?;
        Ok(candidate)
    }

    /// Pick the stage after `completed`, consulting the manager when enabled.
    ///
    /// Out-of-order suggestions are recorded and ignored.
    fn decide_next(
        &self,
        state: &mut WorkflowState,
        completed: Stage,
        deadline: Instant,
    ) -> Option<HandoffDecision> {
        let next = completed.next()?;
        let suggestion = if next.has_handler() {
            manager::suggest_handoff(&self.context(deadline, ""), state, completed)
        } else {
            None
        };
        let decision = resolve_handoff(completed, suggestion.as_ref())?;
        if let Some(PipelineError::UnexpectedTransition { from, requested }) = &decision.rejected {
            warn!(
                from = %from,
                requested = %requested,
                next = %decision.next,
                "ignoring out-of-order handoff"
            );
            state.rejected_handoffs.push(RejectedHandoff {
                from: *from,
                requested: requested.clone(),
                timestamp: Utc::now(),
            });
        }
        Some(decision)
    }

    fn context<'c>(&'c self, deadline: Instant, task_details: &'c str) -> StageContext<'c, O> {
        StageContext {
            oracle: self.oracle,
            prompts: &self.prompts,
            config: &self.config,
            deadline,
            task_details,
        }
    }
}
