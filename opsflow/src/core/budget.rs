//! Shared time budget helpers for deterministic orchestration.

use std::time::{Duration, Instant};

use crate::core::error::PipelineError;
use crate::core::stage::Stage;

/// Return the remaining run budget until `deadline`, or `Timeout` for `stage`.
pub fn remaining_budget(deadline: Instant, stage: Stage) -> Result<Duration, PipelineError> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(PipelineError::Timeout { stage });
    }
    Ok(remaining)
}

/// Timeout for one oracle call: the per-call cap, bounded by the run deadline.
pub fn call_budget(
    deadline: Instant,
    per_call: Duration,
    stage: Stage,
) -> Result<Duration, PipelineError> {
    Ok(remaining_budget(deadline, stage)?.min(per_call))
}
