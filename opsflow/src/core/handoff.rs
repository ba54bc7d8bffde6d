//! Resolution of manager handoff suggestions against the fixed stage order.
//!
//! The manager may suggest which agent runs next, but the order is structural:
//! a suggestion is only used for the task details it carries, and only when it
//! names the stage that comes next anyway.

use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;
use crate::core::stage::Stage;

/// Structured output of the manager agent (`handoff_to_subagents`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffSuggestion {
    pub agent_name: String,
    pub task_details: String,
}

/// Where the run goes after `from` passed, and what the next handler is told.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffDecision {
    pub next: Stage,
    pub task_details: String,
    /// Set when the suggestion named a stage out of order.
    pub rejected: Option<PipelineError>,
}

/// Default task description carried to a handler when no suggestion applies.
pub fn default_task_details(stage: Stage) -> String {
    match stage {
        Stage::Sourcing => "Select the highest-potential SKUs from the eligible catalog sample.",
        Stage::Listing => "Write storefront listings for every selected SKU.",
        Stage::Pricing => "Compute margin-safe prices for every selected SKU.",
        Stage::Routing => "Allocate open orders against selected stock.",
        Stage::Reporting => "Summarize the run for the operator.",
        Stage::Init | Stage::Done | Stage::Failed => "",
    }
    .to_string()
}

/// Decide the transition after `from` passed.
///
/// Returns `None` when `from` is terminal.
pub fn resolve_handoff(
    from: Stage,
    suggestion: Option<&HandoffSuggestion>,
) -> Option<HandoffDecision> {
    let next = from.next()?;
    let mut decision = HandoffDecision {
        next,
        task_details: default_task_details(next),
        rejected: None,
    };
    let Some(suggestion) = suggestion else {
        return Some(decision);
    };

    match Stage::from_agent_name(&suggestion.agent_name) {
        Some(requested) if requested == next => {
            let details = suggestion.task_details.trim();
            if !details.is_empty() {
                decision.task_details = details.to_string();
            }
        }
        _ => {
            decision.rejected = Some(PipelineError::UnexpectedTransition {
                from,
                requested: suggestion.agent_name.clone(),
            });
        }
    }
    Some(decision)
}
