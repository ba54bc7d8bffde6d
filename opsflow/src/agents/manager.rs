//! Manager agent: advisory handoff suggestions between stages.
//!
//! The manager never decides the order. Its reply only feeds
//! [`resolve_handoff`](crate::core::handoff::resolve_handoff), and any failure
//! to obtain one is logged and ignored.

use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::core::handoff::HandoffSuggestion;
use crate::core::stage::Stage;
use crate::core::state::WorkflowState;
use crate::io::oracle::{TaskKind, TaskOracle, propose_json};
use crate::io::prompt::HandoffPrompt;

use super::StageContext;

/// Ask the manager what should follow `completed`.
///
/// Returns `None` when consultation is disabled or the oracle gave no usable
/// reply.
#[instrument(skip_all, fields(completed = %completed))]
pub fn suggest_handoff<O: TaskOracle + ?Sized>(
    ctx: &StageContext<'_, O>,
    state: &WorkflowState,
    completed: Stage,
) -> Option<HandoffSuggestion> {
    if !ctx.config.consult_manager {
        return None;
    }
    let prompt = match ctx.prompts.handoff(&HandoffPrompt {
        completed: completed.as_str(),
        selected_count: state.selected_items.len(),
        listing_count: state.listings.len(),
        price_count: state.prices.len(),
        order_count: state.order_records.len(),
    }) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "manager prompt failed to render");
            return None;
        }
    };

    let result = ctx
        .request(
            TaskKind::Handoff,
            completed,
            prompt,
            json!({ "completed": completed }),
        )
        .and_then(|request| propose_json::<_, HandoffSuggestion>(ctx.oracle, &request, completed));
    match result {
        Ok(suggestion) => {
            debug!(agent = %suggestion.agent_name, "manager suggested handoff");
            Some(suggestion)
        }
        Err(err) => {
            warn!(err = %err, "manager consultation failed, using fixed order");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::io::config::PipelineConfig;
    use crate::io::oracle::OracleError;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::{ScriptedOracle, catalog, handoff_reply};

    fn suggest(oracle: &ScriptedOracle, cfg: &PipelineConfig) -> Option<HandoffSuggestion> {
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = StageContext {
            oracle,
            prompts: &prompts,
            config: cfg,
            deadline: Instant::now() + Duration::from_secs(60),
            task_details: "",
        };
        let state = WorkflowState::new(catalog(1, 20), Vec::new());
        suggest_handoff(&ctx, &state, Stage::Sourcing)
    }

    #[test]
    fn returns_parsed_suggestion() {
        let oracle = ScriptedOracle::new();
        oracle.push_reply(TaskKind::Handoff, handoff_reply("listing", "Lead with gifts."));
        let suggestion = suggest(&oracle, &PipelineConfig::default()).expect("suggestion");
        assert_eq!(suggestion.agent_name, "listing");
        assert!(oracle.requests()[0].prompt.contains("Stage just completed: sourcing"));
    }

    #[test]
    fn oracle_failure_is_not_fatal() {
        let oracle = ScriptedOracle::new();
        oracle.push_err(
            TaskKind::Handoff,
            OracleError::Unavailable("connection refused".to_string()),
        );
        assert_eq!(suggest(&oracle, &PipelineConfig::default()), None);
    }

    #[test]
    fn disabled_consultation_skips_oracle() {
        let oracle = ScriptedOracle::new();
        let cfg = PipelineConfig {
            consult_manager: false,
            ..PipelineConfig::default()
        };
        assert_eq!(suggest(&oracle, &cfg), None);
        assert!(oracle.requests().is_empty());
    }
}
