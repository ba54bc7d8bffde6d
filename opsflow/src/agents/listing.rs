//! Listing agent: storefront copy for every selected SKU.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::core::contract::{BULLETS_MAX, BULLETS_MIN, TAGS_MAX, TAGS_MIN, TITLE_MAX_CHARS};
use crate::core::error::PipelineError;
use crate::core::stage::Stage;
use crate::core::state::{StageOutput, WorkflowState};
use crate::core::types::ListingContent;
use crate::io::oracle::{TaskKind, TaskOracle, propose_json};
use crate::io::prompt::ListingPrompt;

use super::{StageContext, prompt_error, with_attempts};

#[derive(Debug, Deserialize)]
struct ListingsReply {
    listings: Vec<ListingContent>,
}

#[instrument(skip_all, fields(selected = state.selected_items.len()))]
pub fn run<O: TaskOracle + ?Sized>(
    ctx: &StageContext<'_, O>,
    state: &WorkflowState,
) -> Result<StageOutput, PipelineError> {
    let products_json = serde_json::to_string_pretty(&state.selected_items).map_err(|err| {
        PipelineError::OracleUnavailable {
            reason: format!("serialize selection: {err}"),
        }
    })?;
    let payload = json!({
        "skus": state.selected_items.iter().map(|i| i.sku.as_str()).collect::<Vec<_>>(),
    });

    let output = with_attempts(Stage::Listing, ctx.config.oracle_max_attempts, |feedback| {
        let prompt = ctx
            .prompts
            .listing(&ListingPrompt {
                task_details: ctx.task_details,
                products_json: &products_json,
                title_max_chars: TITLE_MAX_CHARS,
                bullets_min: BULLETS_MIN,
                bullets_max: BULLETS_MAX,
                tags_min: TAGS_MIN,
                tags_max: TAGS_MAX,
                feedback,
            })
            .map_err(|err| prompt_error(Stage::Listing, &err))?;
        let request = ctx.request(TaskKind::Listing, Stage::Listing, prompt, payload.clone())?;
        let reply: ListingsReply = propose_json(ctx.oracle, &request, Stage::Listing)?;

        let output = StageOutput::Listings(key_by_sku(reply.listings)?);
        ctx.contract()
            .validate(Stage::Listing, state, &output.applied(state))?;
        Ok(output)
    })?;

    info!("listings accepted");
    Ok(output)
}

fn key_by_sku(listings: Vec<ListingContent>) -> Result<BTreeMap<String, ListingContent>, PipelineError> {
    let mut by_sku = BTreeMap::new();
    let mut duplicates = Vec::new();
    for mut listing in listings {
        listing.sku = listing.sku.trim().to_string();
        let sku = listing.sku.clone();
        if by_sku.insert(sku.clone(), listing).is_some() {
            duplicates.push(format!("duplicate listing for '{sku}'"));
        }
    }
    if !duplicates.is_empty() {
        return Err(PipelineError::violation(Stage::Listing, duplicates.join("; ")));
    }
    Ok(by_sku)
}
