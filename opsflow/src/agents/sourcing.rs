//! Sourcing agent: pick the SKUs to list from the eligible catalog sample.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::core::catalog_filter::select_eligible;
use crate::core::error::PipelineError;
use crate::core::stage::Stage;
use crate::core::state::{StageOutput, WorkflowState};
use crate::core::types::{CatalogRecord, SelectedItem};
use crate::io::catalog::catalog_to_csv;
use crate::io::oracle::{TaskKind, TaskOracle, propose_json};
use crate::io::prompt::SourcingPrompt;

use super::{StageContext, prompt_error, with_attempts};

#[derive(Debug, Deserialize)]
struct SelectionReply {
    selected_products: Vec<Pick>,
}

#[derive(Debug, Deserialize)]
struct Pick {
    supplier_sku: String,
    reasoning: String,
}

#[instrument(skip_all, fields(catalog_rows = state.catalog_records.len()))]
pub fn run<O: TaskOracle + ?Sized>(
    ctx: &StageContext<'_, O>,
    state: &WorkflowState,
) -> Result<StageOutput, PipelineError> {
    let cfg = ctx.config;
    let eligible = select_eligible(
        &state.catalog_records,
        cfg.min_stock,
        cfg.catalog_sample_limit,
    )?;
    if eligible.len() < cfg.selection_size {
        return Err(PipelineError::violation(
            Stage::Sourcing,
            format!(
                "eligible count = {}, expected at least {}",
                eligible.len(),
                cfg.selection_size
            ),
        ));
    }
    debug!(eligible = eligible.len(), "catalog sample prepared");

    let catalog_csv = catalog_to_csv(&eligible).map_err(|err| prompt_error(Stage::Sourcing, &err))?;
    let min_margin_pct = (cfg.min_margin * 100.0).to_string();
    let payload = json!({
        "eligible_skus": eligible.iter().map(|r| r.sku.as_str()).collect::<Vec<_>>(),
        "selection_size": cfg.selection_size,
    });

    let output = with_attempts(Stage::Sourcing, cfg.oracle_max_attempts, |feedback| {
        let prompt = ctx
            .prompts
            .sourcing(&SourcingPrompt {
                task_details: ctx.task_details,
                selection_size: cfg.selection_size,
                min_stock: cfg.min_stock,
                min_margin_pct: min_margin_pct.clone(),
                catalog_csv: &catalog_csv,
                feedback,
            })
            .map_err(|err| prompt_error(Stage::Sourcing, &err))?;
        let request = ctx.request(TaskKind::Sourcing, Stage::Sourcing, prompt, payload.clone())?;
        let reply: SelectionReply = propose_json(ctx.oracle, &request, Stage::Sourcing)?;

        let items = resolve_picks(state, &eligible, reply.selected_products)?;
        let output = StageOutput::Selection(items);
        ctx.contract()
            .validate(Stage::Sourcing, state, &output.applied(state))?;
        Ok(output)
    })?;

    info!(selected = cfg.selection_size, "sourcing selection accepted");
    Ok(output)
}

/// Copy catalog fields for each pick; the oracle only contributes the SKU and
/// the reasoning.
///
/// Picks must come from the eligible sample shown in the prompt.
fn resolve_picks(
    state: &WorkflowState,
    eligible: &[CatalogRecord],
    picks: Vec<Pick>,
) -> Result<Vec<SelectedItem>, PipelineError> {
    let mut unknown = Vec::new();
    let mut items = Vec::with_capacity(picks.len());
    for pick in picks {
        let sku = pick.supplier_sku.trim();
        match eligible.iter().find(|record| record.sku == sku) {
            Some(record) => items.push(SelectedItem::from_record(record, pick.reasoning.trim())),
            None if state.catalog_record(sku).is_some() => {
                unknown.push(format!("sku '{sku}' not in eligible sample"));
            }
            None => unknown.push(format!("sku '{sku}' not in catalog")),
        }
    }
    if !unknown.is_empty() {
        return Err(PipelineError::violation(Stage::Sourcing, unknown.join("; ")));
    }
    Ok(items)
}
