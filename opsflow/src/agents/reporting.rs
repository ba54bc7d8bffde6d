//! Reporting agent: operator summary plus the `report.md` document.

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::core::error::PipelineError;
use crate::core::stage::Stage;
use crate::core::state::{StageOutput, WorkflowState};
use crate::core::types::ReportRef;
use crate::io::oracle::{TaskKind, TaskOracle, propose_json};
use crate::io::prompt::{ReportDoc, ReportPrompt, ReportRow};

use super::{StageContext, StageResult, prompt_error, with_attempts};

#[derive(Debug, Deserialize)]
struct ReportSummary {
    summary: String,
    #[serde(default)]
    highlights: Vec<String>,
}

#[instrument(skip_all)]
pub fn run<O: TaskOracle + ?Sized>(
    ctx: &StageContext<'_, O>,
    state: &WorkflowState,
) -> Result<StageResult, PipelineError> {
    let facts = run_facts(state);
    let facts_json = serde_json::to_string_pretty(&facts).map_err(|err| {
        PipelineError::OracleUnavailable {
            reason: format!("serialize run facts: {err}"),
        }
    })?;

    let reply = with_attempts(Stage::Reporting, ctx.config.oracle_max_attempts, |feedback| {
        let prompt = ctx
            .prompts
            .report(&ReportPrompt {
                task_details: ctx.task_details,
                facts_json: &facts_json,
                feedback,
            })
            .map_err(|err| prompt_error(Stage::Reporting, &err))?;
        let request = ctx.request(TaskKind::Report, Stage::Reporting, prompt, facts.clone())?;
        let reply: ReportSummary = propose_json(ctx.oracle, &request, Stage::Reporting)?;
        if reply.summary.trim().is_empty() {
            return Err(PipelineError::violation(Stage::Reporting, "empty report summary"));
        }
        Ok(reply)
    })?;

    let document = render_document(ctx, state, &reply)?;
    let path = Stage::Reporting.artifact_name().unwrap_or("report.md");
    info!(path, bytes = document.len(), "report rendered");
    Ok(StageResult {
        output: StageOutput::Report(ReportRef {
            path: path.to_string(),
        }),
        document: Some(document),
    })
}

fn run_facts(state: &WorkflowState) -> serde_json::Value {
    let margins: Vec<_> = state
        .prices
        .iter()
        .map(|(sku, price)| {
            json!({
                "supplier_sku": sku,
                "recommended_price": price.recommended_price,
                "margin_percentage": price.margin_percentage,
            })
        })
        .collect();
    let backordered: Vec<&str> = state
        .routing
        .values()
        .flat_map(|a| a.backordered_orders.iter().map(String::as_str))
        .collect();
    json!({
        "catalog_rows": state.catalog_records.len(),
        "selected_skus": state.selected_items.len(),
        "listings": state.listings.len(),
        "prices": margins,
        "orders": state.order_records.len(),
        "backordered_orders": backordered,
        "unrouted_orders": state.unrouted_orders,
    })
}

fn render_document<O: TaskOracle + ?Sized>(
    ctx: &StageContext<'_, O>,
    state: &WorkflowState,
    reply: &ReportSummary,
) -> Result<String, PipelineError> {
    let rows = state
        .selected_items
        .iter()
        .map(|item| {
            let price = state.prices.get(&item.sku);
            ReportRow {
                sku: item.sku.clone(),
                name: item.name.clone(),
                category: item.category.clone(),
                stock: item.stock,
                price: price.map_or_else(|| "-".to_string(), |p| format!("{:.2}", p.recommended_price)),
                margin_percentage: price
                    .map_or_else(|| "-".to_string(), |p| format!("{:.2}", p.margin_percentage)),
            }
        })
        .collect();
    let fulfilled: usize = state.routing.values().map(|a| a.fulfilled_orders.len()).sum();
    let backordered_orders: Vec<&str> = state
        .routing
        .values()
        .flat_map(|a| a.backordered_orders.iter().map(String::as_str))
        .collect();

    ctx.prompts
        .report_doc(&ReportDoc {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            summary: reply.summary.trim(),
            highlights: &reply.highlights,
            rows,
            fulfilled,
            backordered: backordered_orders.len(),
            unrouted: state.unrouted_orders.len(),
            backordered_orders,
        })
        .map_err(|err| PipelineError::ArtifactWrite {
            stage: Stage::Reporting,
            reason: format!("{err:#}"),
        })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::agents::{pricing, routing};
    use crate::io::config::PipelineConfig;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::{ScriptedOracle, catalog, order, report_reply, selected};

    #[test]
    fn report_lists_prices_and_backorders() {
        let mut state = WorkflowState::new(
            catalog(2, 20),
            vec![order("o1", "SKU001", 15), order("o2", "SKU001", 10)],
        );
        state.selected_items = selected(&state.catalog_records);
        let cfg = PipelineConfig::default();
        pricing::run(&cfg, &state).expect("pricing").apply_to(&mut state);
        routing::run(&state).apply_to(&mut state);

        let oracle = ScriptedOracle::new();
        oracle.push_reply(TaskKind::Report, report_reply());
        let prompts = PromptEngine::new().expect("prompts");
        let ctx = StageContext {
            oracle: &oracle,
            prompts: &prompts,
            config: &cfg,
            deadline: Instant::now() + Duration::from_secs(60),
            task_details: "Summarize.",
        };

        let result = run(&ctx, &state).expect("report");
        assert_eq!(
            result.output,
            StageOutput::Report(ReportRef {
                path: "report.md".to_string()
            })
        );
        let doc = result.document.expect("document");
        assert!(doc.contains("| SKU001 |"));
        assert!(doc.contains("Orders fulfilled: 1"));
        assert!(doc.contains("Backordered: o2"));
        assert!(oracle.requests()[0].prompt.contains("\"backordered_orders\""));
    }

    #[test]
    fn blank_summary_is_rejected() {
        let state = WorkflowState::new(catalog(1, 20), Vec::new());
        let oracle = ScriptedOracle::new();
        for _ in 0..2 {
            oracle.push_reply(TaskKind::Report, r#"{"summary": "  "}"#);
        }
        let prompts = PromptEngine::new().expect("prompts");
        let cfg = PipelineConfig::default();
        let ctx = StageContext {
            oracle: &oracle,
            prompts: &prompts,
            config: &cfg,
            deadline: Instant::now() + Duration::from_secs(60),
            task_details: "Summarize.",
        };

        let err = run(&ctx, &state).unwrap_err();
        assert!(err.to_string().contains("empty report summary"));
    }
}
