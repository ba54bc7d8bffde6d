//! Prompt rendering for oracle tasks and the final report document.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

const SOURCING_TEMPLATE: &str = include_str!("prompts/sourcing.md");
const LISTING_TEMPLATE: &str = include_str!("prompts/listing.md");
const HANDOFF_TEMPLATE: &str = include_str!("prompts/handoff.md");
const REPORT_TEMPLATE: &str = include_str!("prompts/report.md");
const REPORT_DOC_TEMPLATE: &str = include_str!("prompts/report_doc.md");

/// Inputs for the sourcing prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SourcingPrompt<'a> {
    pub task_details: &'a str,
    pub selection_size: usize,
    pub min_stock: u32,
    pub min_margin_pct: String,
    pub catalog_csv: &'a str,
    /// Rejection reason from the previous attempt, if any.
    pub feedback: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingPrompt<'a> {
    pub task_details: &'a str,
    pub products_json: &'a str,
    pub title_max_chars: usize,
    pub bullets_min: usize,
    pub bullets_max: usize,
    pub tags_min: usize,
    pub tags_max: usize,
    pub feedback: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffPrompt<'a> {
    pub completed: &'a str,
    pub selected_count: usize,
    pub listing_count: usize,
    pub price_count: usize,
    pub order_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPrompt<'a> {
    pub task_details: &'a str,
    pub facts_json: &'a str,
    pub feedback: Option<&'a str>,
}

/// One table row of the rendered report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub stock: u32,
    pub price: String,
    pub margin_percentage: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDoc<'a> {
    pub generated_at: String,
    pub summary: &'a str,
    pub highlights: &'a [String],
    pub rows: Vec<ReportRow>,
    pub fulfilled: usize,
    pub backordered: usize,
    pub unrouted: usize,
    pub backordered_orders: Vec<&'a str>,
}

/// Template engine wrapper around minijinja.
///
/// Template names carry no extension, so output is never HTML-escaped.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("sourcing", SOURCING_TEMPLATE),
            ("listing", LISTING_TEMPLATE),
            ("handoff", HANDOFF_TEMPLATE),
            ("report", REPORT_TEMPLATE),
            ("report_doc", REPORT_DOC_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    pub fn sourcing(&self, input: &SourcingPrompt<'_>) -> Result<String> {
        self.render("sourcing", input)
    }

    pub fn listing(&self, input: &ListingPrompt<'_>) -> Result<String> {
        self.render("listing", input)
    }

    pub fn handoff(&self, input: &HandoffPrompt<'_>) -> Result<String> {
        self.render("handoff", input)
    }

    pub fn report(&self, input: &ReportPrompt<'_>) -> Result<String> {
        self.render("report", input)
    }

    pub fn report_doc(&self, input: &ReportDoc<'_>) -> Result<String> {
        self.render("report_doc", input)
    }

    fn render<S: Serialize>(&self, name: &str, input: &S) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(input)
            .with_context(|| format!("render {name} template"))?;
        debug!(template = name, bytes = rendered.len(), "prompt rendered");
        Ok(rendered)
    }
}
