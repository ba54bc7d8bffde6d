//! Shared deterministic types for the pipeline.
//!
//! Field names on the wire follow the catalog/listing vocabulary used by the
//! storefront (`supplier_sku`, `shopify_title`, ...), so artifacts can be fed to
//! downstream tooling unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::stage::Stage;

/// One supplier catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "supplier_sku")]
    pub sku: String,
    pub name: String,
    pub category: String,
    pub cost_price: f64,
    pub stock: u32,
    pub shipping_cost: f64,
}

/// One customer order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    #[serde(rename = "supplier_sku")]
    pub sku: String,
    pub quantity: u32,
}

/// A catalog item chosen by the sourcing stage.
///
/// Catalog fields are copied from the catalog, never from oracle output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    #[serde(rename = "supplier_sku")]
    pub sku: String,
    pub name: String,
    pub category: String,
    pub cost_price: f64,
    pub stock: u32,
    pub shipping_cost: f64,
    pub reasoning: String,
}

impl SelectedItem {
    pub fn from_record(record: &CatalogRecord, reasoning: impl Into<String>) -> Self {
        Self {
            sku: record.sku.clone(),
            name: record.name.clone(),
            category: record.category.clone(),
            cost_price: record.cost_price,
            stock: record.stock,
            shipping_cost: record.shipping_cost,
            reasoning: reasoning.into(),
        }
    }
}

/// Generated storefront copy for one SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingContent {
    #[serde(rename = "supplier_sku")]
    pub sku: String,
    #[serde(rename = "shopify_title")]
    pub title: String,
    #[serde(rename = "key_bullets")]
    pub bullets: Vec<String>,
    pub description_html: String,
    #[serde(rename = "seo_tags")]
    pub tags: Vec<String>,
}

/// Price floor for one SKU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    /// Always a multiple of 0.50.
    pub recommended_price: f64,
    /// Realized margin as a fraction of the recommended price (unrounded).
    pub margin: f64,
    /// `margin * 100`, rounded to two decimals for reporting.
    pub margin_percentage: f64,
}

/// Stock sync row consumed by the storefront inventory import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub supplier_sku: String,
    pub stock_level: u32,
    pub action: String,
}

impl StockUpdate {
    pub const SYNC_ACTION: &'static str = "SYNC_UPDATE";

    pub fn sync(sku: &str, stock_level: u32) -> Self {
        Self {
            supplier_sku: sku.to_string(),
            stock_level,
            action: Self::SYNC_ACTION.to_string(),
        }
    }
}

/// Dispatch decision for one selected SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingAssignment {
    #[serde(rename = "supplier_sku")]
    pub sku: String,
    /// Orders fully covered by available stock, in input order.
    pub fulfilled_orders: Vec<String>,
    /// Orders that could not be covered by remaining stock.
    pub backordered_orders: Vec<String>,
    pub units_allocated: u32,
    pub stock_update: StockUpdate,
}

/// Reference to the report artifact, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRef {
    pub path: String,
}

/// What happened when a history entry was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionOutcome {
    /// Run initialized with input data.
    Started,
    /// Stage handler ran and its postcondition held.
    Passed,
    /// Run reached `Done`.
    Completed,
    /// Run entered `Failed`.
    Failed,
}

/// Append-only transition log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: Stage,
    pub outcome: TransitionOutcome,
    pub timestamp: DateTime<Utc>,
}

/// A manager handoff suggestion that was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedHandoff {
    /// Stage that had just passed when the suggestion was made.
    pub from: Stage,
    /// Agent name as requested by the manager.
    pub requested: String,
    pub timestamp: DateTime<Utc>,
}
