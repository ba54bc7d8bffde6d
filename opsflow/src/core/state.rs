//! The shared aggregate threaded through every stage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::error::FailureRecord;
use crate::core::stage::Stage;
use crate::core::types::{
    CatalogRecord, HistoryEntry, ListingContent, OrderRecord, PriceResult, RejectedHandoff,
    ReportRef, RoutingAssignment, SelectedItem, TransitionOutcome,
};

/// Single mutable aggregate owned by the orchestrator for the duration of a run.
///
/// Stage handlers never receive `&mut WorkflowState`; they return a
/// [`StageOutput`] which the orchestrator applies to a copy, validates, and
/// then swaps in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
    pub stage: Stage,
    pub catalog_records: Vec<CatalogRecord>,
    pub order_records: Vec<OrderRecord>,
    pub selected_items: Vec<SelectedItem>,
    pub listings: BTreeMap<String, ListingContent>,
    pub prices: BTreeMap<String, PriceResult>,
    pub routing: BTreeMap<String, RoutingAssignment>,
    /// Orders whose SKU was not selected, in input order.
    pub unrouted_orders: Vec<String>,
    pub report: Option<ReportRef>,
    pub history: Vec<HistoryEntry>,
    pub rejected_handoffs: Vec<RejectedHandoff>,
    pub failure: Option<FailureRecord>,
}

impl WorkflowState {
    pub fn new(catalog_records: Vec<CatalogRecord>, order_records: Vec<OrderRecord>) -> Self {
        Self {
            stage: Stage::Init,
            catalog_records,
            order_records,
            selected_items: Vec::new(),
            listings: BTreeMap::new(),
            prices: BTreeMap::new(),
            routing: BTreeMap::new(),
            unrouted_orders: Vec::new(),
            report: None,
            history: Vec::new(),
            rejected_handoffs: Vec::new(),
            failure: None,
        }
    }

    pub fn selected_skus(&self) -> BTreeSet<&str> {
        self.selected_items
            .iter()
            .map(|item| item.sku.as_str())
            .collect()
    }

    pub fn catalog_record(&self, sku: &str) -> Option<&CatalogRecord> {
        self.catalog_records.iter().find(|record| record.sku == sku)
    }

    pub fn record_transition(
        &mut self,
        stage: Stage,
        outcome: TransitionOutcome,
        at: DateTime<Utc>,
    ) {
        self.history.push(HistoryEntry {
            stage,
            outcome,
            timestamp: at,
        });
    }

    /// Enter `Failed`. Only the first failure is kept.
    pub fn fail(&mut self, failure: FailureRecord, at: DateTime<Utc>) {
        if self.failure.is_some() || self.stage.is_terminal() {
            return;
        }
        self.failure = Some(failure);
        self.stage = Stage::Failed;
        self.record_transition(Stage::Failed, TransitionOutcome::Failed, at);
    }
}

/// Output of a stage handler, applied by the orchestrator only on success.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Selection(Vec<SelectedItem>),
    Listings(BTreeMap<String, ListingContent>),
    Prices(BTreeMap<String, PriceResult>),
    Routing {
        assignments: BTreeMap<String, RoutingAssignment>,
        unrouted_orders: Vec<String>,
    },
    Report(ReportRef),
}

impl StageOutput {
    /// Stage that is allowed to produce this output.
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Selection(_) => Stage::Sourcing,
            StageOutput::Listings(_) => Stage::Listing,
            StageOutput::Prices(_) => Stage::Pricing,
            StageOutput::Routing { .. } => Stage::Routing,
            StageOutput::Report(_) => Stage::Reporting,
        }
    }

    /// Write this output into the field owned by its stage.
    pub fn apply_to(self, state: &mut WorkflowState) {
        match self {
            StageOutput::Selection(items) => state.selected_items = items,
            StageOutput::Listings(listings) => state.listings = listings,
            StageOutput::Prices(prices) => state.prices = prices,
            StageOutput::Routing {
                assignments,
                unrouted_orders,
            } => {
                state.routing = assignments;
                state.unrouted_orders = unrouted_orders;
            }
            StageOutput::Report(report) => state.report = Some(report),
        }
    }

    /// Preview `state` with this output applied, leaving `state` untouched.
    pub fn applied(&self, state: &WorkflowState) -> WorkflowState {
        let mut candidate = state.clone();
        self.clone().apply_to(&mut candidate);
        candidate
    }
}
