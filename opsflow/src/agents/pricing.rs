//! Pricing agent: deterministic price floors for the selection.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::core::error::PipelineError;
use crate::core::pricing::compute_minimum_price;
use crate::core::state::{StageOutput, WorkflowState};
use crate::io::config::PipelineConfig;

#[instrument(skip_all, fields(selected = state.selected_items.len()))]
pub fn run(config: &PipelineConfig, state: &WorkflowState) -> Result<StageOutput, PipelineError> {
    let params = config.pricing();
    let mut prices = BTreeMap::new();
    for item in &state.selected_items {
        let price = compute_minimum_price(item.cost_price, item.shipping_cost, &params)?;
        debug!(sku = %item.sku, price = price.recommended_price, margin = price.margin, "priced");
        prices.insert(item.sku.clone(), price);
    }
    Ok(StageOutput::Prices(prices))
}
