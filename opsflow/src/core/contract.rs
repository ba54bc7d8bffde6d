//! Per-stage postconditions checked before a transition is allowed.
//!
//! Checks collect every broken invariant for the stage (in a stable order) and
//! report them together in one [`PipelineError::ContractViolation`]. State is
//! never repaired here.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::PipelineError;
use crate::core::pricing::{MARGIN_TOLERANCE, is_half_increment};
use crate::core::stage::Stage;
use crate::core::state::WorkflowState;
use crate::core::types::ListingContent;

pub const TITLE_MAX_CHARS: usize = 60;
pub const BULLETS_MIN: usize = 3;
pub const BULLETS_MAX: usize = 5;
pub const TAGS_MIN: usize = 5;
pub const TAGS_MAX: usize = 8;

static HTML_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(p|ul|ol|li|strong|em|b|i|br|h[1-6])\b[^>]*>").expect("valid regex")
});

/// Thresholds the contracts are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageContract {
    pub selection_size: usize,
    pub min_stock: u32,
    pub min_margin: f64,
}

impl StageContract {
    /// Validate the postcondition of `stage`, comparing the state before and after
    /// its handler output was applied.
    pub fn validate(
        &self,
        stage: Stage,
        before: &WorkflowState,
        after: &WorkflowState,
    ) -> Result<(), PipelineError> {
        let mut errors = Vec::new();
        check_ownership(stage, before, after, &mut errors);
        match stage {
            Stage::Sourcing => self.check_sourcing(before, after, &mut errors),
            Stage::Listing => check_listing(after, &mut errors),
            Stage::Pricing => self.check_pricing(after, &mut errors),
            Stage::Routing => check_keys(
                &after.selected_skus(),
                after.routing.keys().map(String::as_str),
                "routing assignment",
                &mut errors,
            ),
            Stage::Reporting => match &after.report {
                Some(report) if !report.path.trim().is_empty() => {}
                Some(_) => errors.push("report reference has an empty path".to_string()),
                None => errors.push("no report artifact reference recorded".to_string()),
            },
            Stage::Init | Stage::Done | Stage::Failed => {}
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(PipelineError::violation(stage, errors.join("; ")))
    }

    fn check_sourcing(
        &self,
        before: &WorkflowState,
        after: &WorkflowState,
        errors: &mut Vec<String>,
    ) {
        if !before.selected_items.is_empty() {
            errors.push(format!(
                "selection already holds {} items before sourcing",
                before.selected_items.len()
            ));
        }
        let count = after.selected_items.len();
        if count != self.selection_size {
            errors.push(format!(
                "selected count = {count}, expected {}",
                self.selection_size
            ));
        }

        let mut seen = HashSet::new();
        for item in &after.selected_items {
            if !seen.insert(item.sku.as_str()) {
                errors.push(format!("duplicate sku '{}'", item.sku));
            }
            match after.catalog_record(&item.sku) {
                None => errors.push(format!("sku '{}' not in catalog", item.sku)),
                Some(record) => {
                    if record.stock < self.min_stock {
                        errors.push(format!(
                            "sku '{}' stock {} below minimum {}",
                            item.sku, record.stock, self.min_stock
                        ));
                    }
                    if record.name != item.name
                        || record.category != item.category
                        || record.cost_price != item.cost_price
                        || record.stock != item.stock
                        || record.shipping_cost != item.shipping_cost
                    {
                        errors.push(format!("sku '{}' fields differ from catalog", item.sku));
                    }
                }
            }
            if item.reasoning.trim().is_empty() {
                errors.push(format!("sku '{}' has empty reasoning", item.sku));
            }
        }
    }

    fn check_pricing(&self, after: &WorkflowState, errors: &mut Vec<String>) {
        check_keys(
            &after.selected_skus(),
            after.prices.keys().map(String::as_str),
            "price",
            errors,
        );
        for (sku, price) in &after.prices {
            if price.margin < self.min_margin - MARGIN_TOLERANCE {
                errors.push(format!(
                    "sku '{sku}' margin {:.6} below minimum {}",
                    price.margin, self.min_margin
                ));
            }
            if price.recommended_price <= 0.0 || !is_half_increment(price.recommended_price) {
                errors.push(format!(
                    "sku '{sku}' price {} is not a positive multiple of 0.50",
                    price.recommended_price
                ));
            }
        }
    }
}

fn check_listing(after: &WorkflowState, errors: &mut Vec<String>) {
    check_keys(
        &after.selected_skus(),
        after.listings.keys().map(String::as_str),
        "listing",
        errors,
    );
    for (sku, listing) in &after.listings {
        if listing.sku != *sku {
            errors.push(format!(
                "listing keyed '{sku}' describes '{}'",
                listing.sku
            ));
        }
        check_listing_content(listing, errors);
    }
}

/// Copy-level checks for a single listing.
pub fn check_listing_content(listing: &ListingContent, errors: &mut Vec<String>) {
    let sku = &listing.sku;
    let title = listing.title.trim();
    if title.is_empty() {
        errors.push(format!("listing '{sku}' has empty title"));
    } else if title.chars().count() > TITLE_MAX_CHARS {
        errors.push(format!(
            "listing '{sku}' title exceeds {TITLE_MAX_CHARS} characters"
        ));
    }

    let bullets = listing.bullets.len();
    if !(BULLETS_MIN..=BULLETS_MAX).contains(&bullets) {
        errors.push(format!(
            "listing '{sku}' has {bullets} bullets, expected {BULLETS_MIN}-{BULLETS_MAX}"
        ));
    }
    if listing.bullets.iter().any(|b| b.trim().is_empty()) {
        errors.push(format!("listing '{sku}' has an empty bullet"));
    }

    let description = listing.description_html.trim();
    if description.is_empty() {
        errors.push(format!("listing '{sku}' has empty description"));
    } else if !HTML_ELEMENT_RE.is_match(description) {
        errors.push(format!("listing '{sku}' description contains no HTML markup"));
    }

    let tags = listing.tags.len();
    if !(TAGS_MIN..=TAGS_MAX).contains(&tags) {
        errors.push(format!(
            "listing '{sku}' has {tags} tags, expected {TAGS_MIN}-{TAGS_MAX}"
        ));
    }
    if listing.tags.iter().any(|t| t.trim().is_empty()) {
        errors.push(format!("listing '{sku}' has an empty tag"));
    }
}

/// Require the key set produced by a stage to equal the selected SKU set.
fn check_keys<'a>(
    expected: &BTreeSet<&str>,
    actual: impl Iterator<Item = &'a str>,
    what: &str,
    errors: &mut Vec<String>,
) {
    let actual: BTreeSet<&str> = actual.collect();
    for missing in expected.difference(&actual) {
        errors.push(format!("missing {what} for '{missing}'"));
    }
    for extra in actual.difference(expected) {
        errors.push(format!("unexpected {what} for '{extra}'"));
    }
}

/// A stage may only write the field it owns.
fn check_ownership(
    stage: Stage,
    before: &WorkflowState,
    after: &WorkflowState,
    errors: &mut Vec<String>,
) {
    if before.catalog_records != after.catalog_records {
        errors.push("catalog records changed".to_string());
    }
    if before.order_records != after.order_records {
        errors.push("order records changed".to_string());
    }
    if stage != Stage::Sourcing && before.selected_items != after.selected_items {
        errors.push(format!("{stage} modified selected items"));
    }
    if stage != Stage::Listing && before.listings != after.listings {
        errors.push(format!("{stage} modified listings"));
    }
    if stage != Stage::Pricing && before.prices != after.prices {
        errors.push(format!("{stage} modified prices"));
    }
    if stage != Stage::Routing
        && (before.routing != after.routing || before.unrouted_orders != after.unrouted_orders)
    {
        errors.push(format!("{stage} modified routing"));
    }
    if stage != Stage::Reporting && before.report != after.report {
        errors.push(format!("{stage} modified report reference"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::StageOutput;
    use crate::core::types::{PriceResult, ReportRef, SelectedItem};
    use crate::test_support::{catalog, listing_for, selected};
    use std::collections::BTreeMap;

    fn contract() -> StageContract {
        StageContract {
            selection_size: 10,
            min_stock: 10,
            min_margin: 0.25,
        }
    }

    fn initial() -> WorkflowState {
        WorkflowState::new(catalog(12, 20), Vec::new())
    }

    fn sourced() -> WorkflowState {
        let state = initial();
        StageOutput::Selection(selected(&state.catalog_records[..10])).applied(&state)
    }

    #[test]
    fn sourcing_accepts_exact_selection() {
        let before = initial();
        let after = sourced();
        contract()
            .validate(Stage::Sourcing, &before, &after)
            .expect("valid");
    }

    #[test]
    fn sourcing_reports_short_selection() {
        let before = initial();
        let after =
            StageOutput::Selection(selected(&before.catalog_records[..7])).applied(&before);
        let err = contract()
            .validate(Stage::Sourcing, &before, &after)
            .unwrap_err();
        assert!(err.to_string().contains("selected count = 7, expected 10"));
    }

    #[test]
    fn sourcing_rejects_duplicates_unknown_and_low_stock() {
        let mut before = initial();
        before.catalog_records[1].stock = 3;
        let mut items = selected(&before.catalog_records[..10]);
        items[2] = items[0].clone();
        items[3].sku = "GHOST".to_string();
        let after = StageOutput::Selection(items).applied(&before);

        let err = contract()
            .validate(Stage::Sourcing, &before, &after)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate sku 'SKU001'"));
        assert!(msg.contains("sku 'GHOST' not in catalog"));
        assert!(msg.contains("sku 'SKU002' stock 3 below minimum 10"));
    }

    #[test]
    fn sourcing_rejects_fields_that_differ_from_catalog() {
        let before = initial();
        let mut items = selected(&before.catalog_records[..10]);
        items[0].cost_price = 0.01;
        let after = StageOutput::Selection(items).applied(&before);

        let err = contract()
            .validate(Stage::Sourcing, &before, &after)
            .unwrap_err();
        assert!(err.to_string().contains("fields differ from catalog"));
    }

    #[test]
    fn listing_requires_matching_keys_and_copy_shape() {
        let before = sourced();
        let mut listings: BTreeMap<String, ListingContent> = before
            .selected_items
            .iter()
            .map(|item| (item.sku.clone(), listing_for(&item.sku)))
            .collect();
        contract()
            .validate(
                Stage::Listing,
                &before,
                &StageOutput::Listings(listings.clone()).applied(&before),
            )
            .expect("valid listings");

        listings.remove("SKU001");
        if let Some(listing) = listings.get_mut("SKU002") {
            listing.bullets.truncate(2);
            listing.tags.clear();
            listing.description_html = "plain text".to_string();
        }
        let err = contract()
            .validate(
                Stage::Listing,
                &before,
                &StageOutput::Listings(listings).applied(&before),
            )
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("missing listing for 'SKU001'"));
        assert!(msg.contains("listing 'SKU002' has 2 bullets, expected 3-5"));
        assert!(msg.contains("listing 'SKU002' has 0 tags, expected 5-8"));
        assert!(msg.contains("no HTML markup"));
    }

    #[test]
    fn pricing_enforces_margin_floor_with_tolerance() {
        let before = sourced();
        let mut prices: BTreeMap<String, PriceResult> = before
            .selected_items
            .iter()
            .map(|item| {
                (
                    item.sku.clone(),
                    PriceResult {
                        recommended_price: 25.0,
                        margin: 0.25 - 1e-9,
                        margin_percentage: 25.0,
                    },
                )
            })
            .collect();
        contract()
            .validate(
                Stage::Pricing,
                &before,
                &StageOutput::Prices(prices.clone()).applied(&before),
            )
            .expect("within tolerance");

        if let Some(price) = prices.get_mut("SKU003") {
            price.margin = 0.20;
            price.recommended_price = 24.75;
        }
        let err = contract()
            .validate(
                Stage::Pricing,
                &before,
                &StageOutput::Prices(prices).applied(&before),
            )
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sku 'SKU003' margin"));
        assert!(msg.contains("not a positive multiple of 0.50"));
    }

    #[test]
    fn stage_may_not_touch_fields_it_does_not_own() {
        let before = sourced();
        let mut after = before.clone();
        after.selected_items[0] = SelectedItem {
            reasoning: "rewritten".to_string(),
            ..after.selected_items[0].clone()
        };
        after.report = Some(ReportRef {
            path: "report.md".to_string(),
        });

        let err = contract()
            .validate(Stage::Reporting, &before, &after)
            .unwrap_err();
        assert!(err.to_string().contains("reporting modified selected items"));
    }

    #[test]
    fn reporting_requires_reference() {
        let before = sourced();
        let err = contract()
            .validate(Stage::Reporting, &before, &before.clone())
            .unwrap_err();
        assert!(err.to_string().contains("no report artifact reference"));
    }
}
