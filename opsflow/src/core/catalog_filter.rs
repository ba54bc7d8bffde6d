//! Deterministic stock filtering over catalog rows.

use crate::core::error::PipelineError;
use crate::core::types::CatalogRecord;

/// Keep rows with `stock >= min_stock`, in original order, truncated to `limit`.
///
/// Fails with [`PipelineError::EmptyEligibleSet`] when no row qualifies.
pub fn select_eligible(
    records: &[CatalogRecord],
    min_stock: u32,
    limit: usize,
) -> Result<Vec<CatalogRecord>, PipelineError> {
    let eligible: Vec<CatalogRecord> = records
        .iter()
        .filter(|record| record.stock >= min_stock)
        .take(limit)
        .cloned()
        .collect();
    if eligible.is_empty() {
        return Err(PipelineError::EmptyEligibleSet { min_stock });
    }
    Ok(eligible)
}
