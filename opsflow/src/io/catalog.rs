//! CSV loaders for the supplier catalog and the order book.
//!
//! A row that does not parse or breaks a field rule is skipped with a warning.
//! Only an unreadable file or a missing required column is fatal.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::types::{CatalogRecord, OrderRecord};

pub const CATALOG_COLUMNS: [&str; 6] = [
    "supplier_sku",
    "name",
    "category",
    "cost_price",
    "stock",
    "shipping_cost",
];
pub const ORDER_COLUMNS: [&str; 3] = ["order_id", "supplier_sku", "quantity"];

/// Rows accepted from a CSV file plus a count of skipped rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

pub fn load_catalog(path: &Path) -> Result<Loaded<CatalogRecord>> {
    let reader = open(path)?;
    read_catalog(reader).with_context(|| format!("read catalog {}", path.display()))
}

pub fn load_orders(path: &Path) -> Result<Loaded<OrderRecord>> {
    let reader = open(path)?;
    read_orders(reader).with_context(|| format!("read orders {}", path.display()))
}

/// Parse catalog rows from any reader.
pub fn read_catalog<R: Read>(reader: R) -> Result<Loaded<CatalogRecord>> {
    let mut seen = HashSet::new();
    read_rows(reader, &CATALOG_COLUMNS, |record: &CatalogRecord| {
        if record.sku.is_empty() {
            return Err("empty supplier_sku".to_string());
        }
        for (field, value) in [
            ("cost_price", record.cost_price),
            ("shipping_cost", record.shipping_cost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{field} must be a non-negative number, got {value}"));
            }
        }
        // A free item prices at 0 when the fixed platform fee is 0 too.
        if record.cost_price + record.shipping_cost <= 0.0 {
            return Err("cost_price + shipping_cost must be > 0".to_string());
        }
        if !seen.insert(record.sku.clone()) {
            return Err(format!("duplicate supplier_sku '{}'", record.sku));
        }
        Ok(())
    })
}

/// Parse order rows from any reader.
pub fn read_orders<R: Read>(reader: R) -> Result<Loaded<OrderRecord>> {
    let mut seen = HashSet::new();
    read_rows(reader, &ORDER_COLUMNS, |order: &OrderRecord| {
        if order.order_id.is_empty() || order.sku.is_empty() {
            return Err("empty order_id or supplier_sku".to_string());
        }
        if order.quantity == 0 {
            return Err("quantity must be > 0".to_string());
        }
        if !seen.insert(order.order_id.clone()) {
            return Err(format!("duplicate order_id '{}'", order.order_id));
        }
        Ok(())
    })
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).with_context(|| format!("open {}", path.display()))
}

fn read_rows<R, T, F>(reader: R, required: &[&str], mut check: F) -> Result<Loaded<T>>
where
    R: Read,
    T: DeserializeOwned,
    F: FnMut(&T) -> std::result::Result<(), String>,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers().context("read header row")?.clone();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!("missing required columns: {}", missing.join(", ")));
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (idx, result) in csv_reader.deserialize::<T>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(line, err = %err, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };
        if let Err(reason) = check(&row) {
            warn!(line, %reason, "skipping invalid row");
            skipped += 1;
            continue;
        }
        rows.push(row);
    }

    debug!(rows = rows.len(), skipped, "csv loaded");
    Ok(Loaded { rows, skipped })
}

/// Render catalog rows back to CSV in the canonical column order.
pub fn catalog_to_csv(records: &[CatalogRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record).context("serialize catalog row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("flush csv: {}", err.error()))?;
    String::from_utf8(bytes).context("catalog csv is not utf-8")
}
