//! Test-only fixtures: catalog rows, listings, orders and a scripted oracle.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::core::types::{CatalogRecord, ListingContent, OrderRecord, SelectedItem};
use crate::io::catalog::{CATALOG_COLUMNS, ORDER_COLUMNS};
use crate::io::oracle::{OracleError, OracleRequest, TaskKind, TaskOracle};

/// Catalog row with fixed prices and the given stock.
pub fn record(sku: &str, stock: u32) -> CatalogRecord {
    CatalogRecord {
        sku: sku.to_string(),
        name: format!("{sku} item"),
        category: "General".to_string(),
        cost_price: 10.0,
        stock,
        shipping_cost: 5.0,
    }
}

/// `n` rows `SKU001..` with distinct costs, all holding `stock` units.
pub fn catalog(n: usize, stock: u32) -> Vec<CatalogRecord> {
    (1..=n)
        .map(|i| CatalogRecord {
            sku: format!("SKU{i:03}"),
            name: format!("Premium item {i}"),
            category: if i % 2 == 0 { "Home Goods" } else { "Electronics" }.to_string(),
            cost_price: 5.0 + i as f64 * 1.5,
            stock,
            shipping_cost: 2.0 + (i % 3) as f64,
        })
        .collect()
}

/// Select every row, with a canned reasoning.
pub fn selected(records: &[CatalogRecord]) -> Vec<SelectedItem> {
    records
        .iter()
        .map(|record| {
            SelectedItem::from_record(
                record,
                format!("{} has steady demand and room for margin.", record.name),
            )
        })
        .collect()
}

/// A listing that satisfies every copy rule.
pub fn listing_for(sku: &str) -> ListingContent {
    ListingContent {
        sku: sku.to_string(),
        title: format!("{sku} Everyday Essential"),
        bullets: vec![
            "Built to last".to_string(),
            "Ships fast".to_string(),
            "Loved by customers".to_string(),
        ],
        description_html: format!("<p>The <strong>{sku}</strong> makes every day easier.</p>"),
        tags: ["essential", "home", "gift", "everyday", "bestseller"]
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
    }
}

pub fn order(id: &str, sku: &str, quantity: u32) -> OrderRecord {
    OrderRecord {
        order_id: id.to_string(),
        sku: sku.to_string(),
        quantity,
    }
}

/// Sourcing reply selecting `skus`.
pub fn selection_reply(skus: &[&str]) -> String {
    let picks: Vec<_> = skus
        .iter()
        .map(|sku| json!({ "supplier_sku": sku, "reasoning": format!("{sku} clears the margin floor.") }))
        .collect();
    json!({ "selected_products": picks }).to_string()
}

/// Listing reply with a valid listing per SKU, wrapped in a code fence.
pub fn listings_reply(skus: &[&str]) -> String {
    let listings: Vec<_> = skus.iter().map(|sku| listing_for(sku)).collect();
    format!(
        "Here are the listings:\n```json\n{}\n```\n",
        json!({ "listings": listings })
    )
}

pub fn handoff_reply(agent_name: &str, task_details: &str) -> String {
    json!({ "agent_name": agent_name, "task_details": task_details }).to_string()
}

pub fn report_reply() -> String {
    json!({
        "summary": "Run completed with healthy margins.",
        "highlights": ["All selected SKUs priced above the margin floor."],
    })
    .to_string()
}

/// Oracle that replays queued replies per task kind and records every request.
///
/// A task kind with an empty queue answers `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<HashMap<TaskKind, VecDeque<Result<String, OracleError>>>>,
    delays: RefCell<HashMap<TaskKind, Duration>>,
    requests: RefCell<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, kind: TaskKind, reply: impl Into<String>) {
        self.push(kind, Ok(reply.into()));
    }

    pub fn push_err(&self, kind: TaskKind, err: OracleError) {
        self.push(kind, Err(err));
    }

    /// Sleep for `delay` before answering any `kind` request.
    pub fn delay(&self, kind: TaskKind, delay: Duration) {
        self.delays.borrow_mut().insert(kind, delay);
    }

    fn push(&self, kind: TaskKind, reply: Result<String, OracleError>) {
        self.replies
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push_back(reply);
    }

    /// Queue one valid reply for every oracle-backed stage of a run.
    pub fn script_successful_run(&self, skus: &[&str]) {
        self.push_reply(TaskKind::Sourcing, selection_reply(skus));
        self.push_reply(TaskKind::Listing, listings_reply(skus));
        self.push_reply(TaskKind::Report, report_reply());
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_for(&self, kind: TaskKind) -> Vec<OracleRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.kind == kind)
            .cloned()
            .collect()
    }
}

impl TaskOracle for ScriptedOracle {
    fn propose(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(delay) = self.delays.borrow().get(&request.kind) {
            std::thread::sleep(*delay);
        }
        self.replies
            .borrow_mut()
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(OracleError::Unavailable(format!(
                    "no scripted reply for {}",
                    request.kind
                )))
            })
    }
}

/// Temporary directory holding `catalog.csv`, `orders.csv` and an `out/` dir.
pub struct RunDir {
    temp: tempfile::TempDir,
}

impl RunDir {
    pub fn new(catalog: &[CatalogRecord], orders: &[OrderRecord]) -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let run_dir = Self { temp };
        write_csv(&run_dir.catalog_path(), &CATALOG_COLUMNS, catalog)?;
        write_csv(&run_dir.orders_path(), &ORDER_COLUMNS, orders)?;
        Ok(run_dir)
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.path().join("catalog.csv")
    }

    pub fn orders_path(&self) -> PathBuf {
        self.path().join("orders.csv")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn read_artifact(&self, name: &str) -> Result<String> {
        let path = self.out_dir().join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

/// Header is written explicitly so an empty file still carries its columns.
fn write_csv<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    writer.write_record(columns).context("write csv header")?;
    for row in rows {
        writer.serialize(row).context("serialize csv row")?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}
