//! Dropshipping operations pipeline.
//!
//! A run takes a supplier catalog and an order book through a fixed sequence of
//! stages (sourcing, listing, pricing, routing, reporting) and writes one
//! artifact per stage. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (pricing, filtering, contracts,
//!   routing, state). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (CSV, artifacts, config, oracle
//!   processes). Isolated behind traits to enable scripted tests.
//! - **[`agents`]**: Stage handlers that combine the two.
//!
//! [`pipeline`] owns the state machine that drives a run to `Done` or `Failed`.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
