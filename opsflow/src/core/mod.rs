//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod catalog_filter;
pub mod contract;
pub mod error;
pub mod handoff;
pub mod pricing;
pub mod routing;
pub mod stage;
pub mod state;
pub mod types;
