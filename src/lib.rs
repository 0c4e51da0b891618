//! LLM Usage Library
//!
//! Usage accounting and cost attribution for LLM calls. Every model
//! invocation is priced from a per-model rate table, appended to a durable,
//! date-partitioned log, and rolled up on demand into daily summaries broken
//! down by model and operation.
//!
//! ## Architecture Overview
//!
//! - [`pricing`] - per-model rates with a fallback for unknown models
//! - [`calculator`] - decimal cost computation that never fails outward
//! - [`partition`] - date partition keys and file naming
//! - [`store`] - the [`UsageStore`] trait with JSONL and in-memory backends
//! - [`aggregator`] - single-pass folding of a partition into a [`DailySummary`]
//! - [`ledger`] - the [`UsageLedger`] facade, the interface applications use
//! - [`server`] - axum routes over the ledger (feature `server`)
//! - [`config`] - layered configuration with environment overrides
//! - [`logging`] - tracing subscriber setup
//! - [`display`] - terminal and JSON rendering for the CLI
//!
//! ## Main Entry Point
//!
//! ```rust
//! use llm_usage::{JsonlStore, PricingTable, UsageLedger};
//! use std::sync::Arc;
//!
//! # async fn example(dir: &std::path::Path) {
//! let ledger = UsageLedger::new(
//!     Arc::new(PricingTable::with_defaults()),
//!     Arc::new(JsonlStore::new(dir)),
//! );
//!
//! let cost = ledger.record_usage("Claude", "ask_question", 1200, 300, None).await;
//! println!("call cost ${}", cost.cost);
//!
//! let summary = ledger.get_summary(None).await;
//! println!("today ${} over {} calls", summary.total_cost, summary.record_count);
//! # }
//! ```

pub mod aggregator;
pub mod calculator;
pub mod config;
pub mod display;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod partition;
pub mod pricing;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod timestamp;

pub use aggregator::UsageAggregator;
pub use calculator::CostCalculator;
pub use config::Config;
pub use error::{Result, UsageError};
pub use ledger::{LedgerStats, UsageLedger};
pub use models::{
    CostBreakdown, DailySummary, Metadata, ModelSummary, OperationSummary, UsageRecord,
    UsageRequest,
};
pub use partition::{PartitionKey, PartitionNaming};
pub use pricing::{PricingEntry, PricingTable, Rates};
pub use store::{JsonlStore, MemoryStore, UsageStore};
