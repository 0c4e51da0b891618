//! Usage Ledger
//!
//! The accounting facade, and the only interface the rest of an application
//! needs: price a model invocation, append it to the usage log, and report
//! daily summaries.
//!
//! ## Best-effort accounting
//!
//! [`UsageLedger::record_usage`] always hands back the computed
//! [`CostBreakdown`]. A failed append is logged and counted in
//! [`LedgerStats::persist_failures`] but never surfaces as an error, so
//! accounting cannot break the operation being accounted for.
//!
//! ## Example
//!
//! ```rust
//! use llm_usage::{MemoryStore, PricingTable, UsageLedger};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let ledger = UsageLedger::new(
//!     Arc::new(PricingTable::with_defaults()),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let cost = ledger.record_usage("GPT-4o", "summarize", 1000, 500, None).await;
//! assert_eq!(cost.total_tokens, 1500);
//!
//! let today = ledger.get_summary(None).await;
//! assert_eq!(today.record_count, 1);
//! # }
//! ```

use crate::aggregator::UsageAggregator;
use crate::calculator::CostCalculator;
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    parse_date, CostBreakdown, DailySummary, Metadata, UsageRecord, UsageRequest,
};
use crate::partition::{PartitionKey, PartitionNaming};
use crate::pricing::PricingTable;
use crate::store::{JsonlStore, UsageStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters of best-effort outcomes since the ledger was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Records durably appended
    pub recorded: u64,
    /// Appends that failed and were dropped
    pub persist_failures: u64,
    /// Calls whose negative token counts were clamped to zero
    pub clamped_requests: u64,
    /// Calls priced at zero because the cost computation failed
    pub degraded_costs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    persist_failures: AtomicU64,
    clamped_requests: AtomicU64,
    degraded_costs: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LedgerStats {
        LedgerStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            clamped_requests: self.clamped_requests.load(Ordering::Relaxed),
            degraded_costs: self.degraded_costs.load(Ordering::Relaxed),
        }
    }
}

pub struct UsageLedger {
    calculator: CostCalculator,
    store: Arc<dyn UsageStore>,
    aggregator: UsageAggregator,
    counters: Counters,
}

impl UsageLedger {
    pub fn new(pricing: Arc<PricingTable>, store: Arc<dyn UsageStore>) -> Self {
        Self {
            calculator: CostCalculator::new(pricing),
            aggregator: UsageAggregator::new(Arc::clone(&store)),
            store,
            counters: Counters::default(),
        }
    }

    /// Ledger over a JSONL store and the pricing table described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pricing = PricingTable::with_overrides(&config.pricing.models)?;
        let naming = PartitionNaming::new(config.paths.partition_prefix.clone());
        let store = JsonlStore::with_naming(config.paths.usage_log_directory.clone(), naming);

        info!(
            directory = %store.root().display(),
            prefix = store.naming().prefix(),
            models = pricing.len(),
            "Usage ledger ready"
        );

        Ok(Self::new(Arc::new(pricing), Arc::new(store)))
    }

    pub fn pricing(&self) -> &PricingTable {
        self.calculator.pricing()
    }

    pub fn stats(&self) -> LedgerStats {
        self.counters.snapshot()
    }

    /// Price one model invocation and append it to the usage log.
    ///
    /// Negative token counts are clamped to zero. The breakdown is returned
    /// whether or not the append succeeded.
    pub async fn record_usage(
        &self,
        model: &str,
        operation: &str,
        input_tokens: i64,
        output_tokens: i64,
        metadata: Option<Metadata>,
    ) -> CostBreakdown {
        if input_tokens < 0 || output_tokens < 0 {
            warn!(
                model,
                operation,
                input_tokens,
                output_tokens,
                "Negative token count clamped to zero"
            );
            Counters::bump(&self.counters.clamped_requests);
        }

        let breakdown = self.calculator.compute(model, input_tokens, output_tokens);
        if breakdown.is_degraded() {
            Counters::bump(&self.counters.degraded_costs);
        }

        let record = UsageRecord::new(model, operation, &breakdown, metadata);
        match self.store.append(&record).await {
            Ok(()) => {
                Counters::bump(&self.counters.recorded);
                debug!(
                    model,
                    operation,
                    total_tokens = breakdown.total_tokens,
                    cost = %breakdown.cost,
                    "Recorded usage"
                );
            }
            Err(e) => {
                Counters::bump(&self.counters.persist_failures);
                warn!(
                    model,
                    operation,
                    error = %e,
                    kind = e.kind(),
                    "Failed to persist usage record"
                );
            }
        }

        breakdown
    }

    /// Strict entry point for untrusted payloads: rejects the request instead
    /// of clamping it.
    pub async fn record(&self, request: UsageRequest) -> Result<CostBreakdown> {
        request.validate()?;
        let UsageRequest {
            model,
            operation,
            input_tokens,
            output_tokens,
            metadata,
        } = request;

        Ok(self
            .record_usage(&model, &operation, input_tokens, output_tokens, metadata)
            .await)
    }

    /// Summary for `date`, or for today (UTC) when `None`.
    pub async fn get_summary(&self, date: Option<NaiveDate>) -> DailySummary {
        let date = date.unwrap_or_else(|| PartitionKey::today().date());
        self.aggregator.summarize(date).await
    }

    /// Like [`get_summary`](Self::get_summary) with the date as `YYYY-MM-DD`.
    /// A blank date means today.
    pub async fn get_summary_for(&self, date: Option<&str>) -> Result<DailySummary> {
        let date = date
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(parse_date)
            .transpose()?;
        Ok(self.get_summary(date).await)
    }

    pub async fn get_summaries(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailySummary>> {
        self.aggregator.summarize_range(since, until).await
    }

    /// Dates that have a usage partition, oldest first.
    pub async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        let partitions = self.store.partitions().await?;
        Ok(partitions.into_iter().map(|key| key.date()).collect())
    }
}
