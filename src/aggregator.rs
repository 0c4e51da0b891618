//! Usage Aggregator
//!
//! Folds one partition into a [`DailySummary`] in a single streaming pass.
//! The fold only adds, so the result does not depend on record order and
//! partial summaries can be combined with [`DailySummary::merge`].

use crate::error::{Result, UsageError};
use crate::models::{DailySummary, ModelSummary, OperationSummary, UsageRecord};
use crate::partition::PartitionKey;
use crate::store::UsageStore;
use chrono::NaiveDate;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest inclusive range accepted by [`UsageAggregator::summarize_range`].
pub const MAX_RANGE_DAYS: i64 = 366;

pub struct UsageAggregator {
    store: Arc<dyn UsageStore>,
}

impl UsageAggregator {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Summary for `date`. A storage failure yields a degraded summary with
    /// zero totals and the error attached instead of an `Err`.
    pub async fn summarize(&self, date: NaiveDate) -> DailySummary {
        match self.try_summarize(date).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(%date, error = %e, kind = e.kind(), "Failed to summarize usage");
                DailySummary::degraded(date, &e)
            }
        }
    }

    pub async fn try_summarize(&self, date: NaiveDate) -> Result<DailySummary> {
        let mut records = self.store.read(PartitionKey::for_date(date)).await?;
        let mut summary = DailySummary::empty(date);

        while let Some(item) = records.next().await {
            match item {
                Ok(record) => summary.add_record(&record),
                Err(e) if e.is_corrupt_record() => {
                    summary.skipped_records = summary.skipped_records.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }

        if summary.skipped_records > 0 {
            info!(
                %date,
                skipped = summary.skipped_records,
                aggregated = summary.record_count,
                "Summarized partition with corrupt entries left out"
            );
        } else {
            debug!(%date, records = summary.record_count, "Summarized partition");
        }

        Ok(summary)
    }

    /// One summary per day from `since` to `until`, both inclusive. Days
    /// without records are present with zero totals.
    pub async fn summarize_range(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailySummary>> {
        validate_range(since, until)?;

        let mut summaries = Vec::new();
        for date in since.iter_days().take_while(|date| *date <= until) {
            summaries.push(self.summarize(date).await);
        }
        Ok(summaries)
    }
}

pub fn validate_range(since: NaiveDate, until: NaiveDate) -> Result<()> {
    if since > until {
        return Err(UsageError::validation(format!(
            "range start {since} is after range end {until}"
        )));
    }

    let days = (until - since).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(UsageError::validation(format!(
            "range of {days} days exceeds the limit of {MAX_RANGE_DAYS}"
        )));
    }
    Ok(())
}

impl DailySummary {
    pub fn add_record(&mut self, record: &UsageRecord) {
        self.total_cost = self.total_cost.saturating_add(record.total_cost);
        self.total_input_tokens = self.total_input_tokens.saturating_add(record.input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(record.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(record.total_tokens);
        self.record_count = self.record_count.saturating_add(1);

        let model = self.models.entry(record.model.clone()).or_default();
        model.cost = model.cost.saturating_add(record.total_cost);
        model.input_tokens = model.input_tokens.saturating_add(record.input_tokens);
        model.output_tokens = model.output_tokens.saturating_add(record.output_tokens);
        model.call_count = model.call_count.saturating_add(1);

        let operation = model.operations.entry(record.operation.clone()).or_default();
        operation.count = operation.count.saturating_add(1);
        operation.cost = operation.cost.saturating_add(record.total_cost);
        operation.tokens = operation.tokens.saturating_add(record.total_tokens);
    }

    /// Fold `other` into `self`. Totals combine commutatively; `self.date` is
    /// kept, and an existing error wins over one from `other`.
    pub fn merge(&mut self, other: DailySummary) {
        self.total_cost = self.total_cost.saturating_add(other.total_cost);
        self.total_input_tokens = self
            .total_input_tokens
            .saturating_add(other.total_input_tokens);
        self.total_output_tokens = self
            .total_output_tokens
            .saturating_add(other.total_output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.record_count = self.record_count.saturating_add(other.record_count);
        self.skipped_records = self.skipped_records.saturating_add(other.skipped_records);

        for (name, model) in other.models {
            self.models.entry(name).or_default().merge(model);
        }

        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

impl ModelSummary {
    pub fn merge(&mut self, other: ModelSummary) {
        self.cost = self.cost.saturating_add(other.cost);
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.call_count = self.call_count.saturating_add(other.call_count);

        for (name, operation) in other.operations {
            self.operations.entry(name).or_default().merge(operation);
        }
    }
}

impl OperationSummary {
    pub fn merge(&mut self, other: OperationSummary) {
        self.count = self.count.saturating_add(other.count);
        self.cost = self.cost.saturating_add(other.cost);
        self.tokens = self.tokens.saturating_add(other.tokens);
    }
}
