//! Core Data Models
//!
//! This module defines the data structures that flow through the accounting
//! engine, from a single model invocation to a day's rollup.
//!
//! ## Data Flow
//!
//! 1. **Input**: [`UsageRequest`] - validated request schema at the boundary
//! 2. **Pricing**: [`CostBreakdown`] - cost of one invocation, returned to the caller
//! 3. **Storage**: [`UsageRecord`] - the append-only log entry
//! 4. **Reports**: [`DailySummary`] - per-model and per-operation rollup for one UTC date
//!
//! ## Invariants
//!
//! - `total_tokens == input_tokens + output_tokens` on every breakdown and record
//! - `total_cost == input_cost + output_cost` on every breakdown and record
//! - A summary's model costs add up to its total, and each model's operation
//!   costs add up to the model cost
//!
//! Monetary values are [`rust_decimal::Decimal`] and serialize as strings so
//! stored records read back value-for-value.

use crate::error::{Result, UsageError};
use crate::timestamp::parse_timestamp;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation tag used for stored entries that carry none.
pub const UNKNOWN_OPERATION: &str = "unknown";

/// Date format used in partition names, queries and summaries.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Free-form key/value data attached to a record; stored, never interpreted.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CostBreakdown {
    /// Placeholder returned when the cost could not be computed.
    pub fn zero(input_tokens: u64, output_tokens: u64, error: impl Into<String>) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            input_cost: Decimal::ZERO,
            output_cost: Decimal::ZERO,
            cost: Decimal::ZERO,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub operation: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl UsageRecord {
    /// Stamp a new record with the current UTC time.
    pub fn new(
        model: impl Into<String>,
        operation: impl Into<String>,
        breakdown: &CostBreakdown,
        metadata: Option<Metadata>,
    ) -> Self {
        Self::at(Utc::now(), model, operation, breakdown, metadata)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        model: impl Into<String>,
        operation: impl Into<String>,
        breakdown: &CostBreakdown,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            timestamp,
            model: model.into(),
            operation: operation.into(),
            input_tokens: breakdown.input_tokens,
            output_tokens: breakdown.output_tokens,
            total_tokens: breakdown.input_tokens.saturating_add(breakdown.output_tokens),
            input_cost: breakdown.input_cost,
            output_cost: breakdown.output_cost,
            total_cost: breakdown.input_cost.saturating_add(breakdown.output_cost),
            metadata,
        }
    }

    /// UTC calendar date of the record, which selects its partition.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// On-disk shape of a record.
///
/// Accepts entries written by earlier versions of the application: naive
/// timestamps, no `operation`, numeric costs, `cost` instead of `total_cost`.
/// Totals are re-derived from their components rather than trusted.
#[derive(Debug, Deserialize)]
struct StoredRecord {
    timestamp: String,
    model: String,
    #[serde(default)]
    operation: Option<String>,
    input_tokens: u64,
    output_tokens: u64,
    input_cost: Decimal,
    output_cost: Decimal,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl TryFrom<StoredRecord> for UsageRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> std::result::Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&stored.timestamp)?;

        if stored.input_cost.is_sign_negative() || stored.output_cost.is_sign_negative() {
            return Err(format!(
                "negative cost (input {}, output {})",
                stored.input_cost, stored.output_cost
            ));
        }

        let operation = stored
            .operation
            .filter(|op| !op.is_empty())
            .unwrap_or_else(|| UNKNOWN_OPERATION.to_string());

        Ok(Self {
            timestamp,
            model: stored.model,
            operation,
            input_tokens: stored.input_tokens,
            output_tokens: stored.output_tokens,
            total_tokens: stored.input_tokens.saturating_add(stored.output_tokens),
            input_cost: stored.input_cost,
            output_cost: stored.output_cost,
            total_cost: stored.input_cost.saturating_add(stored.output_cost),
            metadata: stored.metadata,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub count: u64,
    pub cost: Decimal,
    pub tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub cost: Decimal,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub call_count: u64,
    pub operations: BTreeMap<String, OperationSummary>,
}

/// Rollup of one UTC date. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_cost: Decimal,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub record_count: u64,
    pub models: BTreeMap<String, ModelSummary>,
    /// Entries that could not be decoded and were left out
    #[serde(default)]
    pub skipped_records: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DailySummary {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_cost: Decimal::ZERO,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_tokens: 0,
            record_count: 0,
            models: BTreeMap::new(),
            skipped_records: 0,
            error: None,
        }
    }

    /// Zero totals plus the failure that prevented aggregation.
    pub fn degraded(date: NaiveDate, error: &UsageError) -> Self {
        Self {
            error: Some(format!("{}: {}", error.kind(), error)),
            ..Self::empty(date)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}

/// Request schema accepted at the facade boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageRequest {
    pub model: String,
    pub operation: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl UsageRequest {
    pub fn new(
        model: impl Into<String>,
        operation: impl Into<String>,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Self {
        Self {
            model: model.into(),
            operation: operation.into(),
            input_tokens,
            output_tokens,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(UsageError::validation("model must not be empty"));
        }
        if self.operation.trim().is_empty() {
            return Err(UsageError::validation("operation must not be empty"));
        }
        if self.input_tokens < 0 {
            return Err(UsageError::validation(format!(
                "input_tokens must be non-negative, got {}",
                self.input_tokens
            )));
        }
        if self.output_tokens < 0 {
            return Err(UsageError::validation(format!(
                "output_tokens must be non-negative, got {}",
                self.output_tokens
            )));
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        UsageError::validation(format!("invalid date {value:?}, expected YYYY-MM-DD: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn breakdown() -> CostBreakdown {
        CostBreakdown {
            input_tokens: 1000,
            output_tokens: 500,
            total_tokens: 1500,
            input_cost: Decimal::new(1, 2),
            output_cost: Decimal::new(15, 3),
            cost: Decimal::new(25, 3),
            error: None,
        }
    }

    #[test]
    fn test_record_derives_totals() {
        let record = UsageRecord::new("GPT-4o", "summarize", &breakdown(), None);
        assert_eq!(record.total_tokens, 1500);
        assert_eq!(record.total_cost, Decimal::new(25, 3));
    }

    #[test]
    fn test_record_json_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("pdf_name".to_string(), serde_json::json!("report.pdf"));
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let record = UsageRecord::at(ts, "Claude", "ask_question", &breakdown(), Some(metadata));

        let line = serde_json::to_string(&record).unwrap();
        let decoded: UsageRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_legacy_token_log_entry() {
        let line = concat!(
            r#"{"timestamp": "2024-01-15T10:30:00.123456","#,
            r#""model": "GPT-4o", "operation": "summarize","#,
            r#""input_tokens": 1000, "output_tokens": 500,"#,
            r#""total_tokens": 1500, "input_cost": 0.01,"#,
            r#""output_cost": 0.015, "cost": 0.025}"#,
        );
        let record: UsageRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.operation, "summarize");
        assert_eq!(record.input_cost, Decimal::new(1, 2));
        assert_eq!(record.total_cost, Decimal::new(25, 3));
    }

    #[test]
    fn test_decode_legacy_cost_log_entry_without_operation() {
        let line = concat!(
            r#"{"timestamp": "2024-01-15T10:30:00", "model": "Grok","#,
            r#""input_tokens": 10, "output_tokens": 20,"#,
            r#""input_cost": 0.00005, "output_cost": 0.0003,"#,
            r#""total_cost": 0.00035}"#,
        );
        let record: UsageRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.operation, UNKNOWN_OPERATION);
        assert_eq!(record.total_tokens, 30);
    }

    #[test]
    fn test_decode_rejects_negative_cost() {
        let line = concat!(
            r#"{"timestamp": "2024-01-15T10:30:00Z", "model": "m","#,
            r#""operation": "x", "input_tokens": 1, "output_tokens": 1,"#,
            r#""input_cost": "-0.5", "output_cost": "0"}"#,
        );
        assert!(serde_json::from_str::<UsageRecord>(line).is_err());
    }

    #[test]
    fn test_decode_rejects_negative_tokens() {
        let line = concat!(
            r#"{"timestamp": "2024-01-15T10:30:00Z", "model": "m","#,
            r#""operation": "x", "input_tokens": -1, "output_tokens": 1,"#,
            r#""input_cost": "0", "output_cost": "0"}"#,
        );
        assert!(serde_json::from_str::<UsageRecord>(line).is_err());
    }

    #[test]
    fn test_request_validation() {
        assert!(UsageRequest::new("GPT-4o", "summarize", 10, 0).validate().is_ok());
        assert!(UsageRequest::new("", "summarize", 10, 0).validate().is_err());
        assert!(UsageRequest::new("GPT-4o", "  ", 10, 0).validate().is_err());
        assert!(UsageRequest::new("GPT-4o", "summarize", -1, 0).validate().is_err());
        assert!(UsageRequest::new("GPT-4o", "summarize", 0, -7).validate().is_err());
    }

    #[test]
    fn test_request_rejects_unknown_fields() {
        let body = concat!(
            r#"{"model": "GPT-4o", "operation": "summarize","#,
            r#""input_tokens": 1, "output_tokens": 2, "question": "why"}"#,
        );
        assert!(serde_json::from_str::<UsageRequest>(body).is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(matches!(
            parse_date("2024/02/29"),
            Err(UsageError::Validation(_))
        ));
        assert!(parse_date("2023-02-29").is_err());
    }

    #[test]
    fn test_degraded_summary_has_zero_totals() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let err = UsageError::persistence(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let summary = DailySummary::degraded(date, &err);
        assert!(summary.is_degraded());
        assert!(summary.is_empty());
        assert_eq!(summary.total_cost, Decimal::ZERO);
        assert!(summary.error.unwrap().starts_with("persistence"));
    }
}
