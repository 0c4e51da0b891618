#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use llm_usage::store::RecordStream;
use llm_usage::{
    DailySummary, JsonlStore, PartitionKey, PartitionNaming, PricingTable, UsageError,
    UsageLedger, UsageRecord, UsageStore,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Ledger over a JSONL store in a fresh temporary directory.
pub fn temp_ledger() -> (TempDir, UsageLedger) {
    let dir = TempDir::new().unwrap();
    let ledger = UsageLedger::new(
        Arc::new(PricingTable::with_defaults()),
        Arc::new(JsonlStore::new(dir.path())),
    );
    (dir, ledger)
}

/// Write a partition file by hand, bypassing the store.
pub fn write_partition(dir: &Path, day: NaiveDate, lines: &[&str]) {
    let name = PartitionNaming::default().file_name(PartitionKey::for_date(day));
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(dir.join(name), content).unwrap();
}

pub fn stored_line(
    timestamp: &str,
    model: &str,
    operation: &str,
    input: u64,
    output: u64,
    input_cost: &str,
    output_cost: &str,
) -> String {
    serde_json::json!({
        "timestamp": timestamp,
        "model": model,
        "operation": operation,
        "input_tokens": input,
        "output_tokens": output,
        "input_cost": input_cost,
        "output_cost": output_cost,
    })
    .to_string()
}

/// Every record from `since` through today, merged into one summary. Used
/// by tests that record "now", which may fall on either side of midnight.
pub async fn summary_since(ledger: &UsageLedger, since: NaiveDate) -> DailySummary {
    let today = PartitionKey::today().date();
    let mut days = ledger.get_summaries(since, today).await.unwrap().into_iter();
    let mut total = days.next().unwrap();
    for day in days {
        total.merge(day);
    }
    total
}

fn unavailable() -> UsageError {
    UsageError::persistence(
        "/unavailable",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "storage unavailable"),
    )
}

/// Store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl UsageStore for FailingStore {
    async fn append(&self, _record: &UsageRecord) -> llm_usage::Result<()> {
        Err(unavailable())
    }

    async fn read(&self, _key: PartitionKey) -> llm_usage::Result<RecordStream> {
        Err(unavailable())
    }

    async fn partitions(&self) -> llm_usage::Result<Vec<PartitionKey>> {
        Err(unavailable())
    }
}
