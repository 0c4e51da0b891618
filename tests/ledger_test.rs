//! Accounting facade scenarios over a real JSONL directory

mod common;

use common::{date, stored_line, summary_since, temp_ledger, write_partition, FailingStore};
use llm_usage::{
    DailySummary, JsonlStore, MemoryStore, Metadata, PartitionKey, PricingEntry, PricingTable,
    UsageError, UsageLedger, UsageRequest,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn assert_additive(summary: &DailySummary) {
    let model_total: Decimal = summary.models.values().map(|m| m.cost).sum();
    assert_eq!(summary.total_cost, model_total);
    for model in summary.models.values() {
        let op_total: Decimal = model.operations.values().map(|o| o.cost).sum();
        assert_eq!(model.cost, op_total);
    }
}

#[tokio::test]
async fn test_single_call_cost() {
    let (_dir, ledger) = temp_ledger();
    let cost = ledger.record_usage("GPT-4o", "summarize", 1000, 500, None).await;

    assert_eq!(cost.input_cost, Decimal::new(1, 2));
    assert_eq!(cost.output_cost, Decimal::new(15, 3));
    assert_eq!(cost.cost, Decimal::new(25, 3));
    assert_eq!(cost.total_tokens, 1500);
}

#[tokio::test]
async fn test_two_operations_same_model() {
    let (_dir, ledger) = temp_ledger();
    let since = PartitionKey::today().date();
    ledger.record_usage("GPT-4o", "summarize", 1000, 500, None).await;
    ledger.record_usage("GPT-4o", "ask_question", 200, 100, None).await;

    let summary = summary_since(&ledger, since).await;
    let gpt = &summary.models["GPT-4o"];
    assert_eq!(gpt.input_tokens, 1200);
    assert_eq!(gpt.output_tokens, 600);
    assert_eq!(gpt.operations.len(), 2);
    assert_eq!(gpt.operations["summarize"].count, 1);
    assert_eq!(gpt.operations["ask_question"].count, 1);
    assert_additive(&summary);
}

#[tokio::test]
async fn test_unknown_model_fallback() {
    let (_dir, ledger) = temp_ledger();
    let cost = ledger.record_usage("UnknownModel", "x", 1000, 1000, None).await;
    assert_eq!(cost.cost, Decimal::new(4, 2));
    assert!(cost.error.is_none());
}

#[tokio::test]
async fn test_corrupt_line_does_not_block_aggregation() {
    let (dir, ledger) = temp_ledger();
    let day = date(2024, 1, 15);
    let lines = [
        stored_line("2024-01-15T08:00:00Z", "GPT-4o", "summarize", 1000, 500, "0.01", "0.015"),
        "{\"timestamp\": \"2024-01-15T09:00:00Z\", \"model\": \"trunc".to_string(),
        stored_line(
            "2024-01-15T10:00:00Z",
            "Claude",
            "ask_question",
            1000,
            1000,
            "0.008",
            "0.024",
        ),
    ];
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_partition(dir.path(), day, &refs);

    let summary = ledger.get_summary(Some(day)).await;
    assert!(!summary.is_degraded());
    assert_eq!(summary.record_count, 2);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(summary.total_cost, Decimal::new(57, 3));
    assert_additive(&summary);
}

#[tokio::test]
async fn test_empty_day_is_zero_summary() {
    let (_dir, ledger) = temp_ledger();
    let summary = ledger.get_summary(Some(date(2020, 2, 29))).await;
    assert!(summary.is_empty());
    assert!(summary.models.is_empty());
    assert_eq!(summary.total_cost, Decimal::ZERO);
    assert!(summary.error.is_none());
}

#[tokio::test]
async fn test_metadata_is_stored() {
    let (dir, ledger) = temp_ledger();
    let mut metadata = Metadata::new();
    metadata.insert("question_length".to_string(), serde_json::json!(42));
    ledger.record_usage("Grok", "ask_question", 10, 20, Some(metadata)).await;

    let mut content = String::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        content.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
    }
    assert!(content.contains("\"question_length\":42"));
}

#[tokio::test]
async fn test_persist_failure_still_returns_breakdown() {
    let ledger = UsageLedger::new(
        Arc::new(PricingTable::with_defaults()),
        Arc::new(FailingStore),
    );

    let cost = ledger.record_usage("GPT-4o", "summarize", 1000, 500, None).await;
    assert_eq!(cost.cost, Decimal::new(25, 3));

    let stats = ledger.stats();
    assert_eq!(stats.persist_failures, 1);
    assert_eq!(stats.recorded, 0);

    let summary = ledger.get_summary(None).await;
    assert!(summary.is_degraded());
    assert_eq!(summary.total_cost, Decimal::ZERO);
    assert!(summary.error.unwrap().starts_with("persistence"));
}

#[tokio::test]
async fn test_strict_record_validates() {
    let (_dir, ledger) = temp_ledger();

    let err = ledger.record(UsageRequest::new("", "summarize", 1, 1)).await.unwrap_err();
    assert!(matches!(err, UsageError::Validation(_)));

    let ok = ledger.record(UsageRequest::new("Claude", "summarize", 1000, 0)).await.unwrap();
    assert_eq!(ok.cost, Decimal::new(8, 3));
    assert_eq!(ledger.stats().recorded, 1);
}

#[tokio::test]
async fn test_malformed_date_is_validation_error() {
    let (_dir, ledger) = temp_ledger();
    let err = ledger.get_summary_for(Some("2024-13-01")).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn test_range_covers_every_day() {
    let ledger = UsageLedger::new(
        Arc::new(PricingTable::with_defaults()),
        Arc::new(MemoryStore::new()),
    );
    let summaries = ledger.get_summaries(date(2024, 1, 30), date(2024, 2, 2)).await.unwrap();
    assert_eq!(summaries.len(), 4);
    assert!(ledger.get_summaries(date(2024, 2, 2), date(2024, 1, 30)).await.is_err());
}

#[tokio::test]
async fn test_concurrent_recording_is_lossless() {
    let (_dir, ledger) = temp_ledger();
    let ledger = Arc::new(ledger);
    let since = PartitionKey::today().date();

    let tasks: Vec<_> = (0..40i64)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let model = if i % 2 == 0 { "GPT-4o" } else { "DeepSeek" };
                ledger.record_usage(model, "batch", 100 + i, 50, None).await
            })
        })
        .collect();

    let mut expected = Decimal::ZERO;
    for task in tasks {
        expected += task.await.unwrap().cost;
    }

    let summary = summary_since(&ledger, since).await;
    assert_eq!(summary.record_count, 40);
    assert_eq!(summary.total_cost, expected);
    assert_eq!(ledger.stats().recorded, 40);
}

#[tokio::test]
async fn test_dropped_caller_still_records() {
    let (_dir, ledger) = temp_ledger();
    let ledger = Arc::new(ledger);
    let since = PartitionKey::today().date();

    let task = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            ledger.record_usage("GPT-4o", "summarize", 1000, 500, None).await
        })
    };
    // Let the task reach the pending append, then cancel it.
    tokio::task::yield_now().await;
    task.abort();
    let _ = task.await;

    let mut landed = 0;
    for _ in 0..500 {
        landed = summary_since(&ledger, since).await.record_count;
        if landed > 0 {
            break;
        }
        tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(10)))
            .await
            .unwrap();
    }
    assert_eq!(landed, 1);
}

#[tokio::test]
async fn test_overflowing_cost_is_recorded_at_zero() {
    let dir = TempDir::new().unwrap();
    let table =
        PricingTable::new([PricingEntry::new("Huge", Decimal::MAX, Decimal::ZERO)]).unwrap();
    let ledger = UsageLedger::new(Arc::new(table), Arc::new(JsonlStore::new(dir.path())));
    let since = PartitionKey::today().date();

    let breakdown = ledger.record_usage("Huge", "summarize", 5000, 10, None).await;
    assert!(breakdown.error.is_some());
    assert_eq!(breakdown.cost, Decimal::ZERO);

    let stats = ledger.stats();
    assert_eq!(stats.degraded_costs, 1);
    assert_eq!(stats.recorded, 1);

    let summary = summary_since(&ledger, since).await;
    assert!(summary.error.is_none());
    assert_eq!(summary.record_count, 1);
    assert_eq!(summary.total_cost, Decimal::ZERO);
    assert_eq!(summary.total_input_tokens, 5000);
    assert_eq!(summary.total_output_tokens, 10);
    assert_eq!(summary.models["Huge"].operations["summarize"].tokens, 5010);
}

#[tokio::test]
async fn test_blank_date_means_today() {
    let (_dir, ledger) = temp_ledger();
    let before = PartitionKey::today().date();
    let summary = ledger.get_summary_for(Some("")).await.unwrap();
    let after = PartitionKey::today().date();
    assert!((before..=after).contains(&summary.date));
}

#[tokio::test]
async fn test_available_dates_lists_partitions() {
    let (dir, ledger) = temp_ledger();
    let line = stored_line("2024-01-15T08:00:00Z", "GPT-4o", "summarize", 10, 5, "0", "0");
    write_partition(dir.path(), date(2024, 1, 17), &[&line]);
    write_partition(dir.path(), date(2024, 1, 15), &[&line]);
    std::fs::write(dir.path().join("notes.txt"), "not a partition").unwrap();

    let dates = ledger.available_dates().await.unwrap();
    assert_eq!(dates, vec![date(2024, 1, 15), date(2024, 1, 17)]);

    let failing = UsageLedger::new(
        Arc::new(PricingTable::with_defaults()),
        Arc::new(FailingStore),
    );
    assert!(failing.available_dates().await.is_err());
}
