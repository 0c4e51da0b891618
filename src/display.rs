//! Output Formatting and Display
//!
//! Human-readable colored terminal output and JSON output for the CLI.
//!
//! ## Report Types
//! - **Recorded call**: the cost breakdown of one accounted invocation
//! - **Daily summary**: totals for one date with a per-model and per-operation
//!   breakdown
//! - **Range report**: one line per day plus range totals
//! - **Dates**: the dates that have recorded usage
//! - **Pricing**: the configured rates and the fallback rate
//!
//! Every `render_*` method returns the text instead of printing it; the
//! `display_*` methods print either that text or the JSON form.

use crate::models::{CostBreakdown, DailySummary};
use crate::pricing::PricingTable;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write;

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayManager {
    json_pretty: bool,
}

#[derive(Serialize)]
struct PricingView<'a> {
    models: Vec<&'a crate::pricing::PricingEntry>,
    fallback: crate::pricing::Rates,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_json(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    pub fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        json.context("Failed to serialize output as JSON")
    }

    pub fn display_breakdown(
        &self,
        model: &str,
        operation: &str,
        breakdown: &CostBreakdown,
        json_output: bool,
    ) -> Result<()> {
        let out = if json_output {
            self.to_json(breakdown)?
        } else {
            self.render_breakdown(model, operation, breakdown)
        };
        println!("{out}");
        Ok(())
    }

    pub fn display_summary(&self, summary: &DailySummary, json_output: bool) -> Result<()> {
        let out = if json_output {
            self.to_json(summary)?
        } else {
            self.render_summary(summary)
        };
        println!("{out}");
        Ok(())
    }

    pub fn display_range(&self, summaries: &[DailySummary], json_output: bool) -> Result<()> {
        let out = if json_output {
            self.to_json(&serde_json::json!({ "daily": summaries }))?
        } else {
            self.render_range(summaries)
        };
        println!("{out}");
        Ok(())
    }

    pub fn display_dates(&self, dates: &[NaiveDate], json_output: bool) -> Result<()> {
        let out = if json_output {
            self.to_json(&serde_json::json!({ "dates": dates }))?
        } else {
            self.render_dates(dates)
        };
        println!("{out}");
        Ok(())
    }

    pub fn display_pricing(&self, pricing: &PricingTable, json_output: bool) -> Result<()> {
        let out = if json_output {
            self.to_json(&PricingView {
                models: pricing.entries(),
                fallback: pricing.fallback(),
            })?
        } else {
            self.render_pricing(pricing)
        };
        println!("{out}");
        Ok(())
    }

    pub fn render_breakdown(
        &self,
        model: &str,
        operation: &str,
        breakdown: &CostBreakdown,
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} / {}",
            "✅".bright_green(),
            model.bright_cyan().bold(),
            operation.bright_white()
        );
        let _ = writeln!(
            out,
            "   Tokens: {} in + {} out = {}",
            breakdown.input_tokens.to_string().bright_white(),
            breakdown.output_tokens.to_string().bright_white(),
            breakdown.total_tokens.to_string().bright_white().bold()
        );
        let _ = write!(
            out,
            "   Cost:   {} in + {} out = {}",
            money(breakdown.input_cost).green(),
            money(breakdown.output_cost).green(),
            money(breakdown.cost).bright_green().bold()
        );
        if let Some(error) = &breakdown.error {
            let _ = write!(out, "\n   {} {}", "⚠️ cost unavailable:".bright_yellow(), error);
        }
        out
    }

    pub fn render_summary(&self, summary: &DailySummary) -> String {
        let mut out = header(&format!("LLM Usage Summary - {}", summary.date));

        if let Some(error) = &summary.error {
            let _ = writeln!(out, "{} {}", "❌ Summary unavailable:".bright_red().bold(), error);
            return out;
        }

        let _ = writeln!(
            out,
            "\n{} {} calls • {} tokens • {} total\n",
            "📊".bright_yellow(),
            summary.record_count.to_string().bright_white().bold(),
            summary.total_tokens.to_string().bright_white().bold(),
            money(summary.total_cost).bright_green().bold()
        );

        if summary.models.is_empty() {
            let _ = writeln!(out, "   {}", "No usage recorded".dimmed());
        }

        for (name, model) in &summary.models {
            let _ = writeln!(
                out,
                "   {}: {} ({}%, {} calls, {} in / {} out)",
                name.bright_cyan(),
                money(model.cost).bright_green(),
                percentage(model.cost, summary.total_cost).bright_yellow(),
                model.call_count.to_string().bright_white(),
                model.input_tokens,
                model.output_tokens
            );
            for (operation, op) in &model.operations {
                let _ = writeln!(
                    out,
                    "      {} {}: {} ({} calls, {} tokens)",
                    "•".dimmed(),
                    operation,
                    money(op.cost).green(),
                    op.count,
                    op.tokens
                );
            }
        }

        if summary.skipped_records > 0 {
            let _ = writeln!(
                out,
                "\n{} {} corrupt entries skipped",
                "⚠️".bright_yellow(),
                summary.skipped_records
            );
        }
        out
    }

    pub fn render_range(&self, summaries: &[DailySummary]) -> String {
        let title = match (summaries.first(), summaries.last()) {
            (Some(first), Some(last)) => {
                format!("LLM Usage Report - {} to {}", first.date, last.date)
            }
            _ => "LLM Usage Report".to_string(),
        };
        let mut out = header(&title);

        let totals = summaries.iter().cloned().reduce(|mut acc, summary| {
            acc.merge(summary);
            acc
        });

        if let Some(totals) = &totals {
            let _ = writeln!(
                out,
                "\n{} {} days • {} calls • {} total\n",
                "📊".bright_yellow(),
                summaries.len().to_string().bright_white().bold(),
                totals.record_count.to_string().bright_white().bold(),
                money(totals.total_cost).bright_green().bold()
            );
        }

        for summary in summaries {
            let status = if summary.is_degraded() {
                "unavailable".bright_red().to_string()
            } else {
                format!("{} calls", summary.record_count)
            };
            let _ = writeln!(
                out,
                "{} {} - {} ({})",
                "📅".bright_blue(),
                summary.date.to_string().bright_white().bold(),
                money(summary.total_cost).bright_green(),
                status
            );
        }
        out
    }

    pub fn render_dates(&self, dates: &[NaiveDate]) -> String {
        let mut out = header("Recorded Usage Dates");
        let _ = writeln!(out);

        if dates.is_empty() {
            let _ = write!(out, "   {}", "No usage recorded".dimmed());
            return out;
        }
        for date in dates {
            let _ = writeln!(out, "{} {}", "📅".bright_blue(), date.to_string().bright_white());
        }
        out
    }

    pub fn render_pricing(&self, pricing: &PricingTable) -> String {
        let mut out = header("Model Pricing (USD per 1K tokens)");
        let _ = writeln!(out);

        for entry in pricing.entries() {
            let _ = writeln!(
                out,
                "   {:<20} input {}  output {}",
                entry.model_id.bright_cyan(),
                money(entry.input_rate_per_1k).bright_green(),
                money(entry.output_rate_per_1k).bright_green()
            );
        }

        let fallback = pricing.fallback();
        let _ = write!(
            out,
            "\n   {:<20} input {}  output {}",
            "(other models)".dimmed(),
            money(fallback.input_per_1k).green(),
            money(fallback.output_per_1k).green()
        );
        out
    }
}

fn header(title: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!(
        "{}\n{}\n{}\n",
        rule.bright_cyan(),
        title.bright_white().bold(),
        rule.bright_cyan()
    )
}

fn money(value: Decimal) -> String {
    format!("${}", value.round_dp(6).normalize())
}

fn percentage(part: Decimal, total: Decimal) -> String {
    part.checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(total))
        .map(|pct| pct.round_dp(0).to_string())
        .unwrap_or_else(|| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageRecord;

    fn summary() -> DailySummary {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut summary = DailySummary::empty(date);
        for (model, op, cost) in [("GPT-4o", "summarize", 25), ("Claude", "ask_question", 75)] {
            let breakdown = CostBreakdown {
                input_tokens: 100,
                output_tokens: 50,
                total_tokens: 150,
                input_cost: Decimal::new(cost, 3),
                output_cost: Decimal::ZERO,
                cost: Decimal::new(cost, 3),
                error: None,
            };
            let ts = date.and_hms_opt(9, 0, 0).unwrap().and_utc();
            summary.add_record(&UsageRecord::at(ts, model, op, &breakdown, None));
        }
        summary
    }

    #[test]
    fn test_render_summary_lists_models_and_operations() {
        let out = DisplayManager::new().render_summary(&summary());
        assert!(out.contains("2024-01-15"));
        assert!(out.contains("GPT-4o"));
        assert!(out.contains("ask_question"));
        assert!(out.contains("$0.1"));
    }

    #[test]
    fn test_render_empty_summary() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let out = DisplayManager::new().render_summary(&DailySummary::empty(date));
        assert!(out.contains("No usage recorded"));
    }

    #[test]
    fn test_render_range_totals() {
        let day_one = summary();
        let mut day_two = summary();
        day_two.date = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();

        let out = DisplayManager::new().render_range(&[day_one, day_two]);
        assert!(out.contains("2024-01-15 to 2024-01-16"));
        assert!(out.contains("$0.2"));
    }

    #[test]
    fn test_render_dates() {
        let dates = [
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 17).unwrap(),
        ];
        let out = DisplayManager::new().render_dates(&dates);
        assert!(out.contains("2024-01-15"));
        assert!(out.contains("2024-01-17"));
        assert!(DisplayManager::new().render_dates(&[]).contains("No usage recorded"));
    }

    #[test]
    fn test_render_pricing_includes_fallback() {
        let out = DisplayManager::new().render_pricing(&PricingTable::with_defaults());
        assert!(out.contains("DeepSeek"));
        assert!(out.contains("$0.0009"));
        assert!(out.contains("other models"));
    }

    #[test]
    fn test_json_output_keeps_decimal_strings() {
        let json = DisplayManager::new().to_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_cost"], "0.100");
        assert_eq!(value["models"]["Claude"]["call_count"], 1);
    }
}
