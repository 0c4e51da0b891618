//! Per-model pricing table
//!
//! Rates are USD per 1000 tokens. The table is built once at startup from the
//! built-in entries plus any overrides from configuration, and never changes
//! afterwards. Unknown models are priced at the fallback rate instead of being
//! rejected.

use crate::error::{Result, UsageError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Fallback input rate: $0.01 per 1K tokens.
pub const DEFAULT_INPUT_RATE_PER_1K: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
/// Fallback output rate: $0.03 per 1K tokens.
pub const DEFAULT_OUTPUT_RATE_PER_1K: Decimal = Decimal::from_parts(3, 0, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub model_id: String,
    pub input_rate_per_1k: Decimal,
    pub output_rate_per_1k: Decimal,
}

impl PricingEntry {
    pub fn new(
        model_id: impl Into<String>,
        input_rate_per_1k: Decimal,
        output_rate_per_1k: Decimal,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            input_rate_per_1k,
            output_rate_per_1k,
        }
    }

    pub fn rates(&self) -> Rates {
        Rates {
            input_per_1k: self.input_rate_per_1k,
            output_per_1k: self.output_rate_per_1k,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(UsageError::validation("pricing entry has an empty model id"));
        }
        if self.input_rate_per_1k.is_sign_negative()
            || self.output_rate_per_1k.is_sign_negative()
        {
            return Err(UsageError::validation(format!(
                "pricing for {} must be non-negative",
                self.model_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rates {
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
}

impl Rates {
    pub const FALLBACK: Rates = Rates {
        input_per_1k: DEFAULT_INPUT_RATE_PER_1K,
        output_per_1k: DEFAULT_OUTPUT_RATE_PER_1K,
    };
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<String, PricingEntry>,
    fallback: Rates,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PricingTable {
    /// Table holding only the given entries, with the standard fallback.
    pub fn new(entries: impl IntoIterator<Item = PricingEntry>) -> Result<Self> {
        let mut table = Self {
            entries: HashMap::new(),
            fallback: Rates::FALLBACK,
        };
        table.extend(entries)?;
        Ok(table)
    }

    /// The models offered by the application.
    pub fn with_defaults() -> Self {
        let entries = [
            PricingEntry::new("GPT-4o", Decimal::new(1, 2), Decimal::new(3, 2)),
            PricingEntry::new("Gemini-Flash", Decimal::new(35, 4), Decimal::new(35, 4)),
            PricingEntry::new("DeepSeek", Decimal::new(9, 4), Decimal::new(9, 4)),
            PricingEntry::new("Claude", Decimal::new(8, 3), Decimal::new(24, 3)),
            PricingEntry::new("Grok", Decimal::new(5, 3), Decimal::new(15, 3)),
        ];

        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.model_id.clone(), entry))
                .collect(),
            fallback: Rates::FALLBACK,
        }
    }

    /// Built-in table with configured entries layered on top.
    pub fn with_overrides(overrides: &[PricingEntry]) -> Result<Self> {
        let mut table = Self::with_defaults();
        table.extend(overrides.iter().cloned())?;
        Ok(table)
    }

    fn extend(&mut self, entries: impl IntoIterator<Item = PricingEntry>) -> Result<()> {
        for entry in entries {
            entry.validate()?;
            debug!(
                model = %entry.model_id,
                input_rate = %entry.input_rate_per_1k,
                output_rate = %entry.output_rate_per_1k,
                "Registered model pricing"
            );
            self.entries.insert(entry.model_id.clone(), entry);
        }
        Ok(())
    }

    /// Rates for `model`, or the fallback when the model is not listed.
    pub fn rate_for(&self, model: &str) -> Rates {
        self.entries
            .get(model)
            .map(PricingEntry::rates)
            .unwrap_or(self.fallback)
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    pub fn fallback(&self) -> Rates {
        self.fallback
    }

    /// Entries ordered by model id.
    pub fn entries(&self) -> Vec<&PricingEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_rates() {
        let table = PricingTable::with_defaults();
        let rates = table.rate_for("GPT-4o");
        assert_eq!(rates.input_per_1k, Decimal::new(1, 2));
        assert_eq!(rates.output_per_1k, Decimal::new(3, 2));
        assert!(table.is_known("Claude"));
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_unknown_model_uses_fallback_every_time() {
        let table = PricingTable::with_defaults();
        let first = table.rate_for("UnknownModel");
        let second = table.rate_for("UnknownModel");
        assert_eq!(first, second);
        assert_eq!(first, Rates::FALLBACK);
        assert_eq!(first.input_per_1k, Decimal::new(1, 2));
        assert_eq!(first.output_per_1k, Decimal::new(3, 2));
    }

    #[test]
    fn test_lookup_is_exact() {
        let table = PricingTable::with_defaults();
        assert!(!table.is_known("gpt-4o"));
        assert_eq!(table.rate_for("gpt-4o"), Rates::FALLBACK);
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let table = PricingTable::with_overrides(&[
            PricingEntry::new("GPT-4o", Decimal::new(25, 4), Decimal::new(1, 2)),
            PricingEntry::new("Mistral", Decimal::new(2, 3), Decimal::new(6, 3)),
        ])
        .unwrap();
        assert_eq!(table.rate_for("GPT-4o").input_per_1k, Decimal::new(25, 4));
        assert!(table.is_known("Mistral"));
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn test_negative_rate_rejected() {
        let result =
            PricingTable::new([PricingEntry::new("Bad", Decimal::new(-1, 2), Decimal::ZERO)]);
        assert!(matches!(result, Err(UsageError::Validation(_))));
    }

    #[test]
    fn test_entries_sorted() {
        let table = PricingTable::with_defaults();
        let ids: Vec<_> = table.entries().iter().map(|e| e.model_id.as_str()).collect();
        assert_eq!(ids, vec!["Claude", "DeepSeek", "GPT-4o", "Gemini-Flash", "Grok"]);
    }
}
