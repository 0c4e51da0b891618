//! Cost calculation
//!
//! `cost = tokens / 1000 * rate`, computed in decimal arithmetic so identical
//! inputs produce identical outputs on every platform. [`CostCalculator::compute`]
//! never fails: negative token counts are clamped to zero, and an arithmetic
//! failure degrades to a zero-cost breakdown that carries the error.

use crate::error::{Result, UsageError};
use crate::models::CostBreakdown;
use crate::pricing::PricingTable;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

const TOKENS_PER_RATE_UNIT: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Negative counts become zero. Callers that want them rejected validate first.
pub fn clamp_tokens(tokens: i64) -> u64 {
    u64::try_from(tokens).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct CostCalculator {
    pricing: Arc<PricingTable>,
}

impl CostCalculator {
    pub fn new(pricing: Arc<PricingTable>) -> Self {
        Self { pricing }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn compute(&self, model: &str, input_tokens: i64, output_tokens: i64) -> CostBreakdown {
        let input = clamp_tokens(input_tokens);
        let output = clamp_tokens(output_tokens);

        match self.try_compute(model, input, output) {
            Ok(breakdown) => breakdown,
            Err(e) => {
                warn!(
                    model,
                    input_tokens = input,
                    output_tokens = output,
                    error = %e,
                    "Cost computation failed, reporting zero cost"
                );
                CostBreakdown::zero(input, output, e.to_string())
            }
        }
    }

    pub fn try_compute(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<CostBreakdown> {
        let rates = self.pricing.rate_for(model);
        let overflow = || UsageError::Overflow {
            model: model.to_string(),
        };

        let input_cost = token_cost(input_tokens, rates.input_per_1k).ok_or_else(overflow)?;
        let output_cost = token_cost(output_tokens, rates.output_per_1k).ok_or_else(overflow)?;
        let cost = input_cost.checked_add(output_cost).ok_or_else(overflow)?;
        let total_tokens = input_tokens.checked_add(output_tokens).ok_or_else(overflow)?;

        Ok(CostBreakdown {
            input_tokens,
            output_tokens,
            total_tokens,
            input_cost,
            output_cost,
            cost: cost.normalize(),
            error: None,
        })
    }
}

fn token_cost(tokens: u64, rate_per_1k: Decimal) -> Option<Decimal> {
    Decimal::from(tokens)
        .checked_mul(rate_per_1k)?
        .checked_div(TOKENS_PER_RATE_UNIT)
        .map(|cost| cost.normalize())
}
