use crate::catalog;
use crate::dispatch::UsageRecord;
use crate::error::CostError;

const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

/// Dollar cost of one extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

/// Prices token usage with the catalog rates of a model.
///
/// [`catalog::MODELS`] is the only price source.
///
/// # Errors
///
/// Returns an error if the model has no catalog pricing.
pub fn estimate_cost(model_id: &str, usage: &UsageRecord) -> Result<CostEstimate, CostError> {
    let pricing = catalog::lookup(model_id)
        .map(|model| model.pricing)
        .ok_or_else(|| CostError::UnknownModel(model_id.to_string()))?;

    let input_cost = usage.input_tokens as f64 * pricing.input_per_million / TOKENS_PER_PRICE_UNIT;
    let output_cost =
        usage.output_tokens as f64 * pricing.output_per_million / TOKENS_PER_PRICE_UNIT;

    Ok(CostEstimate {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    })
}
