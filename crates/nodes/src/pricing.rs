//! Per-model token pricing.

use pipeline::{ModelName, TokenCost, TokenCount};

/// USD price per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    const OPUS: Self = Self::new(15.0, 75.0);
    const SONNET: Self = Self::new(3.0, 15.0);
    const HAIKU_3_5: Self = Self::new(0.8, 4.0);
    const HAIKU_3: Self = Self::new(0.25, 1.25);

    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    /// Pricing for `model`, matched on the family name. Unknown models are
    /// priced as Sonnet.
    pub fn for_model(model: &ModelName) -> Self {
        let name = model.as_str().to_ascii_lowercase();
        if name.contains("opus") {
            Self::OPUS
        } else if name.contains("haiku") {
            if name.contains("3-5") || name.contains("3.5") || name.contains("haiku-4") {
                Self::HAIKU_3_5
            } else {
                Self::HAIKU_3
            }
        } else {
            Self::SONNET
        }
    }

    pub fn cost(&self, input: TokenCount, output: TokenCount) -> TokenCost {
        let usd = (input.as_u64() as f64 * self.input_per_mtok
            + output.as_u64() as f64 * self.output_per_mtok)
            / 1_000_000.0;
        TokenCost::new(usd).unwrap_or_else(TokenCost::zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> ModelName {
        ModelName::new(name).unwrap()
    }

    #[test]
    fn families_are_matched_by_name() {
        assert_eq!(
            ModelPricing::for_model(&model("claude-3-opus-20240229")),
            ModelPricing::OPUS
        );
        assert_eq!(
            ModelPricing::for_model(&model("claude-3-5-haiku-20241022")),
            ModelPricing::HAIKU_3_5
        );
        assert_eq!(
            ModelPricing::for_model(&model("claude-3-haiku-20240307")),
            ModelPricing::HAIKU_3
        );
        assert_eq!(
            ModelPricing::for_model(&model("something-new")),
            ModelPricing::SONNET
        );
    }

    #[test]
    fn cost_is_priced_per_million_tokens() {
        let cost = ModelPricing::for_model(&model("claude-sonnet-4-20250514"))
            .cost(TokenCount::new(1_000_000), TokenCount::new(100_000));
        assert!((cost.as_f64() - 4.5).abs() < 1e-9);
    }
}
