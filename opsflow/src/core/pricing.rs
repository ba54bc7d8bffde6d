//! Deterministic price-floor calculation.
//!
//! Solves for the smallest price `P` such that, after a percentage platform fee,
//! a fixed platform fee, and tax on the sale price, the remaining profit is at
//! least `min_margin * P`:
//!
//! ```text
//! P = (cost + shipping + fee_fixed) / (1 - min_margin - fee_rate - tax_rate)
//! ```
//!
//! `P` is then rounded up to the next 0.50 increment and the realized margin is
//! recomputed from the rounded price. Rounding up can only raise the margin.

use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;
use crate::core::types::PriceResult;

/// Margin checks allow this much floating-point slack.
pub const MARGIN_TOLERANCE: f64 = 1e-6;

/// Fee, tax and margin parameters for [`compute_minimum_price`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingParams {
    pub platform_fee_rate: f64,
    pub platform_fee_fixed: f64,
    pub tax_rate: f64,
    pub min_margin: f64,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self {
            platform_fee_rate: 0.029,
            platform_fee_fixed: 0.30,
            tax_rate: 0.10,
            min_margin: 0.25,
        }
    }
}

impl PricingParams {
    /// Reject parameter sets for which no finite price satisfies the margin.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, rate) in [
            ("platform_fee_rate", self.platform_fee_rate),
            ("tax_rate", self.tax_rate),
            ("min_margin", self.min_margin),
        ] {
            if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
                return Err(invalid(format!("{name} must be in [0, 1), got {rate}")));
            }
        }
        if !self.platform_fee_fixed.is_finite() || self.platform_fee_fixed < 0.0 {
            return Err(invalid(format!(
                "platform_fee_fixed must be >= 0, got {}",
                self.platform_fee_fixed
            )));
        }
        if self.denominator() <= 0.0 {
            return Err(invalid(format!(
                "min_margin + platform_fee_rate + tax_rate = {} leaves no room for cost",
                self.min_margin + self.variable_rate()
            )));
        }
        Ok(())
    }

    fn variable_rate(&self) -> f64 {
        self.platform_fee_rate + self.tax_rate
    }

    fn denominator(&self) -> f64 {
        1.0 - self.min_margin - self.variable_rate()
    }
}

/// Compute the minimum viable sale price for one item.
pub fn compute_minimum_price(
    cost_price: f64,
    shipping_cost: f64,
    params: &PricingParams,
) -> Result<PriceResult, PipelineError> {
    params.validate()?;
    check_amount("cost_price", cost_price)?;
    check_amount("shipping_cost", shipping_cost)?;

    let fixed_costs = cost_price + shipping_cost + params.platform_fee_fixed;
    let variable_rate = params.variable_rate();
    let unrounded = fixed_costs / params.denominator();
    let recommended_price = round_up_to_half(unrounded);
    // Finite inputs can still overflow once summed or scaled.
    if !recommended_price.is_finite() {
        return Err(PipelineError::InvalidPriceInput {
            field: "cost_price + shipping_cost",
            value: fixed_costs,
        });
    }

    let total_cost = fixed_costs + recommended_price * variable_rate;
    let margin = if recommended_price > 0.0 {
        (recommended_price - total_cost) / recommended_price
    } else {
        0.0
    };

    if !margin.is_finite() {
        return Err(PipelineError::InvalidPriceInput {
            field: "recommended_price",
            value: recommended_price,
        });
    }

    Ok(PriceResult {
        recommended_price,
        margin,
        margin_percentage: round_cents(margin * 100.0),
    })
}

/// True if `price` is an exact multiple of 0.50.
pub fn is_half_increment(price: f64) -> bool {
    let doubled = price * 2.0;
    doubled.is_finite() && doubled.fract() == 0.0
}

fn round_up_to_half(value: f64) -> f64 {
    (value * 2.0).ceil() / 2.0
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_amount(field: &'static str, value: f64) -> Result<(), PipelineError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PipelineError::InvalidPriceInput { field, value });
    }
    Ok(())
}

fn invalid(reason: String) -> PipelineError {
    PipelineError::InvalidConfiguration { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reference_item_prices_at_twenty_five() {
        let result = compute_minimum_price(10.0, 5.0, &PricingParams::default()).expect("price");
        assert_eq!(result.recommended_price, 25.0);
        assert!(result.margin >= 0.25);
        assert!(result.margin_percentage >= 25.0);
        assert_eq!(result.margin_percentage, 25.9);
    }

    #[test]
    fn unsolvable_configuration_is_rejected() {
        let params = PricingParams {
            min_margin: 0.5,
            platform_fee_rate: 0.3,
            tax_rate: 0.2,
            ..PricingParams::default()
        };
        let err = compute_minimum_price(10.0, 5.0, &params).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn rate_outside_unit_interval_is_rejected() {
        let params = PricingParams {
            tax_rate: 1.0,
            ..PricingParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn negative_cost_is_rejected() {
        let err = compute_minimum_price(-1.0, 5.0, &PricingParams::default()).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidPriceInput {
                field: "cost_price",
                value: -1.0
            }
        );
    }

    #[test]
    fn overflowing_costs_are_rejected() {
        let err = compute_minimum_price(f64::MAX, f64::MAX, &PricingParams::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidPriceInput {
                field: "cost_price + shipping_cost",
                ..
            }
        ));

        // The sum fits but the price overflows after dividing by the margin room.
        let err = compute_minimum_price(f64::MAX, 0.0, &PricingParams::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPriceInput { .. }));
    }

    #[test]
    fn zero_costs_without_fixed_fee_yield_zero_price() {
        let params = PricingParams {
            platform_fee_fixed: 0.0,
            ..PricingParams::default()
        };
        let result = compute_minimum_price(0.0, 0.0, &params).expect("price");
        assert_eq!(result.recommended_price, 0.0);
        assert_eq!(result.margin, 0.0);
    }

    #[test]
    fn half_increment_detection() {
        assert!(is_half_increment(25.0));
        assert!(is_half_increment(12.5));
        assert!(!is_half_increment(12.25));
    }

    proptest! {
        #[test]
        fn margin_floor_holds(cost in 0.0f64..10_000.0, shipping in 0.0f64..500.0) {
            let params = PricingParams::default();
            let result = compute_minimum_price(cost, shipping, &params).expect("price");
            prop_assert!(result.margin >= params.min_margin - MARGIN_TOLERANCE);
            prop_assert!(is_half_increment(result.recommended_price));
        }

        #[test]
        fn price_is_monotonic_in_cost(
            cost in 0.0f64..10_000.0,
            delta in 0.0f64..1_000.0,
            shipping in 0.0f64..500.0,
        ) {
            let params = PricingParams::default();
            let low = compute_minimum_price(cost, shipping, &params).expect("low");
            let high = compute_minimum_price(cost + delta, shipping, &params).expect("high");
            prop_assert!(high.recommended_price >= low.recommended_price);
        }

        #[test]
        fn identical_inputs_are_bit_identical(cost in 0.0f64..10_000.0, shipping in 0.0f64..500.0) {
            let params = PricingParams::default();
            let a = compute_minimum_price(cost, shipping, &params).expect("a");
            let b = compute_minimum_price(cost, shipping, &params).expect("b");
            prop_assert_eq!(a.recommended_price.to_bits(), b.recommended_price.to_bits());
            prop_assert_eq!(a.margin.to_bits(), b.margin.to_bits());
        }
    }
}
