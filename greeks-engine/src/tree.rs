// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Drift-adjusted forward binomial tree. American-capable; the risk-neutral
//! probability can leave (0, 1) for extreme vol/rate inputs, in which case
//! the caller falls back to the closed form.

use core_types::symbol::{OptionRight, OptionStyle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("non-positive spot/strike/vol/tau")]
    DegenerateInput,
    #[error("risk-neutral probability {0} outside (0, 1)")]
    ProbabilityOutOfRange(f64),
    #[error("tree produced a non-finite value")]
    NonFinite,
}

#[allow(clippy::too_many_arguments)]
pub fn forward_tree_price(
    right: OptionRight,
    style: OptionStyle,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    tau: f64,
    steps: usize,
) -> Result<f64, TreeError> {
    if !(spot > 0.0 && strike > 0.0 && vol > 0.0 && tau > 0.0) || steps == 0 {
        return Err(TreeError::DegenerateInput);
    }
    let dt = tau / steps as f64;
    let drift = (rate - dividend_yield - 0.5 * vol * vol) * dt;
    let diffusion = vol * dt.sqrt();
    let up = (drift + diffusion).exp();
    let down = (drift - diffusion).exp();
    let growth = ((rate - dividend_yield) * dt).exp();
    let p = (growth - down) / (up - down);
    if !p.is_finite() || p <= 0.0 || p >= 1.0 {
        return Err(TreeError::ProbabilityOutOfRange(p));
    }
    let disc = (-rate * dt).exp();

    let payoff = |s: f64| match right {
        OptionRight::Call => (s - strike).max(0.0),
        OptionRight::Put => (strike - s).max(0.0),
    };

    let mut values: Vec<f64> = (0..=steps)
        .map(|j| payoff(spot * up.powi(j as i32) * down.powi((steps - j) as i32)))
        .collect();

    for i in (0..steps).rev() {
        for j in 0..=i {
            let continuation = disc * (p * values[j + 1] + (1.0 - p) * values[j]);
            values[j] = match style {
                OptionStyle::European => continuation,
                OptionStyle::American => {
                    let s = spot * up.powi(j as i32) * down.powi((i - j) as i32);
                    continuation.max(payoff(s))
                }
            };
        }
    }

    if values[0].is_finite() {
        Ok(values[0])
    } else {
        Err(TreeError::NonFinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::black::black_price;
    use approx::assert_relative_eq;

    #[test]
    fn european_tree_converges_to_black() {
        let tree = forward_tree_price(
            OptionRight::Call,
            OptionStyle::European,
            100.0,
            100.0,
            0.05,
            0.0,
            0.2,
            1.0,
            500,
        )
        .unwrap();
        let closed = black_price(OptionRight::Call, 100.0, 100.0, 0.05, 0.0, 0.2, 1.0).unwrap();
        assert_relative_eq!(tree, closed, epsilon = 2e-2);
    }

    #[test]
    fn american_put_carries_early_exercise_premium() {
        let american = forward_tree_price(
            OptionRight::Put,
            OptionStyle::American,
            90.0,
            100.0,
            0.08,
            0.0,
            0.2,
            1.0,
            200,
        )
        .unwrap();
        let european = forward_tree_price(
            OptionRight::Put,
            OptionStyle::European,
            90.0,
            100.0,
            0.08,
            0.0,
            0.2,
            1.0,
            200,
        )
        .unwrap();
        assert!(american > european);
        assert!(american >= 10.0); // at least intrinsic
    }

    #[test]
    fn pathological_inputs_error_instead_of_panicking() {
        assert!(matches!(
            forward_tree_price(
                OptionRight::Call,
                OptionStyle::American,
                -1.0,
                100.0,
                0.05,
                0.0,
                0.2,
                1.0,
                100
            ),
            Err(TreeError::DegenerateInput)
        ));
        // Huge vol over a single coarse step pushes p out of range.
        assert!(forward_tree_price(
            OptionRight::Call,
            OptionStyle::American,
            100.0,
            100.0,
            0.0,
            3.0,
            8.0,
            4.0,
            1
        )
        .is_err());
    }
}
