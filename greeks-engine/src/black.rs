// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Closed-form Black-Scholes-Merton price and first-order greeks.

use core_types::symbol::OptionRight;
use libm::erf;
use std::f64::consts::SQRT_2;

const INV_SQRT_TWO_PI: f64 = 0.3989422804014327;

pub(crate) fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_TWO_PI * (-0.5 * x * x).exp()
}

pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

#[derive(Debug, Clone, Copy)]
pub struct PriceGreeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
}

/// Theoretical price only. None on degenerate inputs.
pub fn black_price(
    right: OptionRight,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    tau: f64,
) -> Option<f64> {
    black_greeks(right, spot, strike, rate, dividend_yield, vol, tau).map(|g| g.price)
}

/// Price and greeks in one pass. None when the inputs put d1/d2 outside the
/// real line (non-positive spot/strike/vol/tau, overflow).
pub fn black_greeks(
    right: OptionRight,
    spot: f64,
    strike: f64,
    rate: f64,
    dividend_yield: f64,
    vol: f64,
    tau: f64,
) -> Option<PriceGreeks> {
    if !(spot > 0.0 && strike > 0.0 && vol > 0.0 && tau > 0.0) {
        return None;
    }
    let sqrt_tau = tau.sqrt();
    let denom = vol * sqrt_tau;
    if !denom.is_finite() || denom <= 0.0 {
        return None;
    }
    let log_term = (spot / strike).ln();
    if !log_term.is_finite() {
        return None;
    }
    let drift = rate - dividend_yield + 0.5 * vol * vol;
    let d1 = (log_term + drift * tau) / denom;
    let d2 = d1 - denom;
    let disc_r = (-rate * tau).exp();
    let disc_q = (-dividend_yield * tau).exp();
    let pdf_d1 = norm_pdf(d1);
    let nd1 = norm_cdf(d1);
    let nd2 = norm_cdf(d2);
    let nneg_d1 = norm_cdf(-d1);
    let nneg_d2 = norm_cdf(-d2);
    let gamma = disc_q * pdf_d1 / (spot * denom);
    let vega = spot * disc_q * pdf_d1 * sqrt_tau;
    if !gamma.is_finite() || !vega.is_finite() {
        return None;
    }
    let (price, delta, theta, rho) = match right {
        OptionRight::Call => {
            let price = spot * disc_q * nd1 - strike * disc_r * nd2;
            let delta = disc_q * nd1;
            let theta = -spot * disc_q * pdf_d1 * vol / (2.0 * sqrt_tau)
                + dividend_yield * spot * disc_q * nd1
                - rate * strike * disc_r * nd2;
            let rho = strike * tau * disc_r * nd2;
            (price, delta, theta, rho)
        }
        OptionRight::Put => {
            let price = strike * disc_r * nneg_d2 - spot * disc_q * nneg_d1;
            let delta = disc_q * (nd1 - 1.0);
            let theta = -spot * disc_q * pdf_d1 * vol / (2.0 * sqrt_tau)
                - dividend_yield * spot * disc_q * nneg_d1
                + rate * strike * disc_r * nneg_d2;
            let rho = -strike * tau * disc_r * nneg_d2;
            (price, delta, theta, rho)
        }
    };
    Some(PriceGreeks {
        price,
        delta,
        gamma,
        vega,
        theta,
        rho,
    })
}
