// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Per-contract implied-volatility and greeks engine. One [`GreeksBundle`]
//! is created per option contract and fed the merged slice stream; it keeps
//! the latest spot and pair mids and re-solves IV on every update, fanning
//! the result out to the five greeks in a single pass.

pub mod black;
pub mod iv;
pub mod tree;

pub use black::{black_greeks, black_price, PriceGreeks};
pub use iv::{parity_spot, solve_iv, MAX_VOL, MIN_VOL};
pub use tree::{forward_tree_price, TreeError};

use chrono::NaiveDate;
use core_types::data::Slice;
use core_types::entry::Greeks;
use core_types::symbol::{OptionRight, OptionStyle, Symbol};
use thiserror::Error;

/// Calendar-day year fraction used across the pipeline.
pub fn time_till_expiry(expiry: NaiveDate, reference: NaiveDate) -> f64 {
    (expiry - reference).num_days() as f64 / 365.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingModel {
    BlackScholes,
    ForwardTree,
}

#[derive(Debug, Clone)]
pub struct GreeksConfig {
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    pub pricing_model: PricingModel,
    pub tree_steps: usize,
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0433,
            dividend_yield: 0.0,
            pricing_model: PricingModel::ForwardTree,
            tree_steps: 200,
        }
    }
}

/// Model price at a known volatility. The tree silently degrades to the
/// closed form when it errors on the inputs.
#[allow(clippy::too_many_arguments)]
pub fn theoretical_price(
    cfg: &GreeksConfig,
    right: OptionRight,
    style: OptionStyle,
    spot: f64,
    strike: f64,
    tau: f64,
    vol: f64,
) -> Option<f64> {
    match cfg.pricing_model {
        PricingModel::ForwardTree => forward_tree_price(
            right,
            style,
            spot,
            strike,
            cfg.risk_free_rate,
            cfg.dividend_yield,
            vol,
            tau,
            cfg.tree_steps,
        )
        .ok()
        .or_else(|| {
            black_price(
                right,
                spot,
                strike,
                cfg.risk_free_rate,
                cfg.dividend_yield,
                vol,
                tau,
            )
        }),
        PricingModel::BlackScholes => black_price(
            right,
            spot,
            strike,
            cfg.risk_free_rate,
            cfg.dividend_yield,
            vol,
            tau,
        ),
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("symbol {0} is not an option contract")]
    NotAnOption(String),
    #[error("option {0} has no underlying symbol")]
    NoUnderlying(String),
}

/// Streaming IV + greeks state for one option contract.
pub struct GreeksBundle {
    symbol: Symbol,
    mirror: Symbol,
    underlying: Symbol,
    right: OptionRight,
    strike: f64,
    expiry: NaiveDate,
    reference: NaiveDate,
    cfg: GreeksConfig,
    spot: Option<f64>,
    option_mid: Option<f64>,
    mirror_mid: Option<f64>,
    iv: Option<f64>,
    greeks: Option<Greeks>,
}

impl GreeksBundle {
    pub fn new(symbol: Symbol, reference: NaiveDate, cfg: GreeksConfig) -> Result<Self, EngineError> {
        let spec = symbol
            .option_spec()
            .ok_or_else(|| EngineError::NotAnOption(symbol.id()))?
            .clone();
        let mirror = symbol
            .mirror()
            .ok_or_else(|| EngineError::NotAnOption(symbol.id()))?;
        let underlying = symbol
            .underlying()
            .ok_or_else(|| EngineError::NoUnderlying(symbol.id()))?;
        Ok(Self {
            right: spec.right,
            strike: symbol.strike().unwrap_or(0.0),
            expiry: spec.expiry,
            symbol,
            mirror,
            underlying,
            reference,
            cfg,
            spot: None,
            option_mid: None,
            mirror_mid: None,
            iv: None,
            greeks: None,
        })
    }

    /// Integrate one slice: underlying trade bars set the spot, quote bars
    /// for the contract and its mirror set the pair mids. Quotes for other
    /// symbols are ignored. A failed solve leaves the previous state alone.
    pub fn update(&mut self, slice: &Slice) {
        if let Some(bar) = slice.bars.get(&self.underlying) {
            self.spot = Some(bar.close);
        }
        if let Some(quote) = slice.quotes.get(&self.symbol) {
            self.option_mid = Some(quote.close);
        }
        if let Some(quote) = slice.quotes.get(&self.mirror) {
            self.mirror_mid = Some(quote.close);
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        let (Some(spot), Some(mid)) = (self.spot, self.option_mid) else {
            return;
        };
        let tau = time_till_expiry(self.expiry, self.reference);
        if tau <= 0.0 || spot <= 0.0 || mid <= 0.0 {
            return;
        }
        // With both sides of the pair quoted, the parity-implied spot
        // replaces a possibly stale underlying close.
        let effective_spot = match self.mirror_mid {
            Some(mirror_mid) if mirror_mid > 0.0 => {
                let (call_mid, put_mid) = match self.right {
                    OptionRight::Call => (mid, mirror_mid),
                    OptionRight::Put => (mirror_mid, mid),
                };
                let implied = parity_spot(
                    call_mid,
                    put_mid,
                    self.strike,
                    self.cfg.risk_free_rate,
                    self.cfg.dividend_yield,
                    tau,
                );
                if implied > 0.0 && implied.is_finite() {
                    implied
                } else {
                    spot
                }
            }
            _ => spot,
        };
        let Some(vol) = solve_iv(
            mid,
            self.right,
            effective_spot,
            self.strike,
            self.cfg.risk_free_rate,
            self.cfg.dividend_yield,
            tau,
        ) else {
            return;
        };
        let Some(g) = black_greeks(
            self.right,
            effective_spot,
            self.strike,
            self.cfg.risk_free_rate,
            self.cfg.dividend_yield,
            vol,
            tau,
        ) else {
            return;
        };
        self.iv = Some(vol);
        self.greeks = Some(Greeks {
            delta: g.delta,
            gamma: g.gamma,
            vega: g.vega,
            theta: g.theta,
            rho: g.rho,
        });
    }

    pub fn implied_volatility(&self) -> Option<f64> {
        self.iv
    }

    pub fn greeks(&self) -> Option<Greeks> {
        self.greeks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDateTime;
    use core_types::data::{QuoteBar, TradeBar};
    use core_types::symbol::SecurityType;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ts(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(16, 0, 0).unwrap()
    }

    fn call_symbol() -> Symbol {
        Symbol::option_contract(
            SecurityType::EquityOption,
            "SPY",
            "usa",
            OptionStyle::American,
            OptionRight::Call,
            495.0,
            d(2024, 5, 17),
            None,
        )
    }

    fn quote(sym: &Symbol, time: NaiveDateTime, mid: f64) -> QuoteBar {
        QuoteBar {
            symbol: sym.clone(),
            time,
            open: mid,
            high: mid,
            low: mid,
            close: mid,
        }
    }

    #[test]
    fn streamed_pair_recovers_planted_volatility() {
        let reference = d(2024, 2, 7);
        let symbol = call_symbol();
        let mirror = symbol.mirror().unwrap();
        let underlying = symbol.underlying().unwrap();
        let cfg = GreeksConfig {
            risk_free_rate: 0.04,
            dividend_yield: 0.0,
            ..Default::default()
        };
        let tau = time_till_expiry(d(2024, 5, 17), reference);
        let planted = 0.24;
        let spot = 493.98;
        let call_mid =
            black_price(OptionRight::Call, spot, 495.0, 0.04, 0.0, planted, tau).unwrap();
        let put_mid = black_price(OptionRight::Put, spot, 495.0, 0.04, 0.0, planted, tau).unwrap();

        let mut bundle = GreeksBundle::new(symbol.clone(), reference, cfg).unwrap();
        let time = ts(reference);
        let mut slice = Slice::new(time);
        slice.bars.insert(
            underlying.clone(),
            TradeBar {
                symbol: underlying.clone(),
                time,
                open: spot,
                high: spot,
                low: spot,
                close: spot,
                volume: 1000.0,
            },
        );
        slice.quotes.insert(symbol.clone(), quote(&symbol, time, call_mid));
        slice.quotes.insert(mirror.clone(), quote(&mirror, time, put_mid));
        bundle.update(&slice);

        let iv = bundle.implied_volatility().unwrap();
        assert_relative_eq!(iv, planted, epsilon = 1e-2);
        let g = bundle.greeks().unwrap();
        assert!(g.delta > 0.0 && g.delta < 1.0);
        assert!(g.vega > 0.0);
        assert!(g.theta < 0.0);
        assert!(g.rho != 0.0);
    }

    #[test]
    fn failed_solve_keeps_previous_state() {
        let reference = d(2024, 2, 7);
        let symbol = call_symbol();
        let underlying = symbol.underlying().unwrap();
        let mut bundle =
            GreeksBundle::new(symbol.clone(), reference, GreeksConfig::default()).unwrap();

        let time = ts(reference);
        let tau = time_till_expiry(d(2024, 5, 17), reference);
        let spot = 493.98;
        let mid = black_price(OptionRight::Call, spot, 495.0, 0.0433, 0.0, 0.3, tau).unwrap();
        let mut good = Slice::new(time);
        good.bars.insert(
            underlying.clone(),
            TradeBar {
                symbol: underlying.clone(),
                time,
                open: spot,
                high: spot,
                low: spot,
                close: spot,
                volume: 0.0,
            },
        );
        good.quotes.insert(symbol.clone(), quote(&symbol, time, mid));
        bundle.update(&good);
        let before = bundle.implied_volatility().unwrap();

        // Sub-intrinsic quote: the solve diverges and is swallowed.
        let mut bad = Slice::new(time);
        bad.quotes.insert(symbol.clone(), quote(&symbol, time, 1e-9));
        bundle.update(&bad);
        assert_eq!(bundle.implied_volatility(), Some(before));
    }

    #[test]
    fn no_quotes_means_no_iv() {
        let bundle =
            GreeksBundle::new(call_symbol(), d(2024, 2, 7), GreeksConfig::default()).unwrap();
        assert!(bundle.implied_volatility().is_none());
        assert!(bundle.greeks().is_none());
    }
}
