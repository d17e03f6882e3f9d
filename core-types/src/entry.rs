// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Universe file rows: one entry per symbol per processing date, updated
//! from slices and rendered to a single CSV line.

use crate::data::Slice;
use crate::symbol::Symbol;

pub const BASE_HEADER: &str = "#symbol_id,symbol_value,open,high,low,close,volume";
pub const CONTRACT_HEADER: &str =
    "#symbol_id,symbol_value,open,high,low,close,volume,open_interest";
pub const OPTION_HEADER: &str = "#symbol_id,symbol_value,open,high,low,close,volume,\
open_interest,implied_volatility,delta,gamma,vega,theta,rho";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
}

pub trait UniverseEntry {
    fn symbol(&self) -> &Symbol;
    fn update(&mut self, slice: &Slice);
    fn header(&self) -> &'static str;
    fn to_csv(&self) -> String;
}

fn fmt_num(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt_num).unwrap_or_default()
}

/// Underlying (or any non-contract) row.
#[derive(Debug, Clone)]
pub struct UnderlyingEntry {
    symbol: Symbol,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl UnderlyingEntry {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
        }
    }
}

impl UniverseEntry for UnderlyingEntry {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn update(&mut self, slice: &Slice) {
        if let Some(bar) = slice.bars.get(&self.symbol) {
            self.open = bar.open;
            self.high = bar.high;
            self.low = bar.low;
            self.close = bar.close;
            self.volume = bar.volume;
        } else if let Some(quote) = slice.quotes.get(&self.symbol) {
            self.open = quote.open;
            self.high = quote.high;
            self.low = quote.low;
            self.close = quote.close;
            self.volume = 0.0;
        }
    }

    fn header(&self) -> &'static str {
        BASE_HEADER
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.symbol.id(),
            self.symbol.value(),
            fmt_num(self.open),
            fmt_num(self.high),
            fmt_num(self.low),
            fmt_num(self.close),
            fmt_num(self.volume),
        )
    }
}

/// Non-option contract row (futures): quote OHLC, trade volume, open interest.
#[derive(Debug, Clone)]
pub struct ContractEntry {
    symbol: Symbol,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_interest: f64,
}

impl ContractEntry {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            open_interest: 0.0,
        }
    }

    fn apply(&mut self, slice: &Slice) {
        if let Some(oi) = slice.open_interest.get(&self.symbol) {
            self.open_interest = oi.value;
        }
        if let Some(bar) = slice.bars.get(&self.symbol) {
            self.volume = bar.volume;
        }
        if let Some(quote) = slice.quotes.get(&self.symbol) {
            self.open = quote.open;
            self.high = quote.high;
            self.low = quote.low;
            self.close = quote.close;
        }
    }
}

impl UniverseEntry for ContractEntry {
    fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    fn update(&mut self, slice: &Slice) {
        self.apply(slice);
    }

    fn header(&self) -> &'static str {
        CONTRACT_HEADER
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.symbol.id(),
            self.symbol.value(),
            fmt_num(self.open),
            fmt_num(self.high),
            fmt_num(self.low),
            fmt_num(self.close),
            fmt_num(self.volume),
            fmt_num(self.open_interest),
        )
    }
}

/// Option contract row. IV and greeks are copied in from the greeks engine
/// (or the surface repair pass); both stay empty for classes without greeks.
#[derive(Debug, Clone)]
pub struct OptionEntry {
    contract: ContractEntry,
    pub implied_volatility: Option<f64>,
    pub greeks: Option<Greeks>,
}

impl OptionEntry {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            contract: ContractEntry::new(symbol),
            implied_volatility: None,
            greeks: None,
        }
    }

    pub fn close(&self) -> f64 {
        self.contract.close
    }

    pub fn set_implied_volatility(&mut self, iv: Option<f64>) {
        self.implied_volatility = iv.filter(|v| v.is_finite() && *v > 0.0);
    }

    pub fn set_greeks(&mut self, greeks: Option<Greeks>) {
        self.greeks = greeks;
    }

    /// Missing for repair purposes: absent, zero, or non-finite.
    pub fn iv_is_missing(&self) -> bool {
        !matches!(self.implied_volatility, Some(v) if v.is_finite() && v > 0.0)
    }
}

impl UniverseEntry for OptionEntry {
    fn symbol(&self) -> &Symbol {
        self.contract.symbol()
    }

    fn update(&mut self, slice: &Slice) {
        self.contract.apply(slice);
    }

    fn header(&self) -> &'static str {
        OPTION_HEADER
    }

    fn to_csv(&self) -> String {
        let greeks = self.greeks.as_ref();
        format!(
            "{},{},{},{},{},{},{}",
            self.contract.to_csv(),
            fmt_opt(self.implied_volatility),
            fmt_opt(greeks.map(|g| g.delta)),
            fmt_opt(greeks.map(|g| g.gamma)),
            fmt_opt(greeks.map(|g| g.vega)),
            fmt_opt(greeks.map(|g| g.theta)),
            fmt_opt(greeks.map(|g| g.rho)),
        )
    }
}
