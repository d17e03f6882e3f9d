// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Symbol model for underlyings, chain roots, and derivative contracts.
//!
//! Contract identifiers follow the OPRA-style layout
//! `<TICKER><YYMMDD><C|P><strike x1000, 8 digits>` (e.g.
//! `SPY241220P00720000`); futures use `<ROOT><YYYYMMDD>`. The parser is the
//! exact inverse of the writer, so archive entry names round-trip.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    Equity,
    Index,
    Future,
    EquityOption,
    IndexOption,
    FutureOption,
}

impl SecurityType {
    pub fn is_option(self) -> bool {
        matches!(
            self,
            SecurityType::EquityOption | SecurityType::IndexOption | SecurityType::FutureOption
        )
    }

    /// Whether universe rows of this class carry IV and greeks columns with
    /// computed values. Future options keep the columns but leave them blank.
    pub fn has_greeks(self) -> bool {
        self.is_option() && self != SecurityType::FutureOption
    }

    pub fn underlying_type(self) -> Option<SecurityType> {
        match self {
            SecurityType::EquityOption => Some(SecurityType::Equity),
            SecurityType::IndexOption => Some(SecurityType::Index),
            SecurityType::FutureOption => Some(SecurityType::Future),
            _ => None,
        }
    }

    /// Directory name used by the archive and output layouts.
    pub fn dir_name(self) -> &'static str {
        match self {
            SecurityType::Equity => "equity",
            SecurityType::Index => "index",
            SecurityType::Future => "future",
            SecurityType::EquityOption => "option",
            SecurityType::IndexOption => "indexoption",
            SecurityType::FutureOption => "futureoption",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown security type '{0}'")]
pub struct ParseSecurityTypeError(String);

impl FromStr for SecurityType {
    type Err = ParseSecurityTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "equity" => Ok(SecurityType::Equity),
            "index" => Ok(SecurityType::Index),
            "future" => Ok(SecurityType::Future),
            "option" | "equityoption" => Ok(SecurityType::EquityOption),
            "indexoption" => Ok(SecurityType::IndexOption),
            "futureoption" => Ok(SecurityType::FutureOption),
            other => Err(ParseSecurityTypeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    pub fn opposite(self) -> OptionRight {
        match self {
            OptionRight::Call => OptionRight::Put,
            OptionRight::Put => OptionRight::Call,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            OptionRight::Call => 'C',
            OptionRight::Put => 'P',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionStyle {
    American,
    European,
}

impl OptionStyle {
    pub fn file_tag(self) -> &'static str {
        match self {
            OptionStyle::American => "american",
            OptionStyle::European => "european",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    Daily,
    Hour,
    Minute,
}

impl Resolution {
    pub fn dir_name(self) -> &'static str {
        match self {
            Resolution::Daily => "daily",
            Resolution::Hour => "hour",
            Resolution::Minute => "minute",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown resolution '{0}'")]
pub struct ParseResolutionError(String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "daily" => Ok(Resolution::Daily),
            "hour" => Ok(Resolution::Hour),
            "minute" => Ok(Resolution::Minute),
            other => Err(ParseResolutionError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickType {
    Trade,
    Quote,
    OpenInterest,
}

impl TickType {
    pub fn file_tag(self) -> &'static str {
        match self {
            TickType::Trade => "trade",
            TickType::Quote => "quote",
            TickType::OpenInterest => "openinterest",
        }
    }
}

/// Option contract fields. Strikes are held in thousandths so symbols stay
/// value-equal and hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionSpec {
    pub style: OptionStyle,
    pub right: OptionRight,
    pub strike_millis: u64,
    pub expiry: NaiveDate,
    /// Expiry of the underlying future contract, for future options only.
    pub underlying_expiry: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Equity or index underlying.
    Spot,
    /// Chain root; not tradable. Future-option roots reference a concrete
    /// underlying future contract.
    Canonical { underlying_expiry: Option<NaiveDate> },
    Future { expiry: NaiveDate },
    Option(OptionSpec),
}

/// Value-equal identifier for anything the generator touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    security_type: SecurityType,
    market: String,
    ticker: String,
    kind: SymbolKind,
}

impl Symbol {
    pub fn equity(ticker: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            security_type: SecurityType::Equity,
            market: market.into(),
            ticker: ticker.into().to_ascii_uppercase(),
            kind: SymbolKind::Spot,
        }
    }

    pub fn index(ticker: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            security_type: SecurityType::Index,
            market: market.into(),
            ticker: ticker.into().to_ascii_uppercase(),
            kind: SymbolKind::Spot,
        }
    }

    pub fn future(root: impl Into<String>, market: impl Into<String>, expiry: NaiveDate) -> Self {
        Self {
            security_type: SecurityType::Future,
            market: market.into(),
            ticker: root.into().to_ascii_uppercase(),
            kind: SymbolKind::Future { expiry },
        }
    }

    pub fn canonical(
        security_type: SecurityType,
        ticker: impl Into<String>,
        market: impl Into<String>,
    ) -> Self {
        Self {
            security_type,
            market: market.into(),
            ticker: ticker.into().to_ascii_uppercase(),
            kind: SymbolKind::Canonical {
                underlying_expiry: None,
            },
        }
    }

    pub fn canonical_future_option(
        root: impl Into<String>,
        market: impl Into<String>,
        underlying_expiry: NaiveDate,
    ) -> Self {
        Self {
            security_type: SecurityType::FutureOption,
            market: market.into(),
            ticker: root.into().to_ascii_uppercase(),
            kind: SymbolKind::Canonical {
                underlying_expiry: Some(underlying_expiry),
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn option_contract(
        security_type: SecurityType,
        ticker: impl Into<String>,
        market: impl Into<String>,
        style: OptionStyle,
        right: OptionRight,
        strike: f64,
        expiry: NaiveDate,
        underlying_expiry: Option<NaiveDate>,
    ) -> Self {
        Self {
            security_type,
            market: market.into(),
            ticker: ticker.into().to_ascii_uppercase(),
            kind: SymbolKind::Option(OptionSpec {
                style,
                right,
                strike_millis: (strike * 1000.0).round().max(0.0) as u64,
                expiry,
                underlying_expiry,
            }),
        }
    }

    pub fn security_type(&self) -> SecurityType {
        self.security_type
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn kind(&self) -> &SymbolKind {
        &self.kind
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self.kind, SymbolKind::Canonical { .. })
    }

    pub fn option_spec(&self) -> Option<&OptionSpec> {
        match &self.kind {
            SymbolKind::Option(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn strike(&self) -> Option<f64> {
        self.option_spec().map(|s| s.strike_millis as f64 / 1000.0)
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        match &self.kind {
            SymbolKind::Option(spec) => Some(spec.expiry),
            SymbolKind::Future { expiry } => Some(*expiry),
            _ => None,
        }
    }

    pub fn right(&self) -> Option<OptionRight> {
        self.option_spec().map(|s| s.right)
    }

    pub fn style(&self) -> Option<OptionStyle> {
        self.option_spec().map(|s| s.style)
    }

    /// The same-strike same-expiry contract with the opposite right.
    pub fn mirror(&self) -> Option<Symbol> {
        let spec = self.option_spec()?;
        let mut flipped = spec.clone();
        flipped.right = spec.right.opposite();
        Some(Symbol {
            security_type: self.security_type,
            market: self.market.clone(),
            ticker: self.ticker.clone(),
            kind: SymbolKind::Option(flipped),
        })
    }

    /// Underlying traded symbol: spot for equity/index options, the concrete
    /// future contract for future options. None for anything without one.
    pub fn underlying(&self) -> Option<Symbol> {
        let underlying_expiry = match &self.kind {
            SymbolKind::Option(spec) => spec.underlying_expiry,
            SymbolKind::Canonical { underlying_expiry } => *underlying_expiry,
            _ => return None,
        };
        let ticker = underlying_ticker(&self.ticker);
        match self.security_type {
            SecurityType::EquityOption => Some(Symbol::equity(ticker, self.market.clone())),
            SecurityType::IndexOption => Some(Symbol::index(ticker, self.market.clone())),
            SecurityType::FutureOption => {
                underlying_expiry.map(|exp| Symbol::future(ticker, self.market.clone(), exp))
            }
            _ => None,
        }
    }

    /// Compact identifier; doubles as the archive entry-name stem.
    pub fn id(&self) -> String {
        match &self.kind {
            SymbolKind::Spot => self.ticker.clone(),
            SymbolKind::Canonical { .. } => format!("?{}", self.ticker),
            SymbolKind::Future { expiry } => {
                format!("{}{}", self.ticker, expiry.format("%Y%m%d"))
            }
            SymbolKind::Option(spec) => format!(
                "{}{}{}{:08}",
                self.ticker,
                spec.expiry.format("%y%m%d"),
                spec.right.as_char(),
                spec.strike_millis
            ),
        }
    }

    /// Human-readable form used in the `symbol_value` CSV column.
    pub fn value(&self) -> String {
        match &self.kind {
            SymbolKind::Spot => self.ticker.clone(),
            SymbolKind::Canonical { .. } => match self.security_type {
                SecurityType::Future | SecurityType::FutureOption => format!("/{}", self.ticker),
                _ => format!("?{}", self.ticker),
            },
            SymbolKind::Future { expiry } => {
                format!("/{} {}", self.ticker, expiry.format("%Y%m%d"))
            }
            SymbolKind::Option(spec) => format!(
                "{} {}{}{:08}",
                self.ticker,
                spec.expiry.format("%y%m%d"),
                spec.right.as_char(),
                spec.strike_millis
            ),
        }
    }

    /// Parse an option contract id (e.g. `SPY241220P00720000`) back into a
    /// symbol. Returns None when the tail does not decode.
    pub fn parse_option_id(
        id: &str,
        security_type: SecurityType,
        market: &str,
        style: OptionStyle,
        underlying_expiry: Option<NaiveDate>,
    ) -> Option<Symbol> {
        // Tail layout: 6 date + 1 right + 8 strike.
        if id.len() < 16 {
            return None;
        }
        let len = id.len();
        let date_start = len - 15;
        let ticker = &id[..date_start];
        if ticker.is_empty() {
            return None;
        }
        let yy: u32 = id[date_start..date_start + 2].parse().ok()?;
        let mm: u32 = id[date_start + 2..date_start + 4].parse().ok()?;
        let dd: u32 = id[date_start + 4..date_start + 6].parse().ok()?;
        let expiry = NaiveDate::from_ymd_opt(2000 + yy as i32, mm, dd)?;
        let right = match id.as_bytes()[len - 9] {
            b'C' => OptionRight::Call,
            b'P' => OptionRight::Put,
            _ => return None,
        };
        let strike_millis: u64 = id[len - 8..].parse().ok()?;
        Some(Symbol {
            security_type,
            market: market.to_string(),
            ticker: ticker.to_string(),
            kind: SymbolKind::Option(OptionSpec {
                style,
                right,
                strike_millis,
                expiry,
                underlying_expiry,
            }),
        })
    }

    /// Ordering key used for chain emission: (right, strike, expiry, id),
    /// with the remaining identifier fields as tie-breakers so the order is
    /// total and consistent with equality.
    fn order_key(&self) -> (u8, u64, NaiveDate, String, String, u8, u8, NaiveDate) {
        let (right, strike, expiry, style, underlying_expiry) = match &self.kind {
            SymbolKind::Option(spec) => (
                match spec.right {
                    OptionRight::Call => 1,
                    OptionRight::Put => 2,
                },
                spec.strike_millis,
                spec.expiry,
                match spec.style {
                    OptionStyle::American => 0,
                    OptionStyle::European => 1,
                },
                spec.underlying_expiry.unwrap_or(NaiveDate::MIN),
            ),
            SymbolKind::Future { expiry } => (0, 0, *expiry, 0, NaiveDate::MIN),
            SymbolKind::Canonical { underlying_expiry } => (
                0,
                0,
                NaiveDate::MIN,
                0,
                underlying_expiry.unwrap_or(NaiveDate::MIN),
            ),
            SymbolKind::Spot => (0, 0, NaiveDate::MIN, 0, NaiveDate::MIN),
        };
        (
            right,
            strike,
            expiry,
            self.id(),
            self.market.clone(),
            style,
            self.security_type as u8,
            underlying_expiry,
        )
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value())
    }
}

/// Weekly/companion index roots quote against a different spot ticker.
fn underlying_ticker(ticker: &str) -> &str {
    match ticker {
        "SPXW" => "SPX",
        "NDXP" => "NDX",
        "VIXW" => "VIX",
        "RUTW" => "RUT",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn option_id_round_trips() {
        let sym = Symbol::option_contract(
            SecurityType::EquityOption,
            "SPY",
            "usa",
            OptionStyle::American,
            OptionRight::Put,
            720.0,
            d(2024, 12, 20),
            None,
        );
        assert_eq!(sym.id(), "SPY241220P00720000");
        let parsed = Symbol::parse_option_id(
            &sym.id(),
            SecurityType::EquityOption,
            "usa",
            OptionStyle::American,
            None,
        )
        .unwrap();
        assert_eq!(parsed, sym);
        assert_eq!(parsed.strike(), Some(720.0));
    }

    #[test]
    fn mirror_flips_right_and_is_involutive() {
        let call = Symbol::option_contract(
            SecurityType::EquityOption,
            "SPY",
            "usa",
            OptionStyle::American,
            OptionRight::Call,
            100.0,
            d(2021, 1, 1),
            None,
        );
        let put = call.mirror().unwrap();
        assert_eq!(put.right(), Some(OptionRight::Put));
        assert_eq!(put.strike(), call.strike());
        assert_eq!(put.expiry(), call.expiry());
        assert_eq!(put.mirror().unwrap(), call);

        for (ticker, style) in [("SPX", OptionStyle::European), ("SPXW", OptionStyle::European)] {
            let c = Symbol::option_contract(
                SecurityType::IndexOption,
                ticker,
                "usa",
                style,
                OptionRight::Call,
                4500.0,
                d(2021, 1, 1),
                None,
            );
            assert_eq!(c.mirror().unwrap().mirror().unwrap(), c);
            assert_eq!(c.mirror().unwrap().style(), Some(style));
        }
    }

    #[test]
    fn future_option_mirror_keeps_underlying_expiry() {
        let fop = Symbol::option_contract(
            SecurityType::FutureOption,
            "ES",
            "cme",
            OptionStyle::American,
            OptionRight::Call,
            4500.0,
            d(2024, 6, 21),
            Some(d(2024, 6, 21)),
        );
        let mirror = fop.mirror().unwrap();
        assert_eq!(
            mirror.underlying().unwrap(),
            Symbol::future("ES", "cme", d(2024, 6, 21))
        );
    }

    #[test]
    fn weekly_index_option_maps_to_base_spot() {
        let spxw = Symbol::option_contract(
            SecurityType::IndexOption,
            "SPXW",
            "usa",
            OptionStyle::European,
            OptionRight::Put,
            5000.0,
            d(2024, 3, 15),
            None,
        );
        assert_eq!(spxw.underlying().unwrap(), Symbol::index("SPX", "usa"));
    }

    #[test]
    fn chain_order_is_right_strike_expiry() {
        let mk = |right, strike, exp| {
            Symbol::option_contract(
                SecurityType::EquityOption,
                "SPY",
                "usa",
                OptionStyle::American,
                right,
                strike,
                exp,
                None,
            )
        };
        let mut chain = vec![
            mk(OptionRight::Put, 100.0, d(2024, 6, 21)),
            mk(OptionRight::Call, 110.0, d(2024, 6, 21)),
            mk(OptionRight::Call, 100.0, d(2024, 7, 19)),
            mk(OptionRight::Call, 100.0, d(2024, 6, 21)),
        ];
        chain.sort();
        assert_eq!(chain[0], mk(OptionRight::Call, 100.0, d(2024, 6, 21)));
        assert_eq!(chain[1], mk(OptionRight::Call, 100.0, d(2024, 7, 19)));
        assert_eq!(chain[2], mk(OptionRight::Call, 110.0, d(2024, 6, 21)));
        assert_eq!(chain[3], mk(OptionRight::Put, 100.0, d(2024, 6, 21)));
    }

    #[test]
    fn security_type_greeks_gate() {
        assert!(SecurityType::EquityOption.has_greeks());
        assert!(SecurityType::IndexOption.has_greeks());
        assert!(!SecurityType::FutureOption.has_greeks());
        assert!(!SecurityType::Future.has_greeks());
    }
}
