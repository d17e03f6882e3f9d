// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Market-data rows and the time-keyed [`Slice`] bundle.

use crate::symbol::Symbol;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct TradeBar {
    pub symbol: Symbol,
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// OHLC of bid/ask midpoints.
#[derive(Debug, Clone)]
pub struct QuoteBar {
    pub symbol: Symbol,
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone)]
pub struct OpenInterest {
    pub symbol: Symbol,
    pub time: NaiveDateTime,
    pub value: f64,
}

/// One timestamped cross-section of market data. Symbols without data at
/// this timestamp are simply absent from the maps.
#[derive(Debug, Clone)]
pub struct Slice {
    pub time: NaiveDateTime,
    pub bars: HashMap<Symbol, TradeBar>,
    pub quotes: HashMap<Symbol, QuoteBar>,
    pub open_interest: HashMap<Symbol, OpenInterest>,
}

impl Slice {
    pub fn new(time: NaiveDateTime) -> Self {
        Self {
            time,
            bars: HashMap::new(),
            quotes: HashMap::new(),
            open_interest: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty() && self.quotes.is_empty() && self.open_interest.is_empty()
    }

    fn absorb(&mut self, other: Slice) {
        self.bars.extend(other.bars);
        self.quotes.extend(other.quotes);
        self.open_interest.extend(other.open_interest);
    }

    /// Merge two time-ordered slice streams. A slice is emitted at every
    /// timestamp present in either stream; the stream with no data at that
    /// timestamp contributes nothing.
    pub fn merge_streams(a: Vec<Slice>, b: Vec<Slice>) -> Vec<Slice> {
        let mut merged: BTreeMap<NaiveDateTime, Slice> = BTreeMap::new();
        for slice in a.into_iter().chain(b) {
            match merged.entry(slice.time) {
                std::collections::btree_map::Entry::Vacant(entry) => {
                    entry.insert(slice);
                }
                std::collections::btree_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().absorb(slice);
                }
            }
        }
        merged.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use chrono::NaiveDate;

    fn t(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn trade(sym: &Symbol, time: NaiveDateTime, close: f64) -> TradeBar {
        TradeBar {
            symbol: sym.clone(),
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn merge_emits_at_every_timestamp_from_either_stream() {
        let spy = Symbol::equity("SPY", "usa");
        let qqq = Symbol::equity("QQQ", "usa");

        let mut s1 = Slice::new(t(5, 16));
        s1.bars.insert(spy.clone(), trade(&spy, t(5, 16), 490.0));
        let mut s2 = Slice::new(t(6, 16));
        s2.bars.insert(spy.clone(), trade(&spy, t(6, 16), 491.0));

        let mut s3 = Slice::new(t(6, 16));
        s3.bars.insert(qqq.clone(), trade(&qqq, t(6, 16), 430.0));
        let mut s4 = Slice::new(t(7, 16));
        s4.bars.insert(qqq.clone(), trade(&qqq, t(7, 16), 431.0));

        let merged = Slice::merge_streams(vec![s1, s2], vec![s3, s4]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].time, t(5, 16));
        assert!(merged[0].bars.contains_key(&spy));
        assert!(!merged[0].bars.contains_key(&qqq));
        // Shared timestamp carries both symbols.
        assert_eq!(merged[1].bars.len(), 2);
        assert_eq!(merged[2].time, t(7, 16));
        assert!(!merged[2].bars.contains_key(&spy));
    }
}
