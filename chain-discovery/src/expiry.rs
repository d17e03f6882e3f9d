//! Futures expiry dictionary used where chain discovery is delegated
//! instead of scanned from the archive.
//!
//! Two listing rules cover the roots this pipeline touches: equity-index
//! futures expire on the quarterly third Friday, and VX contracts expire
//! monthly on the Wednesday 30 days ahead of the following month's third
//! Friday.

use crate::ChainProvider;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use core_types::symbol::Symbol;

/// Contracts listed per root when the dictionary drives the chain.
const DEFAULT_HORIZON: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryRule {
    QuarterlyThirdFriday,
    MonthlyVixWednesday,
}

fn rule_for(root: &str) -> ExpiryRule {
    match root {
        "VX" | "VIX" => ExpiryRule::MonthlyVixWednesday,
        _ => ExpiryRule::QuarterlyThirdFriday,
    }
}

#[derive(Debug, Clone)]
pub struct FuturesExpiryDictionary {
    horizon: usize,
}

impl Default for FuturesExpiryDictionary {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
        }
    }
}

impl FuturesExpiryDictionary {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon: horizon.max(1),
        }
    }

    /// Third Friday of the contract month, the standard index-future expiry.
    fn third_friday(year: i32, month: u32) -> NaiveDate {
        let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
        let offset = (7 + Weekday::Fri.num_days_from_monday()
            - first.weekday().num_days_from_monday())
            % 7;
        first + Duration::days((offset + 14) as i64)
    }

    /// VX settlement: the Wednesday 30 days before the next month's third
    /// Friday (the standard SPX option expiry it cash-settles against).
    fn vix_wednesday(year: i32, month: u32) -> NaiveDate {
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        Self::third_friday(next_year, next_month) - Duration::days(30)
    }

    fn monthly_expiry(rule: ExpiryRule, year: i32, month: u32) -> Option<NaiveDate> {
        match rule {
            ExpiryRule::QuarterlyThirdFriday => {
                matches!(month, 3 | 6 | 9 | 12).then(|| Self::third_friday(year, month))
            }
            ExpiryRule::MonthlyVixWednesday => Some(Self::vix_wednesday(year, month)),
        }
    }

    /// Expiries for a root strictly after `date`, nearest first.
    pub fn expiries_for(root: &str, date: NaiveDate, count: usize) -> Vec<NaiveDate> {
        let rule = rule_for(root);
        let mut expiries = Vec::with_capacity(count);
        let mut year = date.year();
        while expiries.len() < count {
            for month in 1..=12 {
                let Some(expiry) = Self::monthly_expiry(rule, year, month) else {
                    continue;
                };
                if expiry > date {
                    expiries.push(expiry);
                    if expiries.len() == count {
                        break;
                    }
                }
            }
            year += 1;
        }
        expiries
    }

    /// Quarterly expiries strictly after `date`, nearest first.
    pub fn quarterly_expiries(date: NaiveDate, count: usize) -> Vec<NaiveDate> {
        Self::expiries_for("ES", date, count)
    }

    /// Underlying future contract for an option on `root` expiring on
    /// `option_expiry`: the first listed expiry at or past it.
    pub fn underlying_expiry_for_root(root: &str, option_expiry: NaiveDate) -> NaiveDate {
        Self::expiries_for(root, option_expiry - Duration::days(1), 1)[0]
    }

    /// Quarterly-root shorthand.
    pub fn underlying_expiry_for(option_expiry: NaiveDate) -> NaiveDate {
        Self::underlying_expiry_for_root("ES", option_expiry)
    }
}

impl ChainProvider for FuturesExpiryDictionary {
    fn chain(&self, canonical: &Symbol, date: NaiveDate) -> Vec<Symbol> {
        Self::expiries_for(canonical.ticker(), date, self.horizon)
            .into_iter()
            .map(|expiry| Symbol::future(canonical.ticker(), canonical.market(), expiry))
            .collect()
    }
}
