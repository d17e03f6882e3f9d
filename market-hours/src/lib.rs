//! US exchange calendars: open/closed predicates and trading-day
//! arithmetic for the markets the generator touches.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use core_types::symbol::SecurityType;
use std::collections::HashMap;
use std::sync::Mutex;

const REGULAR_CLOSE: NaiveTime = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
const EARLY_CLOSE: NaiveTime = NaiveTime::from_hms_opt(13, 0, 0).unwrap();

/// Full-day holidays for one calendar year.
fn holidays(year: i32) -> Vec<NaiveDate> {
    let thanksgiving = nth_weekday(year, 11, Weekday::Thu, 4);
    vec![
        observed(NaiveDate::from_ymd_opt(year, 1, 1).unwrap()),
        nth_weekday(year, 1, Weekday::Mon, 3),
        nth_weekday(year, 2, Weekday::Mon, 3),
        easter(year) - Duration::days(2),
        last_weekday(year, 5, Weekday::Mon),
        observed(NaiveDate::from_ymd_opt(year, 6, 19).unwrap()),
        observed(NaiveDate::from_ymd_opt(year, 7, 4).unwrap()),
        nth_weekday(year, 9, Weekday::Mon, 1),
        thanksgiving,
        observed(NaiveDate::from_ymd_opt(year, 12, 25).unwrap()),
    ]
}

/// Shortened sessions for one calendar year: the day after Thanksgiving
/// and Christmas Eve (when it falls on a weekday).
fn early_closes(year: i32) -> Vec<NaiveDate> {
    vec![
        nth_weekday(year, 11, Weekday::Thu, 4) + Duration::days(1),
        NaiveDate::from_ymd_opt(year, 12, 24).unwrap(),
    ]
}

/// Saturday holidays observe Friday, Sunday holidays observe Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days((offset + (n - 1) * 7) as i64)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
    };
    let mut date = next_month - Duration::days(1);
    while date.weekday() != weekday {
        date -= Duration::days(1);
    }
    date
}

/// Anonymous Gregorian (Meeus/Jones/Butcher) Easter Sunday.
fn easter(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}

/// Read-only calendar for one exchange. Holiday sets are computed per year
/// on first use and memoized behind a mutex (the map is tiny).
pub struct ExchangeCalendar {
    zone: Tz,
    holiday_cache: Mutex<HashMap<i32, Vec<NaiveDate>>>,
}

impl ExchangeCalendar {
    pub fn for_market(market: &str, security_type: SecurityType) -> Self {
        let zone = match (market, security_type) {
            ("cme", _) | ("cbot", _) | ("cfe", _) | (_, SecurityType::Future)
            | (_, SecurityType::FutureOption) => chrono_tz::America::Chicago,
            _ => chrono_tz::America::New_York,
        };
        Self {
            zone,
            holiday_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn is_open(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_monday() < 5 && !self.is_holiday(date)
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        let mut cache = self.holiday_cache.lock().unwrap();
        cache
            .entry(date.year())
            .or_insert_with(|| holidays(date.year()))
            .contains(&date)
    }

    /// Open but shortened session.
    pub fn is_early_close(&self, date: NaiveDate) -> bool {
        self.is_open(date) && early_closes(date.year()).contains(&date)
    }

    /// Session close in the exchange zone.
    pub fn close_time(&self, date: NaiveDate) -> NaiveTime {
        if self.is_early_close(date) {
            EARLY_CLOSE
        } else {
            REGULAR_CLOSE
        }
    }

    pub fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut prev = date - Duration::days(1);
        while !self.is_open(prev) {
            prev -= Duration::days(1);
        }
        prev
    }

    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut next = date + Duration::days(1);
        while !self.is_open(next) {
            next += Duration::days(1);
        }
        next
    }

    /// The trading day `n` sessions before `date` (exclusive).
    pub fn trading_days_back(&self, date: NaiveDate, n: usize) -> NaiveDate {
        let mut day = date;
        for _ in 0..n {
            day = self.previous_trading_day(day);
        }
        day
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_are_closed() {
        let cal = ExchangeCalendar::for_market("usa", SecurityType::EquityOption);
        assert!(!cal.is_open(d(2024, 2, 10))); // Saturday
        assert!(!cal.is_open(d(2024, 2, 11))); // Sunday
        assert!(cal.is_open(d(2024, 2, 7))); // Wednesday
    }

    #[test]
    fn fixed_and_floating_holidays_are_closed() {
        let cal = ExchangeCalendar::for_market("usa", SecurityType::Equity);
        assert!(!cal.is_open(d(2024, 1, 1))); // New Year
        assert!(!cal.is_open(d(2024, 1, 15))); // MLK, 3rd Monday
        assert!(!cal.is_open(d(2024, 3, 29))); // Good Friday
        assert!(!cal.is_open(d(2024, 11, 28))); // Thanksgiving
        assert!(!cal.is_open(d(2024, 12, 25)));
        assert!(cal.is_open(d(2024, 12, 26)));
    }

    #[test]
    fn saturday_holiday_observes_friday() {
        // 2026-07-04 falls on a Saturday; Friday 07-03 is the observed close.
        let cal = ExchangeCalendar::for_market("usa", SecurityType::Equity);
        assert!(!cal.is_open(d(2026, 7, 3)));
        assert!(cal.is_open(d(2026, 7, 6)));
    }

    #[test]
    fn trading_day_arithmetic_skips_closures() {
        let cal = ExchangeCalendar::for_market("usa", SecurityType::Equity);
        // Friday before MLK Monday 2024-01-15.
        assert_eq!(cal.previous_trading_day(d(2024, 1, 16)), d(2024, 1, 12));
        assert_eq!(cal.next_trading_day(d(2024, 1, 12)), d(2024, 1, 16));
        assert_eq!(cal.trading_days_back(d(2024, 1, 17), 2), d(2024, 1, 12));
    }

    #[test]
    fn black_friday_is_an_open_short_session() {
        let cal = ExchangeCalendar::for_market("usa", SecurityType::Equity);
        let black_friday = d(2024, 11, 29);
        assert!(cal.is_open(black_friday));
        assert!(cal.is_early_close(black_friday));
        assert_eq!(cal.close_time(black_friday), EARLY_CLOSE);
        assert_eq!(cal.close_time(d(2024, 2, 7)), REGULAR_CLOSE);
    }

    #[test]
    fn futures_markets_use_chicago() {
        let cal = ExchangeCalendar::for_market("cme", SecurityType::Future);
        assert_eq!(cal.zone(), chrono_tz::America::Chicago);
        let cal = ExchangeCalendar::for_market("usa", SecurityType::IndexOption);
        assert_eq!(cal.zone(), chrono_tz::America::New_York);
    }
}
