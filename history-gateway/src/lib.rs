//! Uniform history facade over one or more providers with a resolution
//! fallback ladder. The gateway recomputes the request window for each
//! rung, reissues, and returns the first non-empty result; when every rung
//! comes back empty it can delegate to a secondary (online) provider.

mod fs_provider;
mod online;

pub use fs_provider::FsHistoryProvider;
pub use online::OnlineIndexProvider;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use core_types::data::Slice;
use core_types::symbol::{Resolution, Symbol, TickType};
use log::debug;
use market_hours::ExchangeCalendar;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub tick_type: TickType,
    pub resolution: Resolution,
    /// Inclusive window start.
    pub start: NaiveDateTime,
    /// Exclusive for daily trade bars, inclusive otherwise.
    pub end: NaiveDateTime,
}

/// Thread-safe history source. Requests that cannot be served contribute
/// nothing to the output; providers never error to callers.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn get_history(&self, requests: &[HistoryRequest]) -> Vec<Slice>;
}

pub struct HistoryGateway {
    provider: Arc<dyn HistoryProvider>,
    secondary: Option<Arc<dyn HistoryProvider>>,
    ladder: Vec<Resolution>,
    calendar: Arc<ExchangeCalendar>,
    bar_count: usize,
}

impl HistoryGateway {
    pub fn new(
        provider: Arc<dyn HistoryProvider>,
        secondary: Option<Arc<dyn HistoryProvider>>,
        ladder: Vec<Resolution>,
        calendar: Arc<ExchangeCalendar>,
        bar_count: usize,
    ) -> Self {
        Self {
            provider,
            secondary,
            ladder,
            calendar,
            bar_count: bar_count.max(1),
        }
    }

    /// History for a set of (symbol, tick type) pairs around the processing
    /// date. Time-ordered slices; empty when no rung and no secondary can
    /// serve the request.
    pub async fn fetch(&self, wanted: &[(Symbol, TickType)], date: NaiveDate) -> Vec<Slice> {
        for resolution in &self.ladder {
            let requests = self.requests_for(wanted, *resolution, date);
            let slices = self.provider.get_history(&requests).await;
            if !slices.is_empty() {
                return slices;
            }
            debug!("no {resolution:?} history, trying next rung");
        }
        if let Some(secondary) = &self.secondary {
            let requests = self.requests_for(wanted, Resolution::Daily, date);
            let slices = secondary.get_history(&requests).await;
            if !slices.is_empty() {
                return slices;
            }
        }
        Vec::new()
    }

    fn requests_for(
        &self,
        wanted: &[(Symbol, TickType)],
        resolution: Resolution,
        date: NaiveDate,
    ) -> Vec<HistoryRequest> {
        wanted
            .iter()
            .map(|(symbol, tick_type)| {
                self.request_for(symbol.clone(), *tick_type, resolution, date)
            })
            .collect()
    }

    /// Daily trade bars stamp at midnight of the following day, so their
    /// window ends at D+1 (exclusive); intraday and open-interest windows
    /// end at D (inclusive). Start is N trading sessions back.
    fn request_for(
        &self,
        symbol: Symbol,
        tick_type: TickType,
        resolution: Resolution,
        date: NaiveDate,
    ) -> HistoryRequest {
        let end_date = match (resolution, tick_type) {
            (Resolution::Daily, TickType::Trade) => date + Duration::days(1),
            _ => date,
        };
        let start_date = self.calendar.trading_days_back(date, self.bar_count);
        HistoryRequest {
            symbol,
            tick_type,
            resolution,
            start: start_date.and_hms_opt(0, 0, 0).unwrap(),
            end: end_date.and_hms_opt(0, 0, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::symbol::SecurityType;
    use std::sync::Mutex;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct ScriptedProvider {
        serves: Resolution,
        calls: Mutex<Vec<Resolution>>,
    }

    impl ScriptedProvider {
        fn new(serves: Resolution) -> Self {
            Self {
                serves,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HistoryProvider for ScriptedProvider {
        async fn get_history(&self, requests: &[HistoryRequest]) -> Vec<Slice> {
            let resolution = requests[0].resolution;
            self.calls.lock().unwrap().push(resolution);
            if resolution == self.serves {
                vec![Slice::new(requests[0].start)]
            } else {
                Vec::new()
            }
        }
    }

    struct EmptyProvider;

    #[async_trait]
    impl HistoryProvider for EmptyProvider {
        async fn get_history(&self, _requests: &[HistoryRequest]) -> Vec<Slice> {
            Vec::new()
        }
    }

    fn calendar() -> Arc<ExchangeCalendar> {
        Arc::new(ExchangeCalendar::for_market(
            "usa",
            SecurityType::EquityOption,
        ))
    }

    #[tokio::test]
    async fn ladder_falls_through_to_first_serving_rung() {
        let provider = Arc::new(ScriptedProvider::new(Resolution::Hour));
        let gateway = HistoryGateway::new(
            provider.clone(),
            None,
            vec![Resolution::Daily, Resolution::Hour, Resolution::Minute],
            calendar(),
            5,
        );
        let wanted = vec![(Symbol::equity("SPY", "usa"), TickType::Trade)];
        let slices = gateway.fetch(&wanted, d(2024, 2, 7)).await;
        assert_eq!(slices.len(), 1);
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec![Resolution::Daily, Resolution::Hour]
        );
    }

    #[tokio::test]
    async fn secondary_serves_when_every_rung_is_empty() {
        let secondary = Arc::new(ScriptedProvider::new(Resolution::Daily));
        let gateway = HistoryGateway::new(
            Arc::new(EmptyProvider),
            Some(secondary.clone()),
            vec![Resolution::Daily],
            calendar(),
            5,
        );
        let wanted = vec![(Symbol::index("SPX", "usa"), TickType::Trade)];
        let slices = gateway.fetch(&wanted, d(2024, 2, 7)).await;
        assert_eq!(slices.len(), 1);
        assert_eq!(*secondary.calls.lock().unwrap(), vec![Resolution::Daily]);
    }

    #[tokio::test]
    async fn all_empty_yields_empty_not_error() {
        let gateway = HistoryGateway::new(
            Arc::new(EmptyProvider),
            None,
            vec![Resolution::Daily, Resolution::Minute],
            calendar(),
            5,
        );
        let wanted = vec![(Symbol::equity("SPY", "usa"), TickType::Trade)];
        assert!(gateway.fetch(&wanted, d(2024, 2, 7)).await.is_empty());
    }

    #[test]
    fn daily_trade_window_ends_a_day_late_and_oi_does_not() {
        let gateway = HistoryGateway::new(
            Arc::new(EmptyProvider),
            None,
            vec![Resolution::Daily],
            calendar(),
            5,
        );
        let date = d(2024, 2, 7);
        let trade = gateway.request_for(
            Symbol::equity("SPY", "usa"),
            TickType::Trade,
            Resolution::Daily,
            date,
        );
        assert_eq!(trade.end.date(), d(2024, 2, 8));
        let oi = gateway.request_for(
            Symbol::equity("SPY", "usa"),
            TickType::OpenInterest,
            Resolution::Daily,
            date,
        );
        assert_eq!(oi.end.date(), date);
        // Five sessions back from Wed 2024-02-07 is Wed 2024-01-31.
        assert_eq!(trade.start.date(), d(2024, 1, 31));
    }
}
