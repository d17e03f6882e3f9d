//! Secondary provider fetching daily index bars from an HTTP archive.
//! Used when the local archive has nothing for an index underlying.

use crate::{HistoryProvider, HistoryRequest};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use core_types::data::{Slice, TradeBar};
use core_types::retry::RetryPolicy;
use core_types::symbol::{Resolution, Symbol, SymbolKind, TickType};
use log::warn;
use std::collections::BTreeMap;

pub struct OnlineIndexProvider {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl OnlineIndexProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            retry: RetryPolicy::default_http(),
        }
    }

    async fn fetch_csv(&self, ticker: &str) -> Option<String> {
        let url = format!("{}/{}.csv", self.base_url, ticker.to_ascii_lowercase());
        let result = self
            .retry
            .retry_async(|_| {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client.get(&url).send().await?;
                    response.error_for_status()?.text().await
                }
            })
            .await;
        match result {
            Ok(body) => Some(body),
            Err(err) => {
                warn!("online index history for {ticker} failed: {err}");
                None
            }
        }
    }
}

/// Rows are `YYYYMMDD,open,high,low,close[,volume]`, one session per line.
fn parse_daily_csv(symbol: &Symbol, body: &str, start: NaiveDateTime, end: NaiveDateTime) -> Vec<TradeBar> {
    body.lines()
        .filter_map(|line| {
            let mut parts = line.split(',');
            let date = NaiveDate::parse_from_str(parts.next()?.trim(), "%Y%m%d").ok()?;
            let time = date.and_hms_opt(0, 0, 0)?;
            if time < start || time >= end {
                return None;
            }
            let mut next = || parts.next()?.trim().parse::<f64>().ok();
            let open = next()?;
            let high = next()?;
            let low = next()?;
            let close = next()?;
            let volume = next().unwrap_or(0.0);
            Some(TradeBar {
                symbol: symbol.clone(),
                time,
                open,
                high,
                low,
                close,
                volume,
            })
        })
        .collect()
}

#[async_trait]
impl HistoryProvider for OnlineIndexProvider {
    async fn get_history(&self, requests: &[HistoryRequest]) -> Vec<Slice> {
        let mut merged: BTreeMap<NaiveDateTime, Slice> = BTreeMap::new();
        for request in requests {
            let servable = matches!(request.symbol.kind(), SymbolKind::Spot)
                && request.tick_type == TickType::Trade
                && request.resolution == Resolution::Daily;
            if !servable {
                continue;
            }
            let Some(body) = self.fetch_csv(request.symbol.ticker()).await else {
                continue;
            };
            for bar in parse_daily_csv(&request.symbol, &body, request.start, request.end) {
                let slice = merged
                    .entry(bar.time)
                    .or_insert_with(|| Slice::new(bar.time));
                slice.bars.insert(request.symbol.clone(), bar);
            }
        }
        merged.into_values().collect()
    }
}
