//! Archive-backed history provider reading the same zip layout as chain
//! discovery.
//!
//! Underlying (spot) dailies live in one zip per ticker
//! (`<root>/<sec>/<market>/daily/<ticker>.zip`, entry `<ticker>.csv`).
//! Contract hour/daily data lives in one zip per ticker per year
//! (`.../<res>/<ticker>/<YYYY>_<tick-type>[_<style>].zip`), minute data in
//! one zip per ticker per day
//! (`.../minute/<ticker>/<YYYYMMDD>_<tick-type>[_<style>].zip`); entries are
//! `<contract-id>.csv`. Rows are `YYYYMMDD HH:MM` stamped:
//!
//! ```text
//! trade:        time,open,high,low,close,volume
//! quote:        time,bidopen,bidhigh,bidlow,bidclose,bidsize,
//!                    askopen,askhigh,asklow,askclose,asksize
//! openinterest: time,value
//! ```
//!
//! Quote bars surface as bid/ask midpoints. Equity-linked prices are
//! archived in deci-cents and scaled by 1e-4 on read; index spot and
//! futures prices are stored raw.

use crate::{HistoryProvider, HistoryRequest};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDateTime};
use core_types::data::{OpenInterest, QuoteBar, Slice, TradeBar};
use core_types::symbol::{Resolution, SecurityType, Symbol, SymbolKind, TickType};
use log::debug;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct FsHistoryProvider {
    data_folder: PathBuf,
}

impl FsHistoryProvider {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        Self {
            data_folder: data_folder.into(),
        }
    }

    fn price_scale(security_type: SecurityType) -> f64 {
        match security_type {
            SecurityType::Equity | SecurityType::EquityOption | SecurityType::IndexOption => 1e-4,
            SecurityType::Index | SecurityType::Future | SecurityType::FutureOption => 1.0,
        }
    }

    fn read_entry(&self, zip_path: &Path, entry: &str) -> Option<String> {
        let file = File::open(zip_path).ok()?;
        let mut archive = zip::ZipArchive::new(file).ok()?;
        let mut content = String::new();
        archive
            .by_name(entry)
            .ok()?
            .read_to_string(&mut content)
            .ok()?;
        Some(content)
    }

    fn csv_bodies(&self, request: &HistoryRequest) -> Vec<String> {
        let symbol = &request.symbol;
        let sec_dir = symbol.security_type().dir_name();
        let market = symbol.market();
        let ticker = symbol.ticker().to_ascii_lowercase();
        match symbol.kind() {
            SymbolKind::Spot => {
                if request.resolution != Resolution::Daily {
                    return Vec::new();
                }
                let path = self
                    .data_folder
                    .join(sec_dir)
                    .join(market)
                    .join("daily")
                    .join(format!("{ticker}.zip"));
                self.read_entry(&path, &format!("{ticker}.csv"))
                    .into_iter()
                    .collect()
            }
            SymbolKind::Future { .. } | SymbolKind::Option(_) => {
                let style_suffix = symbol
                    .style()
                    .map(|s| format!("_{}", s.file_tag()))
                    .unwrap_or_default();
                let dir = self
                    .data_folder
                    .join(sec_dir)
                    .join(market)
                    .join(request.resolution.dir_name())
                    .join(&ticker);
                let entry = format!("{}.csv", symbol.id());
                let tick = request.tick_type.file_tag();
                match request.resolution {
                    // One zip per day inside the request window.
                    Resolution::Minute => {
                        let mut bodies = Vec::new();
                        let mut day = request.start.date();
                        while day <= request.end.date() {
                            let path = dir.join(format!(
                                "{}_{tick}{style_suffix}.zip",
                                day.format("%Y%m%d")
                            ));
                            bodies.extend(self.read_entry(&path, &entry));
                            day += Duration::days(1);
                        }
                        bodies
                    }
                    // One zip per year.
                    Resolution::Hour | Resolution::Daily => (request.start.year()
                        ..=request.end.year())
                        .filter_map(|year| {
                            let path = dir.join(format!("{year}_{tick}{style_suffix}.zip"));
                            self.read_entry(&path, &entry)
                        })
                        .collect(),
                }
            }
            SymbolKind::Canonical { .. } => Vec::new(),
        }
    }

    fn load_into(&self, request: &HistoryRequest, merged: &mut BTreeMap<NaiveDateTime, Slice>) {
        let scale = Self::price_scale(request.symbol.security_type());
        let daily_trade = request.resolution == Resolution::Daily
            && request.tick_type == TickType::Trade;
        for body in self.csv_bodies(request) {
            for line in body.lines() {
                let Some((time, fields)) = parse_row(line) else {
                    continue;
                };
                let in_window = time >= request.start
                    && if daily_trade {
                        time < request.end
                    } else {
                        time <= request.end
                    };
                if !in_window {
                    continue;
                }
                let slice = merged.entry(time).or_insert_with(|| Slice::new(time));
                insert_row(slice, &request.symbol, request.tick_type, time, &fields, scale);
            }
        }
    }
}

fn parse_row(line: &str) -> Option<(NaiveDateTime, Vec<f64>)> {
    let mut parts = line.split(',');
    let time = NaiveDateTime::parse_from_str(parts.next()?.trim(), "%Y%m%d %H:%M").ok()?;
    let fields: Option<Vec<f64>> = parts.map(|p| p.trim().parse::<f64>().ok()).collect();
    Some((time, fields?))
}

fn insert_row(
    slice: &mut Slice,
    symbol: &Symbol,
    tick_type: TickType,
    time: NaiveDateTime,
    fields: &[f64],
    scale: f64,
) {
    match tick_type {
        TickType::Trade if fields.len() >= 5 => {
            slice.bars.insert(
                symbol.clone(),
                TradeBar {
                    symbol: symbol.clone(),
                    time,
                    open: fields[0] * scale,
                    high: fields[1] * scale,
                    low: fields[2] * scale,
                    close: fields[3] * scale,
                    volume: fields[4],
                },
            );
        }
        TickType::Quote if fields.len() >= 10 => {
            // bid OHLC + size, ask OHLC + size; bars carry the midpoints.
            let (bid, ask) = (&fields[0..4], &fields[5..9]);
            slice.quotes.insert(
                symbol.clone(),
                QuoteBar {
                    symbol: symbol.clone(),
                    time,
                    open: 0.5 * (bid[0] + ask[0]) * scale,
                    high: 0.5 * (bid[1] + ask[1]) * scale,
                    low: 0.5 * (bid[2] + ask[2]) * scale,
                    close: 0.5 * (bid[3] + ask[3]) * scale,
                },
            );
        }
        TickType::OpenInterest if !fields.is_empty() => {
            slice.open_interest.insert(
                symbol.clone(),
                OpenInterest {
                    symbol: symbol.clone(),
                    time,
                    value: fields[0],
                },
            );
        }
        _ => debug!("short row for {} at {time}", symbol.id()),
    }
}

#[async_trait]
impl HistoryProvider for FsHistoryProvider {
    async fn get_history(&self, requests: &[HistoryRequest]) -> Vec<Slice> {
        let mut merged: BTreeMap<NaiveDateTime, Slice> = BTreeMap::new();
        for request in requests {
            self.load_into(request, &mut merged);
        }
        merged.into_values().filter(|s| !s.is_empty()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::symbol::{OptionRight, OptionStyle};
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn request(
        symbol: Symbol,
        tick_type: TickType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HistoryRequest {
        HistoryRequest {
            symbol,
            tick_type,
            resolution: Resolution::Daily,
            start: start.and_hms_opt(0, 0, 0).unwrap(),
            end: end.and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn equity_dailies_are_scaled_and_windowed() {
        let tmp = tempdir().unwrap();
        write_zip(
            &tmp.path().join("equity/usa/daily/spy.zip"),
            &[(
                "spy.csv",
                "20240205 00:00,4910000,4920000,4890000,4901200,900\n\
                 20240206 00:00,4900000,4950000,4895000,4930000,1000\n\
                 20240207 00:00,4930000,4945000,4915000,4939800,1100\n\
                 20240208 00:00,4940000,4960000,4930000,4950000,1200\n",
            )],
        );
        let provider = FsHistoryProvider::new(tmp.path());
        let spy = Symbol::equity("SPY", "usa");
        let slices = provider
            .get_history(&[request(
                spy.clone(),
                TickType::Trade,
                d(2024, 2, 6),
                d(2024, 2, 8),
            )])
            .await;
        // Daily trade window is end-exclusive: the 2024-02-08 bar is out.
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].time.date(), d(2024, 2, 6));
        let last = slices.last().unwrap();
        assert!((last.bars[&spy].close - 493.98).abs() < 1e-9);
        assert_eq!(last.bars[&spy].volume, 1100.0);
    }

    #[tokio::test]
    async fn contract_quotes_and_open_interest_merge_by_timestamp() {
        let tmp = tempdir().unwrap();
        let contract = Symbol::option_contract(
            SecurityType::EquityOption,
            "SPY",
            "usa",
            OptionStyle::American,
            OptionRight::Call,
            495.0,
            d(2024, 5, 17),
            None,
        );
        let entry = format!("{}.csv", contract.id());
        write_zip(
            &tmp.path().join("option/usa/daily/spy/2024_quote_american.zip"),
            &[(
                entry.as_str(),
                "20240207 00:00,50000,53500,49500,52000,10,52000,54500,50500,53000,12\n",
            )],
        );
        write_zip(
            &tmp.path()
                .join("option/usa/daily/spy/2024_openinterest_american.zip"),
            &[(entry.as_str(), "20240207 00:00,870\n")],
        );
        let provider = FsHistoryProvider::new(tmp.path());
        let slices = provider
            .get_history(&[
                request(contract.clone(), TickType::Quote, d(2024, 2, 1), d(2024, 2, 7)),
                request(
                    contract.clone(),
                    TickType::OpenInterest,
                    d(2024, 2, 1),
                    d(2024, 2, 7),
                ),
            ])
            .await;
        assert_eq!(slices.len(), 1);
        let slice = &slices[0];
        assert!((slice.quotes[&contract].close - 5.25).abs() < 1e-9);
        assert_eq!(slice.open_interest[&contract].value, 870.0);
    }

    #[tokio::test]
    async fn minute_archives_are_read_per_day() {
        let tmp = tempdir().unwrap();
        let contract = Symbol::option_contract(
            SecurityType::EquityOption,
            "SPY",
            "usa",
            OptionStyle::American,
            OptionRight::Call,
            495.0,
            d(2024, 5, 17),
            None,
        );
        let entry = format!("{}.csv", contract.id());
        write_zip(
            &tmp.path()
                .join("option/usa/minute/spy/20240207_trade_american.zip"),
            &[(
                entry.as_str(),
                "20240207 15:58,51000,51500,50500,51200,7\n\
                 20240207 15:59,51200,52600,51100,52500,12\n",
            )],
        );
        let provider = FsHistoryProvider::new(tmp.path());
        let slices = provider
            .get_history(&[HistoryRequest {
                symbol: contract.clone(),
                tick_type: TickType::Trade,
                resolution: Resolution::Minute,
                start: d(2024, 2, 7).and_hms_opt(0, 0, 0).unwrap(),
                end: d(2024, 2, 7).and_hms_opt(16, 0, 0).unwrap(),
            }])
            .await;
        assert_eq!(slices.len(), 2);
        assert!((slices[1].bars[&contract].close - 5.25).abs() < 1e-9);
        assert_eq!(slices[1].bars[&contract].volume, 12.0);
    }

    #[tokio::test]
    async fn missing_archive_contributes_nothing() {
        let tmp = tempdir().unwrap();
        let provider = FsHistoryProvider::new(tmp.path());
        let slices = provider
            .get_history(&[request(
                Symbol::equity("GME", "usa"),
                TickType::Trade,
                d(2024, 2, 1),
                d(2024, 2, 8),
            )])
            .await;
        assert!(slices.is_empty());
    }
}
