//! Contract-chain discovery from the date-partitioned zip archive.
//!
//! Layout scanned, per security type and market:
//!
//! ```text
//! <root>/<sec-type>/<market>/minute/<ticker>/<YYYYMMDD>_<tick-type>[_<style>].zip
//! <root>/<sec-type>/<market>/hour/<ticker>/<YYYY>_<tick-type>[_<style>].zip
//! <root>/<sec-type>/<market>/daily/<ticker>/<YYYY>_<tick-type>[_<style>].zip
//! ```
//!
//! Zip entry stems are contract identifiers decodable by the symbol codec.
//! Resolutions are scanned in preference order; the finest resolution that
//! yields contracts for a canonical wins and coarser scans for the same
//! canonical are skipped.

mod expiry;

pub use expiry::FuturesExpiryDictionary;

use chrono::{Datelike, NaiveDate};
use core_types::symbol::{OptionStyle, Resolution, SecurityType, Symbol, TickType};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("archive scan failed under {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Delegated chain source used where the filesystem scan does not apply
/// (e.g. futures chains driven by an expiry dictionary).
pub trait ChainProvider: Send + Sync {
    fn chain(&self, canonical: &Symbol, date: NaiveDate) -> Vec<Symbol>;
}

pub struct ChainDiscovery {
    data_folder: PathBuf,
    security_type: SecurityType,
    market: String,
    resolutions: Vec<Resolution>,
}

impl ChainDiscovery {
    pub fn new(
        data_folder: impl Into<PathBuf>,
        security_type: SecurityType,
        market: impl Into<String>,
        resolutions: Vec<Resolution>,
    ) -> Self {
        Self {
            data_folder: data_folder.into(),
            security_type,
            market: market.into(),
            resolutions,
        }
    }

    /// Live contracts per canonical on the processing date. Missing
    /// directories yield an empty map; unreadable zips are skipped.
    pub fn discover(&self, date: NaiveDate) -> Result<BTreeMap<Symbol, Vec<Symbol>>, ChainError> {
        let mut chains: BTreeMap<Symbol, BTreeSet<Symbol>> = BTreeMap::new();
        for resolution in &self.resolutions {
            let dir = self
                .data_folder
                .join(self.security_type.dir_name())
                .join(&self.market)
                .join(resolution.dir_name());
            if !dir.is_dir() {
                continue;
            }
            let tickers = std::fs::read_dir(&dir).map_err(|source| ChainError::Scan {
                path: dir.clone(),
                source,
            })?;
            let mut found: BTreeMap<Symbol, BTreeSet<Symbol>> = BTreeMap::new();
            for ticker_entry in tickers.flatten() {
                let ticker_dir = ticker_entry.path();
                if !ticker_dir.is_dir() {
                    continue;
                }
                let Some(ticker) = ticker_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_ascii_uppercase)
                else {
                    continue;
                };
                self.scan_ticker(&ticker, &ticker_dir, *resolution, date, &mut found);
            }
            // A canonical already filled at a finer resolution keeps it.
            for (canonical, contracts) in found {
                chains.entry(canonical).or_insert(contracts);
            }
        }
        Ok(chains
            .into_iter()
            .map(|(canonical, contracts)| (canonical, contracts.into_iter().collect()))
            .collect())
    }

    fn scan_ticker(
        &self,
        ticker: &str,
        ticker_dir: &Path,
        resolution: Resolution,
        date: NaiveDate,
        chains: &mut BTreeMap<Symbol, BTreeSet<Symbol>>,
    ) {
        let files = match std::fs::read_dir(ticker_dir) {
            Ok(files) => files,
            Err(err) => {
                warn!("skipping {}: {err}", ticker_dir.display());
                return;
            }
        };
        for file in files.flatten() {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((style, matches_date)) = parse_zip_stem(stem, resolution, date) else {
                continue;
            };
            if !matches_date {
                continue;
            }
            let contracts = match self.read_contract_names(&path, ticker, style, date) {
                Ok(contracts) => contracts,
                Err(err) => {
                    warn!("unreadable archive {}: {err}", path.display());
                    continue;
                }
            };
            for contract in contracts {
                let canonical = self.canonical_for(ticker, &contract);
                let entry = chains.entry(canonical).or_default();
                entry.insert(contract);
            }
        }
    }

    fn read_contract_names(
        &self,
        path: &Path,
        ticker: &str,
        style: Option<OptionStyle>,
        date: NaiveDate,
    ) -> Result<Vec<Symbol>, Box<dyn std::error::Error>> {
        let file = File::open(path)?;
        let archive = zip::ZipArchive::new(file)?;
        let mut contracts = Vec::new();
        for name in archive.file_names() {
            let stem = name.strip_suffix(".csv").unwrap_or(name);
            let Some(symbol) = self.parse_contract(stem, ticker, style) else {
                debug!("undecodable entry '{name}' in {}", path.display());
                continue;
            };
            // Expired contracts never make the chain.
            if symbol.expiry().is_some_and(|expiry| expiry > date) {
                contracts.push(symbol);
            }
        }
        Ok(contracts)
    }

    fn parse_contract(&self, stem: &str, ticker: &str, style: Option<OptionStyle>) -> Option<Symbol> {
        match self.security_type {
            SecurityType::Future => parse_future_id(stem, &self.market),
            sec if sec.is_option() => {
                let style = style.unwrap_or(OptionStyle::American);
                let underlying_expiry = if sec == SecurityType::FutureOption {
                    // The id tail carries the option expiry; the underlying
                    // future is the next listed contract at or past it.
                    let probe =
                        Symbol::parse_option_id(stem, sec, &self.market, style, None)?;
                    Some(FuturesExpiryDictionary::underlying_expiry_for_root(
                        ticker,
                        probe.expiry()?,
                    ))
                } else {
                    None
                };
                let symbol =
                    Symbol::parse_option_id(stem, sec, &self.market, style, underlying_expiry)?;
                (symbol.ticker() == ticker).then_some(symbol)
            }
            _ => None,
        }
    }

    fn canonical_for(&self, ticker: &str, contract: &Symbol) -> Symbol {
        match self.security_type {
            SecurityType::FutureOption => {
                let underlying_expiry = contract
                    .option_spec()
                    .and_then(|spec| spec.underlying_expiry)
                    .unwrap_or(NaiveDate::MAX);
                Symbol::canonical_future_option(ticker, self.market.clone(), underlying_expiry)
            }
            sec => Symbol::canonical(sec, ticker, self.market.clone()),
        }
    }
}

/// `(style, stem matches the processing date)` for an archive file stem like
/// `20240207_quote_american` or `2024_trade`.
fn parse_zip_stem(
    stem: &str,
    resolution: Resolution,
    date: NaiveDate,
) -> Option<(Option<OptionStyle>, bool)> {
    let mut parts = stem.split('_');
    let date_token = parts.next()?;
    let tick_token = parts.next()?;
    let style = match parts.next() {
        Some("american") => Some(OptionStyle::American),
        Some("european") => Some(OptionStyle::European),
        Some(_) => return None,
        None => None,
    };
    let tick_ok = [TickType::Trade, TickType::Quote, TickType::OpenInterest]
        .iter()
        .any(|t| t.file_tag() == tick_token);
    if !tick_ok {
        return None;
    }
    let matches = match resolution {
        Resolution::Minute => date_token == date.format("%Y%m%d").to_string(),
        Resolution::Hour | Resolution::Daily => {
            date_token.parse::<i32>().ok() == Some(date.year())
        }
    };
    Some((style, matches))
}

/// `<ROOT><YYYYMMDD>`, e.g. `ES20240621`.
fn parse_future_id(stem: &str, market: &str) -> Option<Symbol> {
    if stem.len() <= 8 {
        return None;
    }
    let (root, tail) = stem.split_at(stem.len() - 8);
    let expiry = NaiveDate::parse_from_str(tail, "%Y%m%d").ok()?;
    if root.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(Symbol::future(root, market, expiry))
}
