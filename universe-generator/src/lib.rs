//! Per-underlying universe generation: market gating, underlying line,
//! contract lines from merged history streams, IV repair, CSV write, with
//! semaphore-bounded fan-out across canonicals.

use chain_discovery::{ChainDiscovery, ChainError, ChainProvider};
use chrono::NaiveDate;
use core_types::data::Slice;
use core_types::entry::{
    ContractEntry, OptionEntry, UnderlyingEntry, UniverseEntry, CONTRACT_HEADER, OPTION_HEADER,
};
use core_types::symbol::{SecurityType, Symbol, SymbolKind, TickType};
use greeks_engine::{GreeksBundle, GreeksConfig};
use history_gateway::HistoryGateway;
use log::{error, info, warn};
use market_hours::ExchangeCalendar;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use vol_surface::repair_missing_ivs;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("universe write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no chain found for an open session on {0}")]
    EmptyChainOnOpenSession(NaiveDate),
}

/// Where the per-canonical contract lists come from.
pub enum ChainSource {
    /// Scan the date-partitioned archive.
    Archive(ChainDiscovery),
    /// Delegate to a pure provider over fixed chain roots (e.g. futures
    /// expiry dictionaries).
    Delegated {
        provider: Arc<dyn ChainProvider>,
        canonicals: Vec<Symbol>,
    },
}

impl ChainSource {
    fn chains(&self, date: NaiveDate) -> Result<BTreeMap<Symbol, Vec<Symbol>>, ChainError> {
        match self {
            ChainSource::Archive(discovery) => discovery.discover(date),
            ChainSource::Delegated {
                provider,
                canonicals,
            } => Ok(canonicals
                .iter()
                .map(|canonical| (canonical.clone(), provider.chain(canonical, date)))
                .collect()),
        }
    }
}

pub struct UniverseGenerator {
    security_type: SecurityType,
    market: String,
    output_folder: PathBuf,
    chain_source: ChainSource,
    history: Arc<HistoryGateway>,
    greeks_cfg: GreeksConfig,
    /// Upper-cased tickers to restrict processing to. None means all.
    symbol_filter: Option<HashSet<String>>,
    pool_size: usize,
    eta_log_interval: usize,
}

struct RunState {
    cancelled: AtomicBool,
    processed_contracts: AtomicUsize,
    total_contracts: usize,
    underlyings_with_missing_data: AtomicUsize,
    started: Instant,
}

impl UniverseGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        security_type: SecurityType,
        market: impl Into<String>,
        output_folder: impl Into<PathBuf>,
        chain_source: ChainSource,
        history: Arc<HistoryGateway>,
        greeks_cfg: GreeksConfig,
        symbol_filter: Option<HashSet<String>>,
        pool_size: usize,
        eta_log_interval: usize,
    ) -> Self {
        Self {
            security_type,
            market: market.into(),
            output_folder: output_folder.into(),
            chain_source,
            history,
            greeks_cfg,
            symbol_filter,
            pool_size: pool_size.max(1),
            eta_log_interval: eta_log_interval.max(1),
        }
    }

    /// 1.5x the detected core count.
    pub fn default_pool_size() -> usize {
        (num_cpus::get() * 3).div_ceil(2).max(1)
    }

    /// Generate every universe file for the processing date. False when any
    /// canonical failed; market-closed days are a successful no-op.
    pub async fn run(&self, date: NaiveDate) -> bool {
        let mut chains = match self.chain_source.chains(date) {
            Ok(chains) => chains,
            Err(err) => {
                error!("chain discovery failed: {err}");
                return false;
            }
        };
        let calendar = Arc::new(ExchangeCalendar::for_market(&self.market, self.security_type));
        if chains.is_empty() {
            if calendar.is_open(date) {
                error!("{}", GeneratorError::EmptyChainOnOpenSession(date));
                return false;
            }
            info!("no chains for {date}; market closed, nothing to do");
            return true;
        }
        if let Some(filter) = &self.symbol_filter {
            chains.retain(|canonical, _| filter.contains(canonical.ticker()));
        }

        let underlying_calendar = self
            .security_type
            .underlying_type()
            .map(|t| Arc::new(ExchangeCalendar::for_market(&self.market, t)));

        let state = Arc::new(RunState {
            cancelled: AtomicBool::new(false),
            processed_contracts: AtomicUsize::new(0),
            total_contracts: chains.values().map(Vec::len).sum(),
            underlyings_with_missing_data: AtomicUsize::new(0),
            started: Instant::now(),
        });
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut handles = Vec::with_capacity(chains.len());

        for (canonical, contracts) in chains {
            if state.cancelled.load(Ordering::SeqCst) {
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let task = CanonicalTask {
                security_type: self.security_type,
                market: self.market.clone(),
                output_folder: self.output_folder.clone(),
                history: self.history.clone(),
                greeks_cfg: self.greeks_cfg.clone(),
                calendar: calendar.clone(),
                underlying_calendar: underlying_calendar.clone(),
                state: state.clone(),
                eta_log_interval: self.eta_log_interval,
            };
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let id = canonical.id();
                if let Err(err) = task.process(canonical, contracts, date).await {
                    error!("universe generation failed for {id}: {err}");
                    task.state.cancelled.store(true, Ordering::SeqCst);
                }
            }));
        }
        futures::future::join_all(handles).await;

        let missing = state.underlyings_with_missing_data.load(Ordering::SeqCst);
        if missing > 0 {
            warn!("{missing} underlyings skipped for missing history");
        }
        !state.cancelled.load(Ordering::SeqCst)
    }
}

struct CanonicalTask {
    security_type: SecurityType,
    market: String,
    output_folder: PathBuf,
    history: Arc<HistoryGateway>,
    greeks_cfg: GreeksConfig,
    calendar: Arc<ExchangeCalendar>,
    underlying_calendar: Option<Arc<ExchangeCalendar>>,
    state: Arc<RunState>,
    eta_log_interval: usize,
}

impl CanonicalTask {
    async fn process(
        &self,
        canonical: Symbol,
        contracts: Vec<Symbol>,
        date: NaiveDate,
    ) -> Result<(), GeneratorError> {
        let closed = !self.calendar.is_open(date)
            || self
                .underlying_calendar
                .as_ref()
                .is_some_and(|cal| !cal.is_open(date));
        if closed {
            info!("Market is closed on {date}, skipping {}", canonical.id());
            return Ok(());
        }

        // Underlying line first; its close seeds moneyness for the repair.
        let underlying = canonical.underlying();
        let mut underlying_slices = Vec::new();
        let mut underlying_line = None;
        let mut spot = 0.0;
        if let Some(underlying_symbol) = &underlying {
            underlying_slices = self
                .history
                .fetch(&[(underlying_symbol.clone(), TickType::Trade)], date)
                .await;
            if underlying_slices.is_empty() && self.security_type.has_greeks() {
                warn!(
                    "no underlying history for {}, skipping canonical",
                    underlying_symbol.id()
                );
                self.state
                    .underlyings_with_missing_data
                    .fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
            let mut entry = UnderlyingEntry::new(underlying_symbol.clone());
            if let Some(last) = underlying_slices.last() {
                entry.update(last);
            }
            spot = entry.close;
            underlying_line = Some(entry.to_csv());
        }

        let lines = if self.security_type.is_option() {
            self.option_lines(&contracts, &underlying_slices, spot, date)
                .await
        } else {
            self.contract_lines(&contracts, date).await
        };

        let mut content = String::new();
        let header = self.header();
        content.push_str(header);
        content.push('\n');
        if let Some(line) = underlying_line {
            // The underlying row carries only the base fields; pad it to the
            // header width so every data line has the same column count.
            content.push_str(&pad_to_header(&line, header));
            content.push('\n');
        }
        for line in lines {
            content.push_str(&line);
            content.push('\n');
        }

        let path = self.output_path(&canonical, date);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    fn header(&self) -> &'static str {
        if self.security_type.is_option() {
            OPTION_HEADER
        } else {
            CONTRACT_HEADER
        }
    }

    async fn option_lines(
        &self,
        contracts: &[Symbol],
        underlying_slices: &[Slice],
        spot: f64,
        date: NaiveDate,
    ) -> Vec<String> {
        let has_greeks = self.security_type.has_greeks();
        let mut entries = Vec::with_capacity(contracts.len());
        for contract in contracts {
            if self.state.cancelled.load(Ordering::SeqCst) {
                break;
            }
            let mut wanted = vec![
                (contract.clone(), TickType::Trade),
                (contract.clone(), TickType::Quote),
                (contract.clone(), TickType::OpenInterest),
            ];
            if let Some(mirror) = contract.mirror() {
                wanted.push((mirror, TickType::Quote));
            }
            let contract_slices = self.history.fetch(&wanted, date).await;
            let merged = Slice::merge_streams(contract_slices, underlying_slices.to_vec());

            let mut entry = OptionEntry::new(contract.clone());
            let mut bundle = if has_greeks {
                GreeksBundle::new(contract.clone(), date, self.greeks_cfg.clone()).ok()
            } else {
                None
            };
            for slice in &merged {
                entry.update(slice);
                if let Some(bundle) = bundle.as_mut() {
                    bundle.update(slice);
                }
            }
            if let Some(bundle) = &bundle {
                entry.set_implied_volatility(bundle.implied_volatility());
                entry.set_greeks(bundle.greeks());
            }
            entries.push(entry);
            self.tick_eta();
        }

        if has_greeks && spot > 0.0 {
            let outcome = repair_missing_ivs(&mut entries, spot, date, &self.greeks_cfg);
            if outcome.repaired > 0 || outcome.failed > 0 {
                info!(
                    "iv repair: {} repaired, {} failed",
                    outcome.repaired, outcome.failed
                );
            }
        }
        entries.iter().map(|e| e.to_csv()).collect()
    }

    async fn contract_lines(&self, contracts: &[Symbol], date: NaiveDate) -> Vec<String> {
        let mut lines = Vec::with_capacity(contracts.len());
        for contract in contracts {
            if self.state.cancelled.load(Ordering::SeqCst) {
                break;
            }
            let wanted = vec![
                (contract.clone(), TickType::Trade),
                (contract.clone(), TickType::Quote),
                (contract.clone(), TickType::OpenInterest),
            ];
            let slices = self.history.fetch(&wanted, date).await;
            let mut entry = ContractEntry::new(contract.clone());
            for slice in &slices {
                entry.update(slice);
            }
            lines.push(entry.to_csv());
            self.tick_eta();
        }
        lines
    }

    fn tick_eta(&self) {
        let done = self
            .state
            .processed_contracts
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        if done % self.eta_log_interval == 0 {
            let elapsed = self.state.started.elapsed();
            let total = self.state.total_contracts;
            let remaining = total.saturating_sub(done);
            let eta = elapsed.mul_f64(remaining as f64 / done as f64);
            info!("processed {done}/{total} contracts, elapsed {elapsed:?}, eta {eta:?}");
        }
    }

    /// `<out>/<sec-type>/<market>/universes/<underlying-key>/<YYYYMMDD>.csv`
    fn output_path(&self, canonical: &Symbol, date: NaiveDate) -> PathBuf {
        let key = underlying_key(canonical);
        self.output_folder
            .join(self.security_type.dir_name())
            .join(&self.market)
            .join("universes")
            .join(key)
            .join(format!("{}.csv", date.format("%Y%m%d")))
    }
}

/// Equity/index ticker lower-cased; `<future-root>/<expiry>` for
/// future-option chains.
fn underlying_key(canonical: &Symbol) -> String {
    match canonical.kind() {
        SymbolKind::Canonical {
            underlying_expiry: Some(expiry),
        } => format!(
            "{}/{}",
            canonical.ticker().to_ascii_lowercase(),
            expiry.format("%Y%m%d")
        ),
        _ => canonical.ticker().to_ascii_lowercase(),
    }
}

/// Append empty fields until the line's column count matches the header's.
fn pad_to_header(line: &str, header: &str) -> String {
    let missing = header
        .split(',')
        .count()
        .saturating_sub(line.split(',').count());
    let mut padded = line.to_string();
    for _ in 0..missing {
        padded.push(',');
    }
    padded
}
