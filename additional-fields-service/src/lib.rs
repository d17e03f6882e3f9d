//! Second-stage pass over written option universe files: 30-day
//! constant-maturity ATM implied volatility plus its one-year rank and
//! percentile, appended as three extra CSV columns.
//!
//! The per-underlying IV30 cache lives only for one invocation; nothing
//! persists across processing dates.

use chrono::{Duration, NaiveDate};
use core_types::symbol::{OptionStyle, SecurityType, Symbol};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APPENDED_COLUMNS: &str = "iv_30,iv_rank,iv_percentile";
const LOOKBACK_DAYS: i64 = 366;
const TARGET_MATURITY_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum PassError {
    #[error("universe rewrite failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct AdditionalFieldsService {
    universes_folder: PathBuf,
}

impl AdditionalFieldsService {
    /// `universes_folder` is `<out>/<sec-type>/<market>/universes`.
    pub fn new(universes_folder: impl Into<PathBuf>) -> Self {
        Self {
            universes_folder: universes_folder.into(),
        }
    }

    /// Extend every underlying's universe file for the processing date.
    /// Returns the number of files rewritten.
    pub fn run(&self, date: NaiveDate) -> Result<usize, PassError> {
        if !self.universes_folder.is_dir() {
            return Ok(0);
        }
        let mut rewritten = 0;
        for entry in std::fs::read_dir(&self.universes_folder)?.flatten() {
            let dir = entry.path();
            if dir.is_dir() && self.process_symbol_dir(&dir, date)? {
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    fn process_symbol_dir(&self, dir: &Path, date: NaiveDate) -> Result<bool, PassError> {
        let target = dir.join(format!("{}.csv", date.format("%Y%m%d")));
        if !target.is_file() {
            return Ok(false);
        }

        // One year of files, filename-dated, oldest first.
        let mut dated_files: BTreeMap<NaiveDate, PathBuf> = BTreeMap::new();
        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(file_date) = NaiveDate::parse_from_str(stem, "%Y%m%d") else {
                continue;
            };
            if file_date <= date && file_date > date - Duration::days(LOOKBACK_DAYS) {
                dated_files.insert(file_date, path);
            }
        }

        let ivs: Vec<f64> = dated_files
            .iter()
            .filter_map(|(file_date, path)| compute_iv30(path, *file_date))
            .collect();

        self.rewrite(&target, &ivs)
    }

    fn rewrite(&self, target: &Path, ivs: &[f64]) -> Result<bool, PassError> {
        let content = std::fs::read_to_string(target)?;
        let mut lines = content.lines();
        let Some(header) = lines.next() else {
            return Ok(false);
        };
        if header.contains("iv_30") {
            debug!("{} already extended", target.display());
            return Ok(false);
        }

        let (iv_30, iv_rank, iv_percentile) = summarize(ivs);
        let triple = format!(
            ",{},{},{}",
            fmt_opt(iv_30),
            fmt_opt(iv_rank),
            fmt_opt(iv_percentile)
        );
        let mut out = String::new();
        out.push_str(header);
        out.push(',');
        out.push_str(APPENDED_COLUMNS);
        out.push('\n');
        // The same per-day triple is appended to every data row.
        for line in lines {
            out.push_str(line);
            out.push_str(&triple);
            out.push('\n');
        }
        std::fs::write(target, out)?;
        Ok(true)
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.to_string())
        .unwrap_or_default()
}

/// `(iv_30, iv_rank, iv_percentile)` from the date-ordered IV30 series.
/// Rank and percentile need at least two observations.
fn summarize(ivs: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    let Some(&latest) = ivs.last() else {
        return (None, None, None);
    };
    if ivs.len() < 2 {
        return (Some(latest), None, None);
    }
    let min = ivs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = ivs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let rank = if max > min {
        Some((latest - min) / (max - min))
    } else {
        None
    };
    let below = ivs.iter().filter(|v| **v < latest).count();
    let percentile = Some(below as f64 / ivs.len() as f64);
    (Some(latest), rank, percentile)
}

/// ATM IV30 for one universe file: per expiry take the IV of the contract
/// whose |delta - 0.5| is smallest, then linearly interpolate between the
/// two expiries bracketing `file_date + 30`. Files without the required
/// columns are skipped.
fn compute_iv30(path: &Path, file_date: NaiveDate) -> Option<f64> {
    let content = std::fs::read_to_string(path).ok()?;
    let mut lines = content.lines();
    let header = lines.next()?.trim_start_matches('#');
    let columns: Vec<&str> = header.split(',').collect();
    let sid_col = columns.iter().position(|c| *c == "symbol_id")?;
    let iv_col = columns.iter().position(|c| *c == "implied_volatility")?;
    let delta_col = columns.iter().position(|c| *c == "delta")?;

    // Best (closest-to-0.5-delta) IV per expiry.
    let mut atm_by_expiry: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        let Some(sid) = fields.get(sid_col) else {
            continue;
        };
        let Some(expiry) = Symbol::parse_option_id(
            sid,
            SecurityType::EquityOption,
            "usa",
            OptionStyle::American,
            None,
        )
        .and_then(|s| s.expiry()) else {
            continue; // underlying row or undecodable id
        };
        let Some(iv) = fields.get(iv_col).and_then(|f| f.parse::<f64>().ok()) else {
            continue;
        };
        let Some(delta) = fields.get(delta_col).and_then(|f| f.parse::<f64>().ok()) else {
            continue;
        };
        if !(iv.is_finite() && iv > 0.0) {
            continue;
        }
        let distance = (delta - 0.5).abs();
        match atm_by_expiry.get(&expiry) {
            Some((best, _)) if *best <= distance => {}
            _ => {
                atm_by_expiry.insert(expiry, (distance, iv));
            }
        }
    }
    if atm_by_expiry.is_empty() {
        warn!("no usable rows for iv30 in {}", path.display());
        return None;
    }

    let target = file_date + Duration::days(TARGET_MATURITY_DAYS);
    let near = atm_by_expiry
        .range(..=target)
        .next_back()
        .map(|(d, (_, iv))| (*d, *iv));
    let far = atm_by_expiry
        .range(target..)
        .next()
        .map(|(d, (_, iv))| (*d, *iv));
    match (near, far) {
        (Some((near_date, near_iv)), Some((far_date, far_iv))) => {
            if near_date == far_date {
                return Some(near_iv);
            }
            let span = (far_date - near_date).num_days() as f64;
            let w_near = (far_date - target).num_days() as f64 / span;
            let w_far = (target - near_date).num_days() as f64 / span;
            Some(near_iv * w_near + far_iv * w_far)
        }
        // No bracket on one side: clamp to the nearest expiry.
        (Some((_, iv)), None) | (None, Some((_, iv))) => Some(iv),
        (None, None) => None,
    }
}
