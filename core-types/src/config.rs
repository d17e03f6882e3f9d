// Copyright (c) James Kassemi, SC, US. All rights reserved.

use crate::symbol::{Resolution, SecurityType};
use chrono::{NaiveDate, Utc};
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

/// Name of the environment variable carrying the processing date.
pub const DEPLOYMENT_DATE_VAR: &str = "QC_DATAFLEET_DEPLOYMENT_DATE";

/// Generator settings, layered file + environment. CLI flags override the
/// `security_type`/`market` keys after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub security_type: Option<String>,
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    /// JSON string array restricting which underlyings are processed.
    #[serde(default)]
    pub symbols: Option<String>,
    /// Resolution preference for the chain scan, finest first.
    #[serde(default)]
    pub symbol_source_resolutions: Option<Vec<String>>,
    #[serde(default = "default_history_bar_count")]
    pub history_bar_count: usize,
    #[serde(default = "default_eta_log_interval")]
    pub eta_log_interval: usize,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub dividend_yield: f64,
    /// Base URL of the online daily-bar archive used as the secondary
    /// history source for index underlyings.
    #[serde(default)]
    pub index_history_url: Option<String>,
}

fn default_market() -> String {
    "usa".to_string()
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("output")
}

fn default_history_bar_count() -> usize {
    5
}

fn default_eta_log_interval() -> usize {
    1000
}

fn default_risk_free_rate() -> f64 {
    0.0433
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            security_type: None,
            market: default_market(),
            data_folder: default_data_folder(),
            output_folder: default_output_folder(),
            symbols: None,
            symbol_source_resolutions: None,
            history_bar_count: default_history_bar_count(),
            eta_log_interval: default_eta_log_interval(),
            risk_free_rate: default_risk_free_rate(),
            dividend_yield: 0.0,
            index_history_url: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("univgen").required(false))
            .add_source(config::Environment::with_prefix("UNIVGEN"))
            .build()?;
        settings.try_deserialize()
    }

    pub fn security_type(&self) -> Option<Result<SecurityType, String>> {
        self.security_type
            .as_deref()
            .map(|s| SecurityType::from_str(s).map_err(|e| e.to_string()))
    }

    /// Parsed `symbols` restriction, upper-cased. None means all.
    pub fn symbol_filter(&self) -> Option<HashSet<String>> {
        let raw = self.symbols.as_deref()?;
        let tickers: Vec<String> = serde_json::from_str(raw).ok()?;
        Some(
            tickers
                .into_iter()
                .map(|t| t.to_ascii_uppercase())
                .collect(),
        )
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.symbol_source_resolutions
            .as_ref()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| Resolution::from_str(n).ok())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![Resolution::Minute])
    }
}

/// Processing date: `QC_DATAFLEET_DEPLOYMENT_DATE=YYYYMMDD`, else today UTC.
pub fn deployment_date() -> NaiveDate {
    std::env::var(DEPLOYMENT_DATE_VAR)
        .ok()
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y%m%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_filter_parses_json_array() {
        let cfg = AppConfig {
            symbols: Some(r#"["spy", "QQQ"]"#.to_string()),
            ..Default::default()
        };
        let filter = cfg.symbol_filter().unwrap();
        assert!(filter.contains("SPY"));
        assert!(filter.contains("QQQ"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn malformed_symbol_filter_means_no_restriction() {
        let cfg = AppConfig {
            symbols: Some("not-json".to_string()),
            ..Default::default()
        };
        assert!(cfg.symbol_filter().is_none());
    }

    #[test]
    fn resolution_list_defaults_to_minute() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.resolutions(), vec![Resolution::Minute]);
        let cfg = AppConfig {
            symbol_source_resolutions: Some(vec!["Hour".into(), "Daily".into()]),
            ..Default::default()
        };
        assert_eq!(cfg.resolutions(), vec![Resolution::Hour, Resolution::Daily]);
    }
}
