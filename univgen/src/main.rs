// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Universe-generator binary: argument/config layer and dependency wiring.

use additional_fields_service::AdditionalFieldsService;
use chain_discovery::{ChainDiscovery, FuturesExpiryDictionary};
use clap::Parser;
use core_types::config::{deployment_date, AppConfig};
use core_types::symbol::{Resolution, SecurityType, Symbol};
use greeks_engine::{GreeksConfig, PricingModel};
use history_gateway::{FsHistoryProvider, HistoryGateway, HistoryProvider, OnlineIndexProvider};
use log::{error, info};
use market_hours::ExchangeCalendar;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use universe_generator::{ChainSource, UniverseGenerator};

#[derive(Parser, Debug)]
#[command(name = "univgen")]
#[command(about = "Generates per-underlying derivative universe files")]
struct Args {
    /// Security class to process (Equity, Index, Future, Option,
    /// IndexOption, FutureOption).
    #[arg(long)]
    security_type: Option<String>,

    /// Market code, e.g. "usa".
    #[arg(long)]
    market: Option<String>,

    /// Archive root override.
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Output root override.
    #[arg(long)]
    output_folder: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum MainError {
    #[error("invalid security type: {0}")]
    SecurityType(String),
    #[error("generation failed")]
    GenerationFailed,
    #[error("additional fields pass failed: {0}")]
    AdditionalFields(#[from] additional_fields_service::PassError),
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    let code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            error!("{err}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<(), MainError> {
    let mut cfg = AppConfig::load().unwrap_or_else(|err| {
        info!("no usable config file, using defaults: {err}");
        AppConfig::default()
    });
    if let Some(security_type) = args.security_type {
        cfg.security_type = Some(security_type);
    }
    if let Some(market) = args.market {
        cfg.market = market;
    }
    if let Some(data_folder) = args.data_folder {
        cfg.data_folder = data_folder;
    }
    if let Some(output_folder) = args.output_folder {
        cfg.output_folder = output_folder;
    }

    let security_type = match cfg.security_type.as_deref() {
        Some(raw) => SecurityType::from_str(raw)
            .map_err(|_| MainError::SecurityType(raw.to_string()))?,
        None => SecurityType::EquityOption,
    };
    let date = deployment_date();
    info!(
        "generating {security_type:?}/{} universes for {date}",
        cfg.market
    );

    let calendar = Arc::new(ExchangeCalendar::for_market(&cfg.market, security_type));
    let secondary = cfg
        .index_history_url
        .as_deref()
        .map(|url| Arc::new(OnlineIndexProvider::new(url)) as Arc<dyn HistoryProvider>);
    let history = Arc::new(HistoryGateway::new(
        Arc::new(FsHistoryProvider::new(&cfg.data_folder)),
        secondary,
        vec![Resolution::Daily],
        calendar,
        cfg.history_bar_count,
    ));

    let symbol_filter = cfg.symbol_filter();
    let chain_source = match security_type {
        SecurityType::Future => {
            let roots = symbol_filter
                .clone()
                .map(|set| set.into_iter().collect::<Vec<_>>())
                .unwrap_or_else(|| vec!["ES".to_string()]);
            ChainSource::Delegated {
                provider: Arc::new(FuturesExpiryDictionary::default()),
                canonicals: roots
                    .into_iter()
                    .map(|root| Symbol::canonical(SecurityType::Future, root, cfg.market.clone()))
                    .collect(),
            }
        }
        _ => ChainSource::Archive(ChainDiscovery::new(
            &cfg.data_folder,
            security_type,
            cfg.market.clone(),
            cfg.resolutions(),
        )),
    };

    let generator = UniverseGenerator::new(
        security_type,
        cfg.market.clone(),
        &cfg.output_folder,
        chain_source,
        history,
        GreeksConfig {
            risk_free_rate: cfg.risk_free_rate,
            dividend_yield: cfg.dividend_yield,
            pricing_model: PricingModel::ForwardTree,
            tree_steps: 200,
        },
        symbol_filter,
        UniverseGenerator::default_pool_size(),
        cfg.eta_log_interval,
    );
    if !generator.run(date).await {
        return Err(MainError::GenerationFailed);
    }

    if security_type.has_greeks() {
        let universes = cfg
            .output_folder
            .join(security_type.dir_name())
            .join(&cfg.market)
            .join("universes");
        let rewritten = AdditionalFieldsService::new(universes).run(date)?;
        info!("additional fields appended to {rewritten} universe files");
    }
    Ok(())
}
