//! Post-pass that rebuilds missing IVs from the fitted surface and
//! recomputes greeks at the repaired volatility.

use crate::{IvSurface, SurfacePoint, MIN_SAMPLES};
use chrono::NaiveDate;
use core_types::data::{QuoteBar, Slice, TradeBar};
use core_types::entry::{OptionEntry, UniverseEntry};
use greeks_engine::{theoretical_price, time_till_expiry, GreeksBundle, GreeksConfig};
use log::{error, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct RepairOutcome {
    pub repaired: usize,
    pub failed: usize,
    /// True when the fit itself was unavailable and nothing was attempted.
    pub skipped: bool,
}

/// Fit the surface on entries with valid IV and repair the rest in place.
/// Individual root-find failures leave that contract's IV missing.
pub fn repair_missing_ivs(
    entries: &mut [OptionEntry],
    spot: f64,
    reference: NaiveDate,
    cfg: &GreeksConfig,
) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();
    let points: Vec<SurfacePoint> = entries
        .iter()
        .filter(|e| !e.iv_is_missing())
        .filter_map(|e| {
            let strike = e.symbol().strike()?;
            let expiry = e.symbol().expiry()?;
            Some(SurfacePoint {
                strike,
                expiry,
                iv: e.implied_volatility.unwrap_or(0.0),
            })
        })
        .collect();

    if points.len() == entries.len() {
        return outcome;
    }
    if points.len() < MIN_SAMPLES {
        error!(
            "iv repair unavailable: {} valid contracts of {} (need {})",
            points.len(),
            entries.len(),
            MIN_SAMPLES
        );
        outcome.skipped = true;
        return outcome;
    }
    let surface = match IvSurface::fit(&points, spot, reference) {
        Ok(surface) => surface,
        Err(err) => {
            error!("iv surface fit failed: {err}");
            outcome.skipped = true;
            return outcome;
        }
    };

    for entry in entries.iter_mut().filter(|e| e.iv_is_missing()) {
        let symbol = entry.symbol().clone();
        let (Some(strike), Some(expiry)) = (symbol.strike(), symbol.expiry()) else {
            continue;
        };
        let repaired = match surface.interpolate(strike, expiry) {
            Ok(iv) => iv,
            Err(err) => {
                warn!("iv repair failed for {}: {err}", symbol.id());
                outcome.failed += 1;
                continue;
            }
        };
        match recompute_greeks(&symbol, spot, strike, expiry, reference, repaired, cfg) {
            Some((slice_a, slice_b)) => {
                let Ok(mut bundle) = GreeksBundle::new(symbol.clone(), reference, cfg.clone())
                else {
                    outcome.failed += 1;
                    continue;
                };
                bundle.update(&slice_a);
                bundle.update(&slice_b);
                entry.set_implied_volatility(Some(repaired));
                entry.set_greeks(bundle.greeks());
                outcome.repaired += 1;
            }
            None => {
                warn!(
                    "no theoretical price for {} at repaired iv {repaired}",
                    symbol.id()
                );
                outcome.failed += 1;
            }
        }
    }
    outcome
}

/// Two synthetic bars seeding a fresh bundle: the underlying close, then the
/// model price of the contract at the repaired volatility.
fn recompute_greeks(
    symbol: &core_types::symbol::Symbol,
    spot: f64,
    strike: f64,
    expiry: NaiveDate,
    reference: NaiveDate,
    iv: f64,
    cfg: &GreeksConfig,
) -> Option<(Slice, Slice)> {
    let spec = symbol.option_spec()?;
    let tau = time_till_expiry(expiry, reference);
    let theo = theoretical_price(cfg, spec.right, spec.style, spot, strike, tau, iv)?;
    if !(theo.is_finite() && theo > 0.0) {
        return None;
    }
    let underlying = symbol.underlying()?;
    let t0 = reference.and_hms_opt(0, 0, 0)?;
    let t1 = reference.and_hms_opt(0, 1, 0)?;

    let mut slice_a = Slice::new(t0);
    slice_a.bars.insert(
        underlying.clone(),
        TradeBar {
            symbol: underlying,
            time: t0,
            open: spot,
            high: spot,
            low: spot,
            close: spot,
            volume: 0.0,
        },
    );
    let mut slice_b = Slice::new(t1);
    slice_b.quotes.insert(
        symbol.clone(),
        QuoteBar {
            symbol: symbol.clone(),
            time: t1,
            open: theo,
            high: theo,
            low: theo,
            close: theo,
        },
    );
    Some((slice_a, slice_b))
}
