//! Quadratic implied-volatility surface used to repair contracts whose
//! streaming IV solve came up empty.
//!
//! The regression is `iv ~ 1 + m + tau + m^2 + tau^2 + m*tau` where `m` is a
//! volatility-scaled log-moneyness. Because `m` depends on the IV being
//! predicted, a query is the fixed point of `v = predict(m(v), tau, ...)`,
//! found with Brent's method on the IV domain.

mod repair;

pub use repair::{repair_missing_ivs, RepairOutcome};

use chrono::NaiveDate;
use greeks_engine::time_till_expiry;
use nalgebra::{DMatrix, DVector};
use roots::{find_root_brent, SimpleConvergency};
use thiserror::Error;

/// Fewest valid-IV contracts the fit will accept.
pub const MIN_SAMPLES: usize = 6;
const IV_LOWER: f64 = 1e-7;
const IV_UPPER: f64 = 4.0;
const BRENT_EPS: f64 = 1e-4;
const BRENT_MAX_ITERS: usize = 100;

/// Volatility-scaled log-moneyness `ln(K/S) / (iv * sqrt(tau))`.
///
/// The edge cases fall out of IEEE arithmetic: zero strike gives -inf, zero
/// tau or zero vol gives a signed infinity, negative strike or negative tau
/// gives NaN.
pub fn moneyness(strike: f64, expiry: NaiveDate, reference: NaiveDate, spot: f64, iv: f64) -> f64 {
    let tau = time_till_expiry(expiry, reference);
    (strike / spot).ln() / (iv * tau.sqrt())
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("{valid} valid-IV contracts, need at least {MIN_SAMPLES}")]
    TooFewSamples { valid: usize },
    #[error("normal equations are singular")]
    SingularFit,
    #[error("root search failed for strike {strike} expiry {expiry}: {reason}")]
    RootNotFound {
        strike: f64,
        expiry: NaiveDate,
        reason: String,
    },
}

/// One observed contract feeding the fit.
#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint {
    pub strike: f64,
    pub expiry: NaiveDate,
    pub iv: f64,
}

/// Fitted quadratic surface for one underlying on one processing date.
pub struct IvSurface {
    beta: [f64; 6],
    spot: f64,
    reference: NaiveDate,
}

impl IvSurface {
    /// Ordinary least squares over the valid points. Points with
    /// non-finite regressors (degenerate strikes or expiries) are dropped
    /// before the sample-count check.
    pub fn fit(
        points: &[SurfacePoint],
        spot: f64,
        reference: NaiveDate,
    ) -> Result<Self, SurfaceError> {
        let samples: Vec<([f64; 6], f64)> = points
            .iter()
            .filter(|p| p.iv.is_finite() && p.iv > 0.0)
            .filter_map(|p| {
                let x = regressors(p.strike, p.expiry, reference, spot, p.iv);
                x.iter().all(|v| v.is_finite()).then_some((x, p.iv))
            })
            .collect();
        if samples.len() < MIN_SAMPLES {
            return Err(SurfaceError::TooFewSamples {
                valid: samples.len(),
            });
        }

        let n = samples.len();
        let mut a = DMatrix::zeros(n, 6);
        for (i, (row, _)) in samples.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                a[(i, j)] = *v;
            }
        }
        let y = DVector::from_iterator(n, samples.iter().map(|(_, iv)| *iv));
        let at = a.transpose();
        let ata = &at * &a;
        let aty = at * y;
        let beta = ata.lu().solve(&aty).ok_or(SurfaceError::SingularFit)?;
        Ok(Self {
            beta: [beta[0], beta[1], beta[2], beta[3], beta[4], beta[5]],
            spot,
            reference,
        })
    }

    fn predict(&self, m: f64, tau: f64) -> f64 {
        let b = &self.beta;
        b[0] + b[1] * m + b[2] * tau + b[3] * m * m + b[4] * tau * tau + b[5] * m * tau
    }

    /// Repaired IV for a missing contract: the volatility at which the
    /// surface's own prediction agrees with the moneyness input.
    pub fn interpolate(&self, strike: f64, expiry: NaiveDate) -> Result<f64, SurfaceError> {
        let tau = time_till_expiry(expiry, self.reference);
        let f = |v: f64| {
            let m = moneyness(strike, expiry, self.reference, self.spot, v);
            v - self.predict(m, tau)
        };
        let mut convergency = SimpleConvergency {
            eps: BRENT_EPS,
            max_iter: BRENT_MAX_ITERS,
        };
        find_root_brent(IV_LOWER, IV_UPPER, &f, &mut convergency).map_err(|err| {
            SurfaceError::RootNotFound {
                strike,
                expiry,
                reason: format!("{err:?}"),
            }
        })
    }
}

fn regressors(strike: f64, expiry: NaiveDate, reference: NaiveDate, spot: f64, iv: f64) -> [f64; 6] {
    let m = moneyness(strike, expiry, reference, spot, iv);
    let tau = time_till_expiry(expiry, reference);
    [1.0, m, tau, m * m, tau * tau, m * tau]
}
