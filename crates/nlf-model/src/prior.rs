//! Leaf prior distributions over the unit interval.

use nlf_core::{ErrorInfo, FitError};
use serde::{Deserialize, Serialize};

const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// A prior distribution mapping a unit-interval value to a physical value.
///
/// The mapping is deterministic and monotonically increasing in `unit` for
/// every kind. Priors are immutable once composed into a model; their kind
/// and bounds are part of the fit identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Prior {
    /// Uniform density between two finite bounds.
    Uniform {
        /// Lower bound of the support.
        lower: f64,
        /// Upper bound of the support.
        upper: f64,
    },
    /// Uniform density in log space between two finite positive bounds.
    LogUniform {
        /// Lower bound of the support, strictly positive.
        lower: f64,
        /// Upper bound of the support.
        upper: f64,
    },
    /// Gaussian density, optionally truncated to `[lower, upper]`.
    Gaussian {
        /// Mean of the untruncated density.
        mean: f64,
        /// Standard deviation, strictly positive.
        sigma: f64,
        /// Optional lower truncation bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower: Option<f64>,
        /// Optional upper truncation bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<f64>,
    },
}

impl Prior {
    /// Returns the stable name of the prior kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Prior::Uniform { .. } => "uniform",
            Prior::LogUniform { .. } => "log-uniform",
            Prior::Gaussian { .. } => "gaussian",
        }
    }

    /// Checks the declared bounds for consistency.
    pub fn validate(&self) -> Result<(), FitError> {
        match self {
            Prior::Uniform { lower, upper } => {
                if !lower.is_finite() || !upper.is_finite() || lower >= upper {
                    return Err(bounds_error("uniform", *lower, *upper));
                }
            }
            Prior::LogUniform { lower, upper } => {
                if !lower.is_finite() || !upper.is_finite() || *lower <= 0.0 || lower >= upper {
                    return Err(bounds_error("log-uniform", *lower, *upper));
                }
            }
            Prior::Gaussian {
                mean,
                sigma,
                lower,
                upper,
            } => {
                if !mean.is_finite() || !sigma.is_finite() || *sigma <= 0.0 {
                    return Err(FitError::Configuration(
                        ErrorInfo::new("prior-shape", "gaussian prior requires finite mean and positive sigma")
                            .with_context("mean", mean.to_string())
                            .with_context("sigma", sigma.to_string()),
                    ));
                }
                if let (Some(lo), Some(hi)) = (lower, upper) {
                    if lo >= hi {
                        return Err(bounds_error("gaussian", *lo, *hi));
                    }
                }
                if lower.map_or(false, |lo| lo.is_nan()) || upper.map_or(false, |hi| hi.is_nan()) {
                    return Err(bounds_error(
                        "gaussian",
                        lower.unwrap_or(f64::NEG_INFINITY),
                        upper.unwrap_or(f64::INFINITY),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Maps a unit-interval value onto the physical support of the prior.
    ///
    /// Fails with a configuration error when `unit` lies outside `[0, 1]` or
    /// the declared bounds are inconsistent.
    pub fn value_for(&self, unit: f64) -> Result<f64, FitError> {
        if !(0.0..=1.0).contains(&unit) {
            return Err(FitError::Configuration(
                ErrorInfo::new("unit-out-of-range", "unit value must lie in [0, 1]")
                    .with_context("unit", unit.to_string())
                    .with_context("kind", self.kind()),
            ));
        }
        self.validate()?;
        let value = match self {
            Prior::Uniform { lower, upper } => lower + unit * (upper - lower),
            Prior::LogUniform { lower, upper } => {
                (lower.ln() + unit * (upper.ln() - lower.ln())).exp()
            }
            Prior::Gaussian {
                mean,
                sigma,
                lower,
                upper,
            } => {
                let lo_cdf = lower.map_or(0.0, |lo| normal_cdf((lo - mean) / sigma));
                let hi_cdf = upper.map_or(1.0, |hi| normal_cdf((hi - mean) / sigma));
                // Clamped away from 0 and 1 so unbounded supports still map
                // the unit endpoints to finite values.
                let p = (lo_cdf + unit * (hi_cdf - lo_cdf))
                    .clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON / 2.0);
                mean + sigma * inverse_normal_cdf(p)
            }
        };
        Ok(value)
    }

    /// Human-readable description of the bounds, used in `model.info`.
    pub fn bounds_description(&self) -> String {
        match self {
            Prior::Uniform { lower, upper } | Prior::LogUniform { lower, upper } => {
                format!("[{lower}, {upper}]")
            }
            Prior::Gaussian {
                mean,
                sigma,
                lower,
                upper,
            } => {
                let lo = lower.map_or("-inf".to_string(), |v| v.to_string());
                let hi = upper.map_or("inf".to_string(), |v| v.to_string());
                format!("mean={mean}, sigma={sigma}, bounds=[{lo}, {hi}]")
            }
        }
    }
}

fn bounds_error(kind: &str, lower: f64, upper: f64) -> FitError {
    FitError::Configuration(
        ErrorInfo::new("prior-bounds", "prior bounds are inverted or not finite")
            .with_context("kind", kind)
            .with_context("lower", lower.to_string())
            .with_context("upper", upper.to_string()),
    )
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x / SQRT_2)
}

/// Inverse of the standard normal CDF.
///
/// Acklam's rational approximation refined with a single Halley step against
/// `erfc`, giving full double precision over the open unit interval.
fn inverse_normal_cdf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p > 1.0 - P_LOW {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    };

    // One Halley refinement step. Skipped when the correction overflows in
    // the far tails, where the rational approximation already saturates.
    let e = normal_cdf(x) - p;
    let u = e * (std::f64::consts::TAU).sqrt() * (x * x / 2.0).exp();
    if !u.is_finite() {
        return x;
    }
    x - u / (1.0 + x * u / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_maps_endpoints_and_midpoint() {
        let prior = Prior::Uniform {
            lower: 10.0,
            upper: 30.0,
        };
        assert_eq!(prior.value_for(0.0).unwrap(), 10.0);
        assert_eq!(prior.value_for(1.0).unwrap(), 30.0);
        assert_eq!(prior.value_for(0.5).unwrap(), 20.0);
    }

    #[test]
    fn log_uniform_midpoint_is_geometric_mean() {
        let prior = Prior::LogUniform {
            lower: 1e-2,
            upper: 1e2,
        };
        let mid = prior.value_for(0.5).unwrap();
        assert!((mid - 1.0).abs() < 1e-12);
    }

    #[test]
    fn gaussian_median_is_the_mean() {
        let prior = Prior::Gaussian {
            mean: 10.0,
            sigma: 5.0,
            lower: None,
            upper: None,
        };
        let mid = prior.value_for(0.5).unwrap();
        assert!((mid - 10.0).abs() < 1e-9);
    }

    #[test]
    fn truncated_gaussian_respects_bounds() {
        let prior = Prior::Gaussian {
            mean: 0.0,
            sigma: 1.0,
            lower: Some(0.0),
            upper: Some(2.0),
        };
        for unit in [0.0, 0.01, 0.5, 0.99, 1.0] {
            let value = prior.value_for(unit).unwrap();
            assert!((0.0..=2.0).contains(&value), "value {value} out of bounds");
        }
    }

    #[test]
    fn gaussian_endpoints_stay_finite() {
        let prior = Prior::Gaussian {
            mean: 0.0,
            sigma: 1.0,
            lower: None,
            upper: None,
        };
        let low = prior.value_for(0.0).unwrap();
        let high = prior.value_for(1.0).unwrap();
        assert!(low.is_finite() && low < -8.0);
        assert!(high.is_finite() && high > 8.0);
    }

    #[test]
    fn unit_outside_interval_is_rejected() {
        let prior = Prior::Uniform {
            lower: 0.0,
            upper: 1.0,
        };
        assert!(matches!(
            prior.value_for(-0.1),
            Err(FitError::Configuration(_))
        ));
        assert!(matches!(
            prior.value_for(1.1),
            Err(FitError::Configuration(_))
        ));
    }

    #[test]
    fn inverted_bounds_are_rejected_at_evaluation() {
        let prior = Prior::Uniform {
            lower: 5.0,
            upper: 1.0,
        };
        assert!(matches!(
            prior.value_for(0.5),
            Err(FitError::Configuration(_))
        ));
    }

    #[test]
    fn log_uniform_requires_positive_bounds() {
        let prior = Prior::LogUniform {
            lower: 0.0,
            upper: 10.0,
        };
        assert!(prior.validate().is_err());
    }

    #[test]
    fn inverse_normal_cdf_matches_known_quantiles() {
        // Standard normal 97.5% quantile.
        assert!((inverse_normal_cdf(0.975) - 1.959963984540054).abs() < 1e-9);
        assert!((inverse_normal_cdf(0.5)).abs() < 1e-12);
        assert!((inverse_normal_cdf(0.025) + 1.959963984540054).abs() < 1e-9);
    }
}
