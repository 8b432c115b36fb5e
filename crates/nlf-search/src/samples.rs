//! Weighted posterior samples and their summaries.

use nlf_core::{ErrorInfo, FitError};
use nlf_model::{Instance, Model};
use serde::{Deserialize, Serialize};

/// One accepted draw: unit coordinates, physical parameters, log likelihood,
/// and importance weight.
///
/// `unit` and `params` are finite by construction (`SampleSet::append`
/// enforces it), so they serialize through plain JSON numbers; only
/// `log_likelihood` needs the non-finite token encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Coordinates in unit hypercube space.
    pub unit: Vec<f64>,
    /// Physical parameter values in model traversal order.
    pub params: Vec<f64>,
    /// Log likelihood of the draw. `-inf` marks an impossible instance.
    #[serde(with = "crate::json_float::float")]
    pub log_likelihood: f64,
    /// Importance weight assigned by the backend.
    pub weight: f64,
}

/// Append-only store of weighted samples for one fit.
///
/// Order of appends is the canonical sample order: summaries that break ties
/// (such as the maximum likelihood sample) resolve them toward the earliest
/// sample, so a resumed run reports the same winner as an uninterrupted one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    dim: usize,
    samples: Vec<Sample>,
}

impl SampleSet {
    /// Creates an empty store for `dim`-dimensional samples.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            samples: Vec::new(),
        }
    }

    /// Dimensionality every stored vector must have.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the store holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Stored samples in append order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Appends a sample, rejecting wrong-length vectors, non-finite
    /// coordinates, and malformed weights. NaN log likelihoods are
    /// rejected; `-inf` is allowed.
    pub fn append(&mut self, sample: Sample) -> Result<(), FitError> {
        if sample.unit.len() != self.dim || sample.params.len() != self.dim {
            return Err(FitError::Dimension(
                ErrorInfo::new("sample-length", "sample vector length does not match store")
                    .with_context("expected", self.dim.to_string())
                    .with_context("unit", sample.unit.len().to_string())
                    .with_context("params", sample.params.len().to_string()),
            ));
        }
        if sample
            .unit
            .iter()
            .chain(&sample.params)
            .any(|v| !v.is_finite())
        {
            return Err(FitError::Configuration(ErrorInfo::new(
                "sample-coordinates",
                "sample coordinates must be finite",
            )));
        }
        if sample.log_likelihood.is_nan() {
            return Err(FitError::Configuration(ErrorInfo::new(
                "sample-log-likelihood",
                "sample log likelihood must not be NaN",
            )));
        }
        if !sample.weight.is_finite() || sample.weight < 0.0 {
            return Err(FitError::Configuration(
                ErrorInfo::new("sample-weight", "sample weight must be finite and non-negative")
                    .with_context("weight", sample.weight.to_string()),
            ));
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Physical parameter vectors in append order.
    pub fn parameter_lists(&self) -> Vec<Vec<f64>> {
        self.samples.iter().map(|s| s.params.clone()).collect()
    }

    /// Log likelihoods in append order.
    pub fn log_likelihood_list(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.log_likelihood).collect()
    }

    /// Weights in append order.
    pub fn weight_list(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.weight).collect()
    }

    /// The sample with the highest log likelihood. Ties resolve to the
    /// earliest appended sample.
    pub fn max_log_likelihood_sample(&self) -> Result<&Sample, FitError> {
        self.samples
            .iter()
            .reduce(|best, s| {
                if s.log_likelihood > best.log_likelihood {
                    s
                } else {
                    best
                }
            })
            .ok_or_else(empty_error)
    }

    /// Model instance of the maximum likelihood sample.
    pub fn max_log_likelihood_instance(&self, model: &Model) -> Result<Instance, FitError> {
        let sample = self.max_log_likelihood_sample()?;
        model.instance_from_physical_vector(&sample.params)
    }

    /// Per-parameter weighted medians (the lower weighted median: the first
    /// value whose cumulative weight reaches half the total).
    pub fn median_pdf_vector(&self) -> Result<Vec<f64>, FitError> {
        if self.samples.is_empty() {
            return Err(empty_error());
        }
        let total: f64 = self.samples.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            return Err(FitError::Configuration(ErrorInfo::new(
                "samples-weightless",
                "all sample weights are zero",
            )));
        }
        let mut out = Vec::with_capacity(self.dim);
        for axis in 0..self.dim {
            let mut column: Vec<(f64, f64)> = self
                .samples
                .iter()
                .map(|s| (s.params[axis], s.weight))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut cumulative = 0.0;
            let mut median = column[column.len() - 1].0;
            for (value, weight) in column {
                cumulative += weight;
                if cumulative >= total / 2.0 {
                    median = value;
                    break;
                }
            }
            out.push(median);
        }
        Ok(out)
    }

    /// Model instance of the weighted median parameter vector.
    pub fn median_pdf_instance(&self, model: &Model) -> Result<Instance, FitError> {
        let median = self.median_pdf_vector()?;
        model.instance_from_physical_vector(&median)
    }

    /// Weighted covariance matrix of the physical parameters.
    pub fn covariance_matrix(&self) -> Result<Vec<Vec<f64>>, FitError> {
        if self.samples.is_empty() {
            return Err(empty_error());
        }
        let total: f64 = self.samples.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            return Err(FitError::Configuration(ErrorInfo::new(
                "samples-weightless",
                "all sample weights are zero",
            )));
        }
        let mut mean = vec![0.0; self.dim];
        for sample in &self.samples {
            for (axis, value) in sample.params.iter().enumerate() {
                mean[axis] += sample.weight * value;
            }
        }
        for value in &mut mean {
            *value /= total;
        }
        let mut cov = vec![vec![0.0; self.dim]; self.dim];
        for sample in &self.samples {
            for row in 0..self.dim {
                let dr = sample.params[row] - mean[row];
                for col in 0..self.dim {
                    let dc = sample.params[col] - mean[col];
                    cov[row][col] += sample.weight * dr * dc;
                }
            }
        }
        for row in &mut cov {
            for value in row.iter_mut() {
                *value /= total;
            }
        }
        Ok(cov)
    }
}

fn empty_error() -> FitError {
    FitError::Configuration(ErrorInfo::new(
        "samples-empty",
        "no samples have been recorded",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(samples: &[(&[f64], f64, f64)]) -> SampleSet {
        let dim = samples[0].0.len();
        let mut set = SampleSet::new(dim);
        for (params, ll, weight) in samples {
            set.append(Sample {
                unit: vec![0.5; dim],
                params: params.to_vec(),
                log_likelihood: *ll,
                weight: *weight,
            })
            .unwrap();
        }
        set
    }

    #[test]
    fn wrong_length_samples_are_rejected() {
        let mut set = SampleSet::new(2);
        let err = set
            .append(Sample {
                unit: vec![0.5],
                params: vec![1.0, 2.0],
                log_likelihood: 0.0,
                weight: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, FitError::Dimension(_)));
    }

    #[test]
    fn max_log_likelihood_ties_resolve_to_earliest() {
        let set = set_with(&[
            (&[1.0], -2.0, 1.0),
            (&[2.0], -1.0, 1.0),
            (&[3.0], -1.0, 1.0),
        ]);
        assert_eq!(set.max_log_likelihood_sample().unwrap().params, vec![2.0]);
    }

    #[test]
    fn weighted_median_takes_the_lower_median() {
        let set = set_with(&[
            (&[1.0], 0.0, 1.0),
            (&[2.0], 0.0, 1.0),
            (&[3.0], 0.0, 1.0),
            (&[4.0], 0.0, 1.0),
        ]);
        assert_eq!(set.median_pdf_vector().unwrap(), vec![2.0]);

        let weighted = set_with(&[(&[1.0], 0.0, 0.1), (&[2.0], 0.0, 5.0), (&[3.0], 0.0, 0.1)]);
        assert_eq!(weighted.median_pdf_vector().unwrap(), vec![2.0]);
    }

    #[test]
    fn covariance_of_constant_samples_is_zero() {
        let set = set_with(&[(&[2.0, 5.0], 0.0, 1.0), (&[2.0, 5.0], 0.0, 2.0)]);
        let cov = set.covariance_matrix().unwrap();
        assert_eq!(cov, vec![vec![0.0, 0.0], vec![0.0, 0.0]]);
    }

    #[test]
    fn summaries_on_empty_store_are_errors() {
        let set = SampleSet::new(1);
        assert!(set.max_log_likelihood_sample().is_err());
        assert!(set.median_pdf_vector().is_err());
        assert!(set.covariance_matrix().is_err());
    }

    #[test]
    fn json_round_trip_preserves_summaries() {
        let set = set_with(&[
            (&[1.0, 4.0], -3.0, 0.5),
            (&[2.0, 5.0], -1.0, 2.0),
            (&[3.0, 6.0], -2.0, 1.0),
        ]);
        let json = serde_json::to_vec(&set).unwrap();
        let restored: SampleSet = serde_json::from_slice(&json).unwrap();

        assert_eq!(restored, set);
        assert_eq!(
            restored.max_log_likelihood_sample().unwrap().params,
            set.max_log_likelihood_sample().unwrap().params
        );
        assert_eq!(
            restored.median_pdf_vector().unwrap(),
            set.median_pdf_vector().unwrap()
        );
        assert_eq!(
            restored.covariance_matrix().unwrap(),
            set.covariance_matrix().unwrap()
        );
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let mut set = SampleSet::new(2);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = set
                .append(Sample {
                    unit: vec![0.5, 0.5],
                    params: vec![1.0, bad],
                    log_likelihood: 0.0,
                    weight: 1.0,
                })
                .unwrap_err();
            assert_eq!(err.info().code, "sample-coordinates");
        }
        assert!(set.is_empty());
    }

    #[test]
    fn json_round_trip_is_bit_exact() {
        let mut set = SampleSet::new(1);
        for (unit, ll) in [
            (0.37289746529920365_f64, -0.1943721300935556),
            (0.1 + 0.2, -1e-300),
        ] {
            set.append(Sample {
                unit: vec![unit],
                params: vec![unit * 100.0],
                log_likelihood: ll,
                weight: 1.0,
            })
            .unwrap();
        }
        let json = serde_json::to_vec(&set).unwrap();
        let restored: SampleSet = serde_json::from_slice(&json).unwrap();
        for (restored, live) in restored.samples().iter().zip(set.samples()) {
            assert_eq!(restored.params[0].to_bits(), live.params[0].to_bits());
            assert_eq!(restored.unit[0].to_bits(), live.unit[0].to_bits());
            assert_eq!(
                restored.log_likelihood.to_bits(),
                live.log_likelihood.to_bits()
            );
        }
    }

    #[test]
    fn negative_infinity_is_storable_but_nan_is_not() {
        let mut set = SampleSet::new(1);
        set.append(Sample {
            unit: vec![0.5],
            params: vec![1.0],
            log_likelihood: f64::NEG_INFINITY,
            weight: 0.0,
        })
        .unwrap();
        assert!(set
            .append(Sample {
                unit: vec![0.5],
                params: vec![1.0],
                log_likelihood: f64::NAN,
                weight: 1.0,
            })
            .is_err());
    }
}
