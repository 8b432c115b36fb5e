//! The named prior tree and its vector mapping operations.

use indexmap::IndexMap;
use nlf_core::{ErrorInfo, FitError};
use serde::{Deserialize, Serialize};

use crate::instance::Instance;
use crate::prior::Prior;
use crate::ParamPath;

/// One entry of a [`Model`]: either a leaf prior or a nested sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", content = "spec", rename_all = "kebab-case")]
pub enum ModelNode {
    /// A single free parameter drawn from a prior.
    Prior(Prior),
    /// A nested sub-model with its own named components.
    Model(Model),
}

/// A named tree of priors describing the free-parameter space of a fit.
///
/// Components keep their declaration order. Free parameters are traversed
/// depth-first over sub-models, components in declaration order, and every
/// positional operation (`instance_from_unit_vector`, the identifier hash,
/// the samples store) relies on that single traversal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    components: IndexMap<String, ModelNode>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a leaf prior component. Replacement keeps the
    /// original declaration position.
    pub fn insert_prior(&mut self, name: impl Into<String>, prior: Prior) {
        self.components.insert(name.into(), ModelNode::Prior(prior));
    }

    /// Adds or replaces a nested sub-model component.
    pub fn insert_model(&mut self, name: impl Into<String>, model: Model) {
        self.components.insert(name.into(), ModelNode::Model(model));
    }

    /// Returns the named component, if present.
    pub fn component(&self, name: &str) -> Option<&ModelNode> {
        self.components.get(name)
    }

    /// Iterates over components in declaration order.
    pub fn components(&self) -> impl Iterator<Item = (&String, &ModelNode)> {
        self.components.iter()
    }

    /// Names of the root components, used as the model class label in the
    /// registry (for example `"gaussian"` or `"gaussian+exponential"`).
    pub fn class_label(&self) -> String {
        self.components
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Dotted paths of all free parameters in traversal order.
    pub fn paths(&self) -> Vec<ParamPath> {
        self.priors().into_iter().map(|(path, _)| path).collect()
    }

    /// `(path, prior)` pairs for all free parameters in traversal order.
    pub fn priors(&self) -> Vec<(ParamPath, Prior)> {
        let mut out = Vec::new();
        collect_priors("", self, &mut out);
        out
    }

    /// Total number of free parameters (N).
    pub fn prior_count(&self) -> usize {
        self.priors().len()
    }

    /// Validates every prior and rejects models without free parameters.
    pub fn validate(&self) -> Result<(), FitError> {
        let priors = self.priors();
        if priors.is_empty() {
            return Err(FitError::Configuration(ErrorInfo::new(
                "model-empty",
                "model declares no free parameters",
            )));
        }
        for (path, prior) in &priors {
            prior.validate().map_err(|err| {
                FitError::Configuration(
                    err.info().clone().with_context("path", path.clone()),
                )
            })?;
        }
        Ok(())
    }

    /// Maps a unit vector onto physical parameter values in traversal order.
    pub fn physical_from_unit_vector(&self, units: &[f64]) -> Result<Vec<f64>, FitError> {
        let priors = self.priors();
        check_dimension(priors.len(), units.len())?;
        priors
            .iter()
            .zip(units)
            .map(|((path, prior), unit)| {
                prior.value_for(*unit).map_err(|err| {
                    FitError::Configuration(
                        err.info().clone().with_context("path", path.clone()),
                    )
                })
            })
            .collect()
    }

    /// Builds a concrete [`Instance`] from a unit vector.
    pub fn instance_from_unit_vector(&self, units: &[f64]) -> Result<Instance, FitError> {
        let physical = self.physical_from_unit_vector(units)?;
        self.instance_from_physical_vector(&physical)
    }

    /// Builds a concrete [`Instance`] from already-physical parameter values.
    pub fn instance_from_physical_vector(&self, values: &[f64]) -> Result<Instance, FitError> {
        check_dimension(self.prior_count(), values.len())?;
        let mut iter = values.iter();
        Ok(build_instance(self, &mut iter))
    }

    /// Checks that `other` describes the same parameter space: identical
    /// paths in identical order with identical prior kinds and bounds.
    ///
    /// Used by the search driver to validate a stored model before resuming;
    /// the error names the first conflicting path.
    pub fn structural_match(&self, other: &Model) -> Result<(), FitError> {
        let ours = self.priors();
        let theirs = other.priors();
        if ours.len() != theirs.len() {
            return Err(FitError::ResumeConflict(
                ErrorInfo::new("model-dimension", "stored model has a different parameter count")
                    .with_context("live", ours.len().to_string())
                    .with_context("stored", theirs.len().to_string()),
            ));
        }
        for ((path_a, prior_a), (path_b, prior_b)) in ours.iter().zip(theirs.iter()) {
            if path_a != path_b {
                return Err(FitError::ResumeConflict(
                    ErrorInfo::new("model-paths", "stored model paths diverge")
                        .with_context("live", path_a.clone())
                        .with_context("stored", path_b.clone()),
                ));
            }
            if prior_a != prior_b {
                return Err(FitError::ResumeConflict(
                    ErrorInfo::new("model-priors", "stored prior differs for parameter")
                        .with_context("path", path_a.clone())
                        .with_context("live", prior_a.bounds_description())
                        .with_context("stored", prior_b.bounds_description()),
                ));
            }
        }
        Ok(())
    }

    /// Human-readable listing of every parameter path, prior kind, and
    /// bounds, written to `model.info` at the start of a fit.
    pub fn info(&self) -> String {
        let priors = self.priors();
        let mut out = format!("Model with {} free parameters\n\n", priors.len());
        for (path, prior) in priors {
            out.push_str(&format!(
                "{:<40} {:<12} {}\n",
                path,
                prior.kind(),
                prior.bounds_description()
            ));
        }
        out
    }
}

fn collect_priors(prefix: &str, model: &Model, out: &mut Vec<(ParamPath, Prior)>) {
    for (name, node) in &model.components {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match node {
            ModelNode::Prior(prior) => out.push((path, prior.clone())),
            ModelNode::Model(sub) => collect_priors(&path, sub, out),
        }
    }
}

fn build_instance(model: &Model, values: &mut std::slice::Iter<'_, f64>) -> Instance {
    let mut instance = Instance::new();
    for (name, node) in &model.components {
        match node {
            ModelNode::Prior(_) => {
                // Length was checked up front; the iterator cannot run dry.
                let value = values.next().copied().unwrap_or_default();
                instance.insert_value(name.clone(), value);
            }
            ModelNode::Model(sub) => {
                instance.insert_instance(name.clone(), build_instance(sub, values));
            }
        }
    }
    instance
}

fn check_dimension(expected: usize, got: usize) -> Result<(), FitError> {
    if expected != got {
        return Err(FitError::Dimension(
            ErrorInfo::new("vector-length", "parameter vector length does not match model")
                .with_context("expected", expected.to_string())
                .with_context("got", got.to_string()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_model() -> Model {
        let mut gaussian = Model::new();
        gaussian.insert_prior(
            "centre",
            Prior::Uniform {
                lower: 0.0,
                upper: 100.0,
            },
        );
        gaussian.insert_prior(
            "intensity",
            Prior::LogUniform {
                lower: 1e-2,
                upper: 1e2,
            },
        );
        gaussian.insert_prior(
            "sigma",
            Prior::Uniform {
                lower: 0.0,
                upper: 30.0,
            },
        );
        let mut model = Model::new();
        model.insert_model("gaussian", gaussian);
        model
    }

    #[test]
    fn paths_follow_declaration_order_depth_first() {
        let model = gaussian_model();
        assert_eq!(
            model.paths(),
            vec!["gaussian.centre", "gaussian.intensity", "gaussian.sigma"]
        );
        assert_eq!(model.prior_count(), 3);
    }

    #[test]
    fn instance_resolves_values_by_path() {
        let model = gaussian_model();
        let instance = model
            .instance_from_unit_vector(&[0.5, 0.5, 0.5])
            .unwrap();
        assert_eq!(instance.value_at("gaussian.centre"), Some(50.0));
        assert_eq!(instance.value_at("gaussian.sigma"), Some(15.0));
        assert!(instance.value_at("gaussian.missing").is_none());
    }

    #[test]
    fn wrong_length_vector_is_a_dimension_error() {
        let model = gaussian_model();
        for bad in [vec![], vec![0.5], vec![0.5; 4]] {
            assert!(matches!(
                model.instance_from_unit_vector(&bad),
                Err(FitError::Dimension(_))
            ));
        }
    }

    #[test]
    fn empty_model_fails_validation() {
        let model = Model::new();
        assert!(matches!(
            model.validate(),
            Err(FitError::Configuration(_))
        ));
    }

    #[test]
    fn structural_match_reports_first_conflicting_path() {
        let live = gaussian_model();
        let mut stored = gaussian_model();
        stored.insert_prior(
            "extra",
            Prior::Uniform {
                lower: 0.0,
                upper: 1.0,
            },
        );
        let err = live.structural_match(&stored).unwrap_err();
        assert!(matches!(err, FitError::ResumeConflict(_)));

        let mut altered = gaussian_model();
        altered.insert_model("gaussian", {
            let mut g = Model::new();
            g.insert_prior(
                "centre",
                Prior::Uniform {
                    lower: 0.0,
                    upper: 50.0,
                },
            );
            g.insert_prior(
                "intensity",
                Prior::LogUniform {
                    lower: 1e-2,
                    upper: 1e2,
                },
            );
            g.insert_prior(
                "sigma",
                Prior::Uniform {
                    lower: 0.0,
                    upper: 30.0,
                },
            );
            g
        });
        let err = live.structural_match(&altered).unwrap_err();
        assert_eq!(err.info().context.get("path").unwrap(), "gaussian.centre");
    }

    #[test]
    fn equal_models_compare_equal() {
        assert_eq!(gaussian_model(), gaussian_model());

        let mut widened = gaussian_model();
        widened.insert_prior(
            "offset",
            Prior::Uniform {
                lower: 0.0,
                upper: 1.0,
            },
        );
        assert_ne!(gaussian_model(), widened);
    }

    #[test]
    fn class_label_joins_root_components() {
        let model = gaussian_model();
        assert_eq!(model.class_label(), "gaussian");
    }

    #[test]
    fn info_lists_every_parameter() {
        let info = gaussian_model().info();
        assert!(info.contains("gaussian.centre"));
        assert!(info.contains("log-uniform"));
        assert!(info.contains("3 free parameters"));
    }
}
