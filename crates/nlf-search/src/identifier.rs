//! Deterministic fit identifiers.
//!
//! The identifier is the SHA-256 hex digest of a canonical serialization of
//! everything that defines the fit: the ordered `(path, prior)` list of the
//! model, the backend name, the backend configuration, and the unique tag.
//! Operational settings (cores, checkpoint cadence, retry policy) are
//! deliberately excluded so they can change between invocations of the same
//! fit.

use nlf_core::{stable_hash_string, FitError};
use nlf_model::{Model, ParamPath, Prior};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct IdentityRecord<'a> {
    parameters: &'a [(ParamPath, Prior)],
    search: &'a str,
    search_config: &'a Value,
    unique_tag: Option<&'a str>,
}

/// Computes the identifier of a fit.
pub fn fit_identifier(
    model: &Model,
    search: &str,
    search_config: &Value,
    unique_tag: Option<&str>,
) -> Result<String, FitError> {
    let parameters = model.priors();
    stable_hash_string(&IdentityRecord {
        parameters: &parameters,
        search,
        search_config,
        unique_tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> Model {
        let mut gaussian = Model::new();
        gaussian.insert_prior(
            "centre",
            Prior::Uniform {
                lower: 0.0,
                upper: 100.0,
            },
        );
        gaussian.insert_prior(
            "sigma",
            Prior::Uniform {
                lower: 0.0,
                upper: 50.0,
            },
        );
        let mut root = Model::new();
        root.insert_model("gaussian", gaussian);
        root
    }

    #[test]
    fn identifier_is_stable_across_calls() {
        let config = json!({"nwalkers": 20});
        let a = fit_identifier(&model(), "walkers", &config, None).unwrap();
        let b = fit_identifier(&model(), "walkers", &config, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn every_identity_input_changes_the_identifier() {
        let config = json!({"nwalkers": 20});
        let base = fit_identifier(&model(), "walkers", &config, None).unwrap();

        let other_search = fit_identifier(&model(), "nested", &config, None).unwrap();
        assert_ne!(base, other_search);

        let other_config =
            fit_identifier(&model(), "walkers", &json!({"nwalkers": 40}), None).unwrap();
        assert_ne!(base, other_config);

        let tagged = fit_identifier(&model(), "walkers", &config, Some("run-a")).unwrap();
        assert_ne!(base, tagged);

        let mut widened = Model::new();
        let mut gaussian = Model::new();
        gaussian.insert_prior(
            "centre",
            Prior::Uniform {
                lower: 0.0,
                upper: 200.0,
            },
        );
        gaussian.insert_prior(
            "sigma",
            Prior::Uniform {
                lower: 0.0,
                upper: 50.0,
            },
        );
        widened.insert_model("gaussian", gaussian);
        let other_model = fit_identifier(&widened, "walkers", &config, None).unwrap();
        assert_ne!(base, other_model);
    }

    #[test]
    fn declaration_order_is_part_of_identity() {
        let mut forward = Model::new();
        forward.insert_prior("a", Prior::Uniform { lower: 0.0, upper: 1.0 });
        forward.insert_prior("b", Prior::Uniform { lower: 0.0, upper: 2.0 });
        let mut reversed = Model::new();
        reversed.insert_prior("b", Prior::Uniform { lower: 0.0, upper: 2.0 });
        reversed.insert_prior("a", Prior::Uniform { lower: 0.0, upper: 1.0 });

        let config = json!({});
        assert_ne!(
            fit_identifier(&forward, "walkers", &config, None).unwrap(),
            fit_identifier(&reversed, "walkers", &config, None).unwrap()
        );
    }
}
