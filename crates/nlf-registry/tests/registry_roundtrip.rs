use std::collections::BTreeMap;

use nlf_core::FitError;
use nlf_model::{Instance, Model, Prior};
use nlf_registry::Session;
use nlf_search::{Analysis, EnsembleWalkers, FitStatus, SearchConfig, SearchDriver, SearchPaths};

fn simple_model() -> Model {
    let mut model = Model::new();
    model.insert_prior(
        "x",
        Prior::Uniform {
            lower: 0.0,
            upper: 1.0,
        },
    );
    model
}

struct Peak;

impl Analysis for Peak {
    fn log_likelihood(&self, instance: &Instance) -> f64 {
        let x = instance.value_at("x").unwrap_or(f64::NAN);
        -(x - 0.4) * (x - 0.4)
    }

    fn save_attributes(&self, paths: &SearchPaths) -> Result<(), FitError> {
        paths.save_object("dataset", &serde_json::json!({"points": 64}))?;
        Ok(())
    }
}

#[test]
fn a_committed_fit_round_trips_through_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(&dir.path().join("registry.sqlite")).unwrap();

    let config = SearchConfig {
        path_prefix: dir.path().join("output"),
        name: "roundtrip".to_string(),
        master_seed: 17,
        ..SearchConfig::default()
    };
    let mut driver = SearchDriver::new(EnsembleWalkers::new(6, 8), config);
    let mut info = BTreeMap::new();
    info.insert("dataset".to_string(), "synthetic".to_string());
    info.insert("snr".to_string(), "12.5".to_string());

    let model = simple_model();
    let result = driver.fit(&model, &Peak, &info, Some(&session)).unwrap();
    assert_eq!(result.status, FitStatus::Completed);

    let record = session.load_fit(&result.identifier).unwrap();
    assert_eq!(record.identifier, result.identifier);
    assert_eq!(record.name, "roundtrip");
    assert_eq!(record.search_class, "walkers");
    assert_eq!(record.status, FitStatus::Completed);
    assert_eq!(record.info.get("dataset").unwrap(), "synthetic");
    record.model.structural_match(&model).unwrap();

    let samples = session.load_samples(&result.identifier).unwrap();
    assert_eq!(&samples, result.samples());

    let object = session.load_object(&result.identifier, "dataset").unwrap();
    assert_eq!(object["points"], 64);
}

#[test]
fn recommitting_a_fit_overwrites_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(&dir.path().join("registry.sqlite")).unwrap();

    let config = SearchConfig {
        path_prefix: dir.path().join("output"),
        name: "recommit".to_string(),
        master_seed: 23,
        ..SearchConfig::default()
    };
    let model = simple_model();

    let first = SearchDriver::new(EnsembleWalkers::new(6, 8), config.clone())
        .fit(&model, &Peak, &BTreeMap::new(), Some(&session))
        .unwrap();
    let second = SearchDriver::new(EnsembleWalkers::new(6, 8), config)
        .fit(&model, &Peak, &BTreeMap::new(), Some(&session))
        .unwrap();
    assert_eq!(first.identifier, second.identifier);

    assert_eq!(session.all_fits().unwrap().len(), 1);
    let samples = session.load_samples(&first.identifier).unwrap();
    assert_eq!(&samples, second.samples());
}

#[test]
fn per_dataset_tags_keep_fits_apart_in_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::open(&dir.path().join("registry.sqlite")).unwrap();
    let model = simple_model();

    let mut identifiers = Vec::new();
    for tag in ["dataset-a", "dataset-b"] {
        let config = SearchConfig {
            path_prefix: dir.path().join("output"),
            name: "tagged".to_string(),
            unique_tag: Some(tag.to_string()),
            master_seed: 31,
            ..SearchConfig::default()
        };
        let result = SearchDriver::new(EnsembleWalkers::new(6, 8), config)
            .fit(&model, &Peak, &BTreeMap::new(), Some(&session))
            .unwrap();
        identifiers.push(result.identifier);
    }

    assert_ne!(identifiers[0], identifiers[1]);
    assert_eq!(session.all_fits().unwrap().len(), 2);
    for identifier in &identifiers {
        let record = session.load_fit(identifier).unwrap();
        assert_eq!(record.status, FitStatus::Completed);
        assert!(!session.load_samples(identifier).unwrap().is_empty());
    }
}

#[test]
fn unknown_identifiers_are_query_errors() {
    let session = Session::in_memory().unwrap();
    let err = session.load_fit("not-a-fit").unwrap_err();
    assert!(matches!(err, FitError::Query(_)));
    assert_eq!(err.info().code, "fit-unknown");

    let err = session.load_samples("not-a-fit").unwrap_err();
    assert!(matches!(err, FitError::Query(_)));
}

#[test]
fn a_reopened_database_still_serves_stored_fits() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("registry.sqlite");

    let identifier = {
        let session = Session::open(&db_path).unwrap();
        let config = SearchConfig {
            path_prefix: dir.path().join("output"),
            name: "reopen".to_string(),
            master_seed: 41,
            ..SearchConfig::default()
        };
        SearchDriver::new(EnsembleWalkers::new(6, 8), config)
            .fit(&simple_model(), &Peak, &BTreeMap::new(), Some(&session))
            .unwrap()
            .identifier
    };

    let session = Session::open(&db_path).unwrap();
    let record = session.load_fit(&identifier).unwrap();
    assert_eq!(record.status, FitStatus::Completed);
}
