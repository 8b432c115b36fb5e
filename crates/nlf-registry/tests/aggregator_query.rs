use nlf_core::FitError;
use nlf_model::{Model, Prior};
use nlf_registry::{Aggregator, FitQuery, Session};
use nlf_search::{FitRecord, FitSink, FitStatus, Sample, SampleSet};

fn gaussian_model() -> Model {
    let mut gaussian = Model::new();
    gaussian.insert_prior(
        "centre",
        Prior::Uniform {
            lower: 0.0,
            upper: 100.0,
        },
    );
    let mut model = Model::new();
    model.insert_model("gaussian", gaussian);
    model
}

fn exponential_model() -> Model {
    let mut exponential = Model::new();
    exponential.insert_prior(
        "rate",
        Prior::LogUniform {
            lower: 1e-3,
            upper: 1e1,
        },
    );
    let mut model = Model::new();
    model.insert_model("exponential", exponential);
    model
}

fn record(
    identifier: &str,
    model: Model,
    search_class: &str,
    status: FitStatus,
    info: &[(&str, &str)],
) -> FitRecord {
    FitRecord {
        identifier: identifier.to_string(),
        name: "query-test".to_string(),
        path_prefix: "output".to_string(),
        unique_tag: None,
        model,
        search_class: search_class.to_string(),
        search_config: serde_json::json!({}),
        info: info
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        status,
        created_at: format!("2026-01-01T00:00:0{}+00:00", identifier.len() % 10),
        updated_at: "2026-01-02T00:00:00+00:00".to_string(),
    }
}

fn samples_of(values: &[f64]) -> SampleSet {
    let mut set = SampleSet::new(1);
    for value in values {
        set.append(Sample {
            unit: vec![value / 100.0],
            params: vec![*value],
            log_likelihood: -value.abs(),
            weight: 1.0,
        })
        .unwrap();
    }
    set
}

fn seeded_session() -> Session {
    let session = Session::in_memory().unwrap();
    session
        .commit_fit(
            &record(
                "fit-a",
                gaussian_model(),
                "walkers",
                FitStatus::Completed,
                &[("dataset", "low-snr"), ("snr", "5.0")],
            ),
            &samples_of(&[10.0, 20.0]),
            &[("dataset".to_string(), serde_json::json!({"n": 1}))],
        )
        .unwrap();
    session
        .commit_fit(
            &record(
                "fit-bb",
                gaussian_model(),
                "nested",
                FitStatus::Completed,
                &[("dataset", "high-snr"), ("snr", "25.0")],
            ),
            &samples_of(&[30.0]),
            &[],
        )
        .unwrap();
    session
        .commit_fit(
            &record(
                "fit-ccc",
                exponential_model(),
                "walkers",
                FitStatus::Failed,
                &[("dataset", "high-snr")],
            ),
            &samples_of(&[40.0]),
            &[],
        )
        .unwrap();
    session
}

#[test]
fn an_empty_query_returns_every_fit() {
    let session = seeded_session();
    let handles = Aggregator::new(&session).query(&FitQuery::new()).unwrap();
    assert_eq!(handles.len(), 3);
}

#[test]
fn info_equality_and_ranges_combine_as_and() {
    let session = seeded_session();
    let aggregator = Aggregator::new(&session);

    let high = aggregator
        .query(&FitQuery::new().with_info("dataset", "high-snr"))
        .unwrap();
    assert_eq!(high.len(), 2);

    let high_gaussian = aggregator
        .query(
            &FitQuery::new()
                .with_info("dataset", "high-snr")
                .with_model_class("gaussian"),
        )
        .unwrap();
    assert_eq!(high_gaussian.len(), 1);
    assert_eq!(high_gaussian[0].identifier(), "fit-bb");

    let mid_snr = aggregator
        .query(&FitQuery::new().with_info_range("snr", 10.0, 30.0))
        .unwrap();
    assert_eq!(mid_snr.len(), 1);
    assert_eq!(mid_snr[0].identifier(), "fit-bb");

    // Fits without a parseable value for the key never match a range.
    let any_snr = aggregator
        .query(&FitQuery::new().with_info_range("snr", 0.0, 100.0))
        .unwrap();
    assert_eq!(any_snr.len(), 2);
}

#[test]
fn class_and_status_predicates_filter_fits() {
    let session = seeded_session();
    let aggregator = Aggregator::new(&session);

    let walkers = aggregator
        .query(&FitQuery::new().with_search_class("walkers"))
        .unwrap();
    assert_eq!(walkers.len(), 2);

    let failed = aggregator
        .query(&FitQuery::new().with_status(FitStatus::Failed))
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].identifier(), "fit-ccc");

    let none = aggregator
        .query(
            &FitQuery::new()
                .with_search_class("nested")
                .with_status(FitStatus::Failed),
        )
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn handles_lazily_load_samples_and_objects() {
    let session = seeded_session();
    let aggregator = Aggregator::new(&session);

    let handles = aggregator
        .query(&FitQuery::new().with_info("dataset", "low-snr"))
        .unwrap();
    assert_eq!(handles.len(), 1);
    let handle = &handles[0];

    let result = handle.result().unwrap();
    assert_eq!(result.identifier, "fit-a");
    assert_eq!(result.samples().len(), 2);
    let instance = result.max_log_likelihood_instance().unwrap();
    assert_eq!(instance.value_at("gaussian.centre"), Some(10.0));

    assert_eq!(handle.object("dataset").unwrap()["n"], 1);
    assert!(matches!(
        handle.object("missing").unwrap_err(),
        FitError::Query(_)
    ));
}

#[test]
fn stored_samples_keep_exact_float_values() {
    let session = Session::in_memory().unwrap();
    let mut set = SampleSet::new(1);
    for value in [0.37289746529920365_f64, 0.19437213009355558, 0.1 + 0.2] {
        set.append(Sample {
            unit: vec![value],
            params: vec![value * 100.0],
            log_likelihood: -value,
            weight: 1.0,
        })
        .unwrap();
    }
    session
        .commit_fit(
            &record(
                "fit-exact",
                gaussian_model(),
                "walkers",
                FitStatus::Completed,
                &[],
            ),
            &set,
            &[],
        )
        .unwrap();

    let loaded = session.load_samples("fit-exact").unwrap();
    assert_eq!(loaded, set);
    for (loaded, live) in loaded.samples().iter().zip(set.samples()) {
        assert_eq!(loaded.unit[0].to_bits(), live.unit[0].to_bits());
        assert_eq!(loaded.params[0].to_bits(), live.params[0].to_bits());
    }
}

#[test]
fn malformed_ranges_are_rejected() {
    let session = seeded_session();
    let err = Aggregator::new(&session)
        .query(&FitQuery::new().with_info_range("snr", 10.0, 5.0))
        .unwrap_err();
    assert!(matches!(err, FitError::Query(_)));
    assert_eq!(err.info().code, "range-malformed");
}
