//! Serde helpers that keep non-finite floats representable in JSON.
//!
//! `serde_json` renders infinities and NaN as `null`, which silently corrupts
//! log-likelihood traces on a checkpoint round trip. These adapters encode the
//! three non-finite values as string tokens instead.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

fn token(value: f64) -> &'static str {
    if value.is_nan() {
        "nan"
    } else if value > 0.0 {
        "inf"
    } else {
        "-inf"
    }
}

fn from_token<E: DeError>(text: &str) -> Result<f64, E> {
    match text {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        other => Err(E::custom(format!("unknown float token `{other}`"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Token(String),
}

impl Repr {
    fn value<E: DeError>(self) -> Result<f64, E> {
        match self {
            Repr::Number(value) => Ok(value),
            Repr::Token(text) => from_token(&text),
        }
    }
}

pub(crate) mod float {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(token(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Repr::deserialize(deserializer)?.value()
    }
}

pub(crate) mod float_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            if value.is_finite() {
                seq.serialize_element(value)?;
            } else {
                seq.serialize_element(token(*value))?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Repr>::deserialize(deserializer)?;
        raw.into_iter().map(Repr::value).collect()
    }
}
