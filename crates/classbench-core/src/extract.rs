//! Prediction extraction from free-form classifier output.
//!
//! Lenient on location, strict on shape: the answer object may appear
//! anywhere in the text, but only the first brace-delimited object that
//! mentions a `"prediction"` key is considered, and it must parse as JSON on
//! its own. The extracted value is not checked against the class list; a
//! near-miss label is an incorrect prediction, not a parse failure.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::{FailureKind, Prediction};

/// Key carrying the answer in the classifier's JSON object.
pub const PREDICTION_KEY: &str = "prediction";

static PREDICTION_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"prediction"[^{}]*\}"#).expect("prediction pattern is valid")
});

/// First minimal `{ ... "prediction" ... }` substring of `raw`, if any.
pub fn find_prediction_object(raw: &str) -> Option<&str> {
    PREDICTION_OBJECT_RE.find(raw).map(|m| m.as_str())
}

fn prediction_field(value: &Value) -> Option<String> {
    value
        .as_object()?
        .get(PREDICTION_KEY)?
        .as_str()
        .map(str::to_string)
}

/// Extract a prediction from raw text, falling back to a structured payload.
///
/// Returns `Prediction::Failure(FailureKind::Unknown)` when neither source
/// yields a string `prediction` field.
pub fn extract_prediction(raw: &str, structured: Option<&Value>) -> Prediction {
    let from_text = find_prediction_object(raw)
        .and_then(|snippet| serde_json::from_str::<Value>(snippet).ok())
        .and_then(|value| prediction_field(&value));

    if let Some(label) = from_text {
        return Prediction::Label(label);
    }

    match structured.and_then(prediction_field) {
        Some(label) => Prediction::Label(label),
        None => Prediction::Failure(FailureKind::Unknown),
    }
}
