//! Predictions, outcome records and per-item diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classifier variant under test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Single-shot request to a multimodal model (the baseline).
    Direct,

    /// Multi-step tool-using agent session (the candidate).
    Agentic,
}

impl Variant {
    /// Directory name under the results root.
    pub fn results_dir(&self) -> &'static str {
        match self {
            Variant::Direct => "baseline",
            Variant::Agentic => "agent",
        }
    }

    /// Label used in console output and reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Variant::Direct => "Baseline (API)",
            Variant::Agentic => "Agent",
        }
    }

    /// Whether per-item diagnostic logs are written for this variant.
    pub fn records_diagnostics(&self) -> bool {
        matches!(self, Variant::Agentic)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.results_dir())
    }
}

/// Why a classifier produced no answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Service unreachable, error status, or the agent process failed.
    TransportError,

    /// The classification exceeded its time bound.
    Timeout,

    /// A response arrived but its envelope could not be decoded.
    MalformedOutput,

    /// Response text arrived without a parseable prediction.
    Unknown,
}

impl FailureKind {
    /// Sentinel string persisted in the predicted-label column.
    pub fn sentinel(&self) -> &'static str {
        match self {
            FailureKind::TransportError => "ERROR",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::MalformedOutput => "MALFORMED_OUTPUT",
            FailureKind::Unknown => "UNKNOWN",
        }
    }

    /// Inverse of [`FailureKind::sentinel`].
    pub fn from_sentinel(value: &str) -> Option<Self> {
        match value {
            "ERROR" | "TRANSPORT_ERROR" => Some(FailureKind::TransportError),
            "TIMEOUT" => Some(FailureKind::Timeout),
            "MALFORMED_OUTPUT" | "PARSE_ERROR" => Some(FailureKind::MalformedOutput),
            "UNKNOWN" => Some(FailureKind::Unknown),
            _ => None,
        }
    }
}

/// A classifier's answer: a label or a sentinel failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prediction {
    Label(String),
    Failure(FailureKind),
}

impl Prediction {
    pub fn label(value: impl Into<String>) -> Self {
        Prediction::Label(value.into())
    }

    /// The persisted form: the label itself or the failure sentinel.
    pub fn as_str(&self) -> &str {
        match self {
            Prediction::Label(label) => label,
            Prediction::Failure(kind) => kind.sentinel(),
        }
    }

    /// Parse the persisted form. Sentinel spellings decode as failures.
    pub fn from_recorded(value: &str) -> Self {
        match FailureKind::from_sentinel(value) {
            Some(kind) => Prediction::Failure(kind),
            None => Prediction::Label(value.to_string()),
        }
    }

    /// Exact, case-sensitive comparison against the true label.
    ///
    /// A failure is never correct.
    pub fn matches(&self, true_label: &str) -> bool {
        match self {
            Prediction::Label(label) => label == true_label,
            Prediction::Failure(_) => false,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Prediction::Failure(_))
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Prediction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Prediction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Prediction::from_recorded(&raw))
    }
}

/// Result of classifying one evaluation item under one variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub item_id: String,
    pub true_label: String,
    pub prediction: Prediction,
    pub correct: bool,
}

impl OutcomeRecord {
    /// Build a record; `correct` is derived from the prediction.
    pub fn new(
        item_id: impl Into<String>,
        true_label: impl Into<String>,
        prediction: Prediction,
    ) -> Self {
        let true_label = true_label.into();
        let correct = prediction.matches(&true_label);
        Self {
            item_id: item_id.into(),
            true_label,
            prediction,
            correct,
        }
    }
}

/// One step of an agent session, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceStep {
    /// Free text produced by the model.
    Text { text: String },

    /// A tool invocation requested by the model.
    ToolUse {
        name: String,
        input: serde_json::Value,
    },

    /// Output returned to the model by a tool.
    ToolResult { content: String, is_error: bool },
}

/// Diagnostic metadata for one classification; not correctness-relevant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ItemDiagnostics {
    pub latency_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
    pub session_id: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub reasoning: String,
    pub trace: Vec<TraceStep>,
    pub error: Option<String>,
}
