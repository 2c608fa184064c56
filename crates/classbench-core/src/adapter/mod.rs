//! Classifier adapters.
//!
//! [`ClassifierAdapter`] is the one capability the run controller sees. Each
//! variant hides its transport (HTTP request or agent subprocess) and its
//! output protocol, and reports every failure as a value: `classify` never
//! returns an error.

pub mod agentic;
pub mod direct;
pub mod prompt;
mod stream;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{FailureKind, ItemDiagnostics, Prediction, Variant};

pub use agentic::AgentClassifier;
pub use direct::DirectClassifier;

/// Input for one classification.
///
/// Carries no label; the true label stays with the harness.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRequest<'a> {
    pub image_path: &'a Path,
    pub classes: &'a [String],
    pub description: &'a str,
    /// Reference material the agent may read; ignored by the direct variant.
    pub knowledge_path: Option<&'a Path>,
}

/// Normalized result of one classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub prediction: Prediction,

    /// Text the classifier returned, verbatim.
    pub raw_text: String,

    /// Machine-provided parsed payload, when the transport offers one.
    pub structured: Option<serde_json::Value>,

    pub diagnostics: ItemDiagnostics,
}

impl ClassificationOutcome {
    /// Outcome for a call that produced no usable response.
    pub fn failed(kind: FailureKind, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            prediction: Prediction::Failure(kind),
            raw_text: String::new(),
            structured: None,
            diagnostics: ItemDiagnostics {
                latency_ms: Some(latency_ms),
                error: Some(error.into()),
                ..ItemDiagnostics::default()
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.prediction.is_failure()
    }
}

/// Uniform interface over a concrete classification strategy.
#[async_trait]
pub trait ClassifierAdapter: Send + Sync {
    /// Which variant this adapter implements.
    fn variant(&self) -> Variant;

    /// Classify one image. Failures come back as sentinel predictions.
    async fn classify(&self, request: &ClassificationRequest<'_>) -> ClassificationOutcome;
}
