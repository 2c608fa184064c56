//! Error taxonomy for harness-level failures.
//!
//! Per-item classification failures are not errors: they are
//! [`FailureKind`](crate::domain::FailureKind) values recorded as incorrect
//! outcomes. `BenchError` covers what aborts a corpus build or a run.

use std::path::PathBuf;

/// Classbench errors.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("sampling error in {dataset}: {reason}")]
    Sampling { dataset: String, reason: String },

    #[error("identifier {identifier:?} contains class name {class:?}")]
    LabelLeak { identifier: String, class: String },

    #[error("missing {artifact} at {}; {hint}", path.display())]
    MissingArtifact {
        artifact: &'static str,
        path: PathBuf,
        hint: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid outcome record at {}:{line}: {reason}", path.display())]
    InvalidRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Corpus directory or manifest absent.
    pub fn missing_corpus(path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            artifact: "evaluation corpus",
            path: path.into(),
            hint: "run `classbench prepare` first",
        }
    }

    /// Knowledge-base document absent.
    pub fn missing_knowledge(path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            artifact: "knowledge base",
            path: path.into(),
            hint: "generate the symptoms document before running the agent",
        }
    }
}

/// Result type for classbench operations.
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_corpus_names_the_prerequisite() {
        let err = BenchError::missing_corpus("/tmp/test_data");
        let msg = err.to_string();
        assert!(msg.contains("evaluation corpus"));
        assert!(msg.contains("/tmp/test_data"));
        assert!(msg.contains("classbench prepare"));
    }

    #[test]
    fn label_leak_mentions_both_sides() {
        let err = BenchError::LabelLeak {
            identifier: "rust_item_001".to_string(),
            class: "rust".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rust_item_001"));
        assert!(msg.contains("\"rust\""));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BenchError = io.into();
        assert!(err.to_string().contains("io error"));
    }
}
