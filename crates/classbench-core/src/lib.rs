//! Classbench Core Library
//!
//! Benchmarks a direct single-shot image classifier (the baseline) against a
//! multi-step tool-using agent (the candidate) on the same anonymized corpus.

pub mod adapter;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod reporting;
pub mod runner;
pub mod sampler;
pub mod store;
pub mod telemetry;

pub use adapter::{
    AgentClassifier, ClassificationOutcome, ClassificationRequest, ClassifierAdapter,
    DirectClassifier,
};

pub use config::{
    AgentConfig, DirectConfig, HarnessConfig, MissingClassPolicy, OutputProtocol, SamplingConfig,
    DEFAULT_CONFIG_FILE,
};

pub use domain::{
    CorpusMetadata, DatasetCatalog, DatasetSpec, EvaluationItem, FailureKind,
    GroundTruthManifest, ItemDiagnostics, OutcomeRecord, Prediction, TraceStep, Variant,
};

pub use error::{BenchError, Result};

pub use extract::extract_prediction;

pub use metrics::{
    compare_runs, compute_run_metrics, load_comparison, load_comparisons, ClassDelta,
    ClassMetric, DatasetComparison, RunMetrics,
};

pub use reporting::{render_console_comparison, render_report, write_report};

pub use runner::{RunController, RunSummary};

pub use sampler::{build_corpus, build_dataset_corpus};

pub use store::{read_predictions, PredictionWriter, ResultsLayout};

/// Classbench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
