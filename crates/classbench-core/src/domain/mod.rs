//! Domain models for classbench.
//!
//! - `DatasetSpec`: a named classification task and its ordered classes
//! - `GroundTruthManifest`: the authoritative id → label mapping of a corpus
//! - `OutcomeRecord`: the result of classifying one item under one variant

pub mod dataset;
pub mod manifest;
pub mod outcome;

pub use dataset::{DatasetCatalog, DatasetSpec};
pub use manifest::{
    discover_datasets, CorpusMetadata, DatasetSummary, EvaluationItem, GroundTruthManifest,
    ManifestEntry, IMAGES_DIR, MANIFEST_FILE, METADATA_FILE,
};
pub use outcome::{
    FailureKind, ItemDiagnostics, OutcomeRecord, Prediction, TraceStep, Variant,
};
