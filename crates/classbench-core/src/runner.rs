//! Run controller: drives one classifier over a dataset's corpus.
//!
//! Items are processed one at a time in manifest order. Every outcome is
//! flushed to the predictions file before the next item starts, so a crash or
//! Ctrl-C loses at most the item in flight.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{ClassificationRequest, ClassifierAdapter};
use crate::config::HarnessConfig;
use crate::domain::{discover_datasets, GroundTruthManifest, OutcomeRecord, Variant, IMAGES_DIR};
use crate::error::{BenchError, Result};
use crate::metrics::accuracy_percent;
use crate::store::{write_json, DatasetLog, ItemLog, PredictionWriter, ResultsLayout};

/// Characters of classifier reasoning shown in debug progress output.
const REASONING_PREVIEW_CHARS: usize = 200;

/// Summary of one (dataset, variant) run, persisted as `<dataset>_run.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub dataset: String,
    pub variant: Variant,
    pub manifest_digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Items selected for this run (after `limit`).
    pub planned: usize,

    /// Items actually classified.
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,

    /// True when the stop flag ended the run early.
    pub interrupted: bool,
    pub predictions_path: PathBuf,
}

/// Sequential evaluation driver shared by both variants.
pub struct RunController {
    corpus_root: PathBuf,
    knowledge_path: PathBuf,
    layout: ResultsLayout,
    limit: Option<usize>,
    stop: Option<Arc<AtomicBool>>,
}

impl RunController {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            corpus_root: config.corpus_root.clone(),
            knowledge_path: config.knowledge_path.clone(),
            layout: ResultsLayout::new(&config.results_root),
            limit: None,
            stop: None,
        }
    }

    /// Classify only the first `limit` items of each manifest.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Flag checked between items; raising it ends the run after the item in flight.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn layout(&self) -> &ResultsLayout {
        &self.layout
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Check every prerequisite of a run before any item is classified.
    fn check_preconditions(&self, dataset: &str, variant: Variant) -> Result<GroundTruthManifest> {
        let dataset_dir = self.corpus_root.join(dataset);
        let manifest = GroundTruthManifest::load(&dataset_dir)?;
        let images = dataset_dir.join(IMAGES_DIR);
        if !images.is_dir() {
            return Err(BenchError::missing_corpus(images));
        }
        if variant == Variant::Agentic && !self.knowledge_path.is_file() {
            return Err(BenchError::missing_knowledge(&self.knowledge_path));
        }
        Ok(manifest)
    }

    /// Run `adapter` over one dataset.
    pub async fn run(&self, dataset: &str, adapter: &dyn ClassifierAdapter) -> Result<RunSummary> {
        let variant = adapter.variant();
        let manifest = self.check_preconditions(dataset, variant)?;
        let dataset_dir = self.corpus_root.join(dataset);

        let mut items = manifest.evaluation_items(&dataset_dir);
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        let planned = items.len();
        let knowledge = (variant == Variant::Agentic).then_some(self.knowledge_path.as_path());

        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            dataset,
            variant = %variant,
            description = %manifest.description,
            items = planned,
            "Starting run"
        );

        let predictions_path = self.layout.predictions_path(variant, dataset);
        let mut writer = PredictionWriter::create(&predictions_path)?;
        let mut logs = Vec::new();
        let mut correct = 0;
        let mut total = 0;
        let mut interrupted = false;

        for (index, item) in items.iter().enumerate() {
            if self.stop_requested() {
                warn!(dataset, completed = total, "Stop requested; ending run early");
                interrupted = true;
                break;
            }

            let request = ClassificationRequest {
                image_path: &item.image_path,
                classes: &manifest.expected_classes,
                description: &manifest.description,
                knowledge_path: knowledge,
            };
            let outcome = adapter.classify(&request).await;
            if self.stop_requested() && outcome.prediction.is_failure() {
                // The interrupt may have cut this call short.
                warn!(dataset, item = %item.id, "Stop requested mid-item; discarding its failed outcome");
                interrupted = true;
                break;
            }
            let record = OutcomeRecord::new(&item.id, &item.true_label, outcome.prediction);
            writer.append(&record)?;

            total += 1;
            if record.correct {
                correct += 1;
                info!(dataset, item = %item.id, "[{}/{}] {} ... OK", index + 1, planned, item.id);
            } else {
                info!(
                    dataset,
                    item = %item.id,
                    prediction = %record.prediction,
                    "[{}/{}] {} ... WRONG (predicted: {})",
                    index + 1,
                    planned,
                    item.id,
                    record.prediction
                );
            }
            if !outcome.raw_text.is_empty() {
                let preview: String = outcome.raw_text.chars().take(REASONING_PREVIEW_CHARS).collect();
                debug!(dataset, item = %item.id, reasoning = %preview, "Classifier reasoning");
            }

            if variant.records_diagnostics() {
                let log = ItemLog::new(&record, outcome.diagnostics);
                write_json(&self.layout.item_log_path(variant, dataset, &item.id), &log)?;
                logs.push(log);
            }
        }

        let accuracy = accuracy_percent(correct, total);
        if variant.records_diagnostics() {
            let combined = DatasetLog {
                dataset: dataset.to_string(),
                description: manifest.description.clone(),
                classes: manifest.expected_classes.clone(),
                accuracy,
                correct,
                total,
                logs,
            };
            write_json(&self.layout.all_logs_path(variant, dataset), &combined)?;
        }

        let summary = RunSummary {
            run_id,
            dataset: dataset.to_string(),
            variant,
            manifest_digest: manifest.digest(),
            started_at,
            finished_at: Utc::now(),
            planned,
            total,
            correct,
            accuracy,
            interrupted,
            predictions_path: writer.path().to_path_buf(),
        };
        write_json(&self.layout.run_summary_path(variant, dataset), &summary)?;
        info!(
            %run_id,
            dataset,
            variant = %variant,
            correct,
            total,
            "Accuracy: {}/{} = {:.1}%",
            correct,
            total,
            accuracy
        );
        Ok(summary)
    }

    /// Run `adapter` over several datasets in lexicographic order.
    ///
    /// Stops after the first interrupted run.
    pub async fn run_all(
        &self,
        datasets: &[String],
        adapter: &dyn ClassifierAdapter,
    ) -> Result<Vec<RunSummary>> {
        let mut ordered = datasets.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut summaries = Vec::with_capacity(ordered.len());
        for dataset in &ordered {
            let summary = self.run(dataset, adapter).await?;
            let interrupted = summary.interrupted;
            summaries.push(summary);
            if interrupted {
                break;
            }
        }
        Ok(summaries)
    }

    /// Datasets present in the corpus, optionally narrowed to one name.
    pub fn select_datasets(&self, only: Option<&str>) -> Result<Vec<String>> {
        let available = discover_datasets(&self.corpus_root)?;
        match only {
            None if available.is_empty() => Err(BenchError::missing_corpus(&self.corpus_root)),
            None => Ok(available),
            Some(name) if available.iter().any(|d| d == name) => Ok(vec![name.to_string()]),
            Some(name) => Err(BenchError::missing_corpus(
                GroundTruthManifest::path_in(&self.corpus_root.join(name)),
            )),
        }
    }
}
