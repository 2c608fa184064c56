//! Accuracy metrics and baseline/candidate comparison.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{discover_datasets, GroundTruthManifest, OutcomeRecord, Variant};
use crate::error::Result;
use crate::store::{read_predictions, ResultsLayout};

/// `correct / total * 100`, or 0 for an empty run.
pub fn accuracy_percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassMetric {
    pub class: String,
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,
}

/// Overall and per-class accuracy of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,

    /// In the dataset's canonical class order; absent classes report 0/0.
    pub per_class: Vec<ClassMetric>,
}

impl RunMetrics {
    pub fn class(&self, class: &str) -> Option<&ClassMetric> {
        self.per_class.iter().find(|m| m.class == class)
    }
}

pub fn compute_run_metrics(records: &[OutcomeRecord], classes: &[String]) -> RunMetrics {
    let mut tallies: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for record in records {
        let tally = tallies.entry(record.true_label.as_str()).or_default();
        tally.1 += 1;
        if record.correct {
            tally.0 += 1;
        }
    }

    let per_class = classes
        .iter()
        .map(|class| {
            let (correct, total) = tallies.get(class.as_str()).copied().unwrap_or_default();
            ClassMetric {
                class: class.clone(),
                correct,
                total,
                accuracy: accuracy_percent(correct, total),
            }
        })
        .collect();

    let correct = records.iter().filter(|r| r.correct).count();
    RunMetrics {
        correct,
        total: records.len(),
        accuracy: accuracy_percent(correct, records.len()),
        per_class,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassDelta {
    pub class: String,
    pub baseline: ClassMetric,
    pub candidate: ClassMetric,

    /// Candidate minus baseline, in percentage points.
    pub delta: f64,
}

/// Baseline vs. candidate metrics for one dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetComparison {
    pub dataset: String,
    pub classes: Vec<String>,
    pub baseline: RunMetrics,
    pub candidate: RunMetrics,
    pub delta: f64,
    pub per_class: Vec<ClassDelta>,
}

pub fn compare_runs(
    dataset: &str,
    classes: &[String],
    baseline: &[OutcomeRecord],
    candidate: &[OutcomeRecord],
) -> DatasetComparison {
    let baseline = compute_run_metrics(baseline, classes);
    let candidate = compute_run_metrics(candidate, classes);

    let per_class = baseline
        .per_class
        .iter()
        .zip(&candidate.per_class)
        .map(|(b, c)| ClassDelta {
            class: b.class.clone(),
            delta: c.accuracy - b.accuracy,
            baseline: b.clone(),
            candidate: c.clone(),
        })
        .collect();

    DatasetComparison {
        dataset: dataset.to_string(),
        classes: classes.to_vec(),
        delta: candidate.accuracy - baseline.accuracy,
        baseline,
        candidate,
        per_class,
    }
}

/// Drop records that do not belong to the current manifest.
///
/// A record is stale when its id is unknown, its true label disagrees with
/// the manifest, or its id was already seen. Stale records are logged and
/// skipped, never counted.
pub fn filter_records(
    records: Vec<OutcomeRecord>,
    manifest: &GroundTruthManifest,
    source: &Path,
) -> Vec<OutcomeRecord> {
    let labels = manifest.labels();
    let mut seen = HashSet::new();
    let before = records.len();

    let kept: Vec<OutcomeRecord> = records
        .into_iter()
        .filter(|record| {
            match labels.get(record.item_id.as_str()) {
                None => {
                    warn!(source = %source.display(), item = %record.item_id, "Skipping record for unknown item");
                    return false;
                }
                Some(label) if *label != record.true_label => {
                    warn!(
                        source = %source.display(),
                        item = %record.item_id,
                        recorded = %record.true_label,
                        expected = %label,
                        "Skipping record with stale ground truth"
                    );
                    return false;
                }
                Some(_) => {}
            }
            if !seen.insert(record.item_id.clone()) {
                warn!(source = %source.display(), item = %record.item_id, "Skipping duplicate record");
                return false;
            }
            true
        })
        .collect();

    if kept.len() < before {
        warn!(
            source = %source.display(),
            dropped = before - kept.len(),
            "Some outcome records do not match the current corpus; rebuild or rerun to refresh them"
        );
    }
    kept
}

/// Load one variant's records for a dataset; a missing file is an empty run.
pub fn load_run_records(
    layout: &ResultsLayout,
    variant: Variant,
    manifest: &GroundTruthManifest,
) -> Result<Vec<OutcomeRecord>> {
    let path = layout.predictions_path(variant, &manifest.dataset_name);
    if !path.is_file() {
        info!(dataset = %manifest.dataset_name, variant = %variant, "No predictions found; treating as empty run");
        return Ok(Vec::new());
    }
    let records = read_predictions(&path)?;
    Ok(filter_records(records, manifest, &path))
}

/// Compare both variants' persisted runs for one dataset.
pub fn load_comparison(layout: &ResultsLayout, manifest: &GroundTruthManifest) -> Result<DatasetComparison> {
    let baseline = load_run_records(layout, Variant::Direct, manifest)?;
    let candidate = load_run_records(layout, Variant::Agentic, manifest)?;
    Ok(compare_runs(
        &manifest.dataset_name,
        &manifest.expected_classes,
        &baseline,
        &candidate,
    ))
}

/// Comparisons for every dataset found in the corpus, sorted by name.
pub fn load_comparisons(corpus_root: &Path, layout: &ResultsLayout) -> Result<Vec<DatasetComparison>> {
    discover_datasets(corpus_root)?
        .iter()
        .map(|name| {
            let manifest = GroundTruthManifest::load(&corpus_root.join(name))?;
            load_comparison(layout, &manifest)
        })
        .collect()
}
