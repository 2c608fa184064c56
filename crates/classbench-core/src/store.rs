//! Persistence of run results.
//!
//! Layout under the results root:
//!
//! ```text
//! <variant>/<dataset>_predictions.csv
//! <variant>/<dataset>_run.json
//! <variant>/logs/<dataset>/<id>_log.json
//! <variant>/logs/<dataset>/all_logs.json
//! evaluation_report.md
//! ```
//!
//! The predictions file is written one flushed row at a time so an
//! interrupted run leaves every completed item on disk.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ItemDiagnostics, OutcomeRecord, Prediction, Variant};
use crate::error::{BenchError, Result};

/// Column names of the predictions file.
pub const PREDICTIONS_HEADER: [&str; 4] = ["image_name", "ground_truth", "prediction", "correct"];

/// File name of the markdown report.
pub const REPORT_FILE: &str = "evaluation_report.md";

const LOGS_DIR: &str = "logs";
const ALL_LOGS_FILE: &str = "all_logs.json";

/// Path scheme of everything written under the results root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsLayout {
    root: PathBuf,
}

impl ResultsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn variant_dir(&self, variant: Variant) -> PathBuf {
        self.root.join(variant.results_dir())
    }

    pub fn predictions_path(&self, variant: Variant, dataset: &str) -> PathBuf {
        self.variant_dir(variant)
            .join(format!("{dataset}_predictions.csv"))
    }

    pub fn run_summary_path(&self, variant: Variant, dataset: &str) -> PathBuf {
        self.variant_dir(variant).join(format!("{dataset}_run.json"))
    }

    pub fn logs_dir(&self, variant: Variant, dataset: &str) -> PathBuf {
        self.variant_dir(variant).join(LOGS_DIR).join(dataset)
    }

    pub fn item_log_path(&self, variant: Variant, dataset: &str, item_id: &str) -> PathBuf {
        self.logs_dir(variant, dataset)
            .join(format!("{item_id}_log.json"))
    }

    pub fn all_logs_path(&self, variant: Variant, dataset: &str) -> PathBuf {
        self.logs_dir(variant, dataset).join(ALL_LOGS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| quote_field(f)).collect();
    format!("{}\n", quoted.join(","))
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Append-only writer for one (dataset, variant) predictions file.
pub struct PredictionWriter {
    path: PathBuf,
    file: File,
}

impl PredictionWriter {
    /// Create (or truncate) the file and write the header row.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        file.write_all(csv_row(&PREDICTIONS_HEADER).as_bytes())?;
        file.flush()?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record and flush it before returning.
    pub fn append(&mut self, record: &OutcomeRecord) -> Result<()> {
        let row = csv_row(&[
            &record.item_id,
            &record.true_label,
            record.prediction.as_str(),
            bool_field(record.correct),
        ]);
        self.file.write_all(row.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Split CSV content into rows of fields, tracking the line each row starts on.
///
/// Quoted fields may contain separators, doubled quotes and line breaks.
fn parse_rows(content: &str) -> Vec<(usize, Vec<String>)> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_start = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                rows.push((row_start, std::mem::take(&mut fields)));
                line += 1;
                row_start = line;
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        rows.push((row_start, fields));
    }
    rows.retain(|(_, fields)| !(fields.len() == 1 && fields[0].is_empty()));
    rows
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

/// Read a predictions file.
///
/// `correct` is re-derived from the prediction; a stored value that
/// disagrees is logged and overridden.
pub fn read_predictions(path: &Path) -> Result<Vec<OutcomeRecord>> {
    let content = std::fs::read_to_string(path)?;
    let invalid = |line: usize, reason: String| BenchError::InvalidRecord {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    let mut rows = parse_rows(content).into_iter();
    match rows.next() {
        Some((_, header)) if header == PREDICTIONS_HEADER => {}
        Some((line, header)) => {
            return Err(invalid(line, format!("unexpected header {header:?}")));
        }
        None => return Ok(Vec::new()),
    }

    let mut records = Vec::new();
    for (line, fields) in rows {
        let [item_id, true_label, prediction, correct] = <[String; 4]>::try_from(fields)
            .map_err(|f| invalid(line, format!("expected 4 fields, found {}", f.len())))?;
        let stored = parse_bool(&correct)
            .ok_or_else(|| invalid(line, format!("correct must be True or False, got {correct:?}")))?;

        let record = OutcomeRecord::new(item_id, true_label, Prediction::from_recorded(&prediction));
        if record.correct != stored {
            warn!(
                path = %path.display(),
                line,
                item = %record.item_id,
                "Stored correctness disagrees with exact match; using exact match"
            );
        }
        records.push(record);
    }
    Ok(records)
}

/// Per-item diagnostic log (`<id>_log.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemLog {
    pub image_name: String,
    pub ground_truth: String,
    pub prediction: Prediction,
    pub correct: bool,

    #[serde(flatten)]
    pub diagnostics: ItemDiagnostics,
}

impl ItemLog {
    pub fn new(record: &OutcomeRecord, diagnostics: ItemDiagnostics) -> Self {
        Self {
            image_name: record.item_id.clone(),
            ground_truth: record.true_label.clone(),
            prediction: record.prediction.clone(),
            correct: record.correct,
            diagnostics,
        }
    }
}

/// Combined log of one dataset run (`all_logs.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetLog {
    pub dataset: String,
    pub description: String,
    pub classes: Vec<String>,
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
    pub logs: Vec<ItemLog>,
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
