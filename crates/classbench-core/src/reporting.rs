use chrono::{DateTime, Utc};
use std::path::Path;

use crate::domain::Variant;
use crate::error::Result;
use crate::metrics::{ClassMetric, DatasetComparison};

fn signed(delta: f64) -> String {
    format!("{delta:+.1}%")
}

fn fraction(metric: &ClassMetric) -> String {
    format!("{}/{}", metric.correct, metric.total)
}

/// Render the markdown evaluation report.
pub fn render_report(comparisons: &[DatasetComparison], generated_at: DateTime<Utc>) -> String {
    let baseline = Variant::Direct.display_name();
    let candidate = Variant::Agentic.display_name();

    let mut out = String::new();
    out.push_str("# Classification Benchmark Report\n\n");
    out.push_str(&format!(
        "Generated: {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("## Overall Accuracy\n\n");
    out.push_str(&format!("| Dataset | {baseline} | {candidate} | Difference |\n"));
    out.push_str("|---------|---|---|------------|\n");
    for c in comparisons {
        out.push_str(&format!(
            "| {} | {:.1}% ({}/{}) | {:.1}% ({}/{}) | {} |\n",
            c.dataset,
            c.baseline.accuracy,
            c.baseline.correct,
            c.baseline.total,
            c.candidate.accuracy,
            c.candidate.correct,
            c.candidate.total,
            signed(c.delta)
        ));
    }
    out.push('\n');

    for c in comparisons {
        out.push_str(&format!("## {}\n\n", c.dataset));
        out.push_str(&format!("| Class | {baseline} | {candidate} | Difference |\n"));
        out.push_str("|-------|---|---|------------|\n");
        for d in &c.per_class {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                d.class,
                fraction(&d.baseline),
                fraction(&d.candidate),
                signed(d.delta)
            ));
        }
        out.push('\n');
    }
    out
}

/// Write the markdown report to `path`, creating parent directories.
pub fn write_report(
    path: &Path,
    comparisons: &[DatasetComparison],
    generated_at: DateTime<Utc>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_report(comparisons, generated_at))?;
    Ok(())
}

/// Plain-text comparison printed by the CLI.
pub fn render_console_comparison(comparisons: &[DatasetComparison]) -> String {
    let baseline = Variant::Direct.display_name();
    let candidate = Variant::Agentic.display_name();
    let rule = "=".repeat(60);

    let mut out = String::new();
    for c in comparisons {
        out.push_str(&format!("{rule}\n{}\n{rule}\n", c.dataset));
        out.push_str(&format!(
            "{:<24}{:>12}{:>12}{:>12}\n",
            "Class", baseline, candidate, "Diff"
        ));
        out.push_str(&format!("{}\n", "-".repeat(60)));
        for d in &c.per_class {
            out.push_str(&format!(
                "{:<24}{:>12}{:>12}{:>12}\n",
                d.class,
                fraction(&d.baseline),
                fraction(&d.candidate),
                signed(d.delta)
            ));
        }
        out.push_str(&format!("{}\n", "-".repeat(60)));
        out.push_str(&format!(
            "{:<24}{:>11.1}%{:>11.1}%{:>12}\n\n",
            "OVERALL",
            c.baseline.accuracy,
            c.candidate.accuracy,
            signed(c.delta)
        ));
    }
    out
}
