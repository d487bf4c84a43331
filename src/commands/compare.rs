use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AxisValues, aggregate, mean_map};
use crate::cli::CompareArgs;
use crate::compare::{
    Comparison, ExtremalHint, ScopeSummary, WinCounts, compare, extremal_hint, mean_delta,
    per_dimension_mean_delta, per_level_mean_delta, per_scope_summary, top_wins, win_counts,
};
use crate::config::AnalysisConfig;
use crate::matrix::{MatrixSlice, delta_matrix, value_range};
use crate::model::{ComparisonRow, ResultRecord, Winner};
use crate::results::load_result_records;
use crate::util::{now_utc_string, sha256_file, write_json_pretty, write_text_file};

use super::aggregate::scope_slice_label;

#[derive(Debug, Serialize)]
struct CompareManifest {
    generated_at: String,
    baseline_csv: String,
    baseline_sha256: String,
    candidate_csv: String,
    candidate_sha256: String,
    accuracy_column: &'static str,
    epsilon: f64,
    candidate_phase: Option<String>,
    baseline_skipped_rows: usize,
    candidate_skipped_rows: usize,
    compared_cases: usize,
    baseline_only_keys: usize,
    candidate_only_keys: usize,
    wins: WinCounts,
    mean_delta: f64,
    per_scope: BTreeMap<String, ScopeSummary>,
    by_dimension: BTreeMap<u32, f64>,
    by_level: BTreeMap<u32, f64>,
    dimension_hint: Option<ExtremalHint>,
    level_hint: Option<ExtremalHint>,
}

#[derive(Debug, Serialize)]
struct DeltaMatricesReport {
    generated_at: String,
    /// Symmetric color range for the renderer, sized to the largest
    /// absolute delta (or the fixed minimal range on degenerate input).
    value_range: (f64, f64),
    slices: Vec<MatrixSlice>,
}

pub fn run(args: CompareArgs) -> Result<()> {
    let config = AnalysisConfig {
        accuracy_field: args.accuracy_field,
        epsilon: args.eps,
        scope_filter: args.scope,
        dataset_filter: args.dataset,
        excluded_datasets: args.excluded_datasets.iter().copied().collect(),
        phase_filter: None,
    };

    let baseline_loaded = load_result_records(&args.baseline, &config)?;
    let candidate_loaded = load_result_records(&args.candidate, &config)?;
    info!(
        baseline = %args.baseline.display(),
        baseline_records = baseline_loaded.records.len(),
        candidate = %args.candidate.display(),
        candidate_records = candidate_loaded.records.len(),
        "loaded result csvs"
    );

    let candidate_phase = pick_candidate_phase(&candidate_loaded.phases_seen)?;
    if let Some(phase) = &candidate_phase {
        info!(phase = %phase, "selected candidate phase");
    }
    let candidate_records =
        filter_by_phase(candidate_loaded.records.clone(), candidate_phase.as_deref());

    let baseline_agg = aggregate(&baseline_loaded.records, false);
    let candidate_agg = aggregate(&candidate_records, false);
    let comparison = compare(&baseline_agg, &candidate_agg, config.epsilon)?;

    let counts = win_counts(&comparison.rows);
    let overall_delta = mean_delta(&comparison.rows);
    info!(
        compared = comparison.rows.len(),
        candidate_better = counts.candidate,
        baseline_better = counts.baseline,
        ties = counts.ties,
        mean_delta = format!("{overall_delta:+.4}"),
        baseline_only_keys = comparison.baseline_only,
        candidate_only_keys = comparison.candidate_only,
        "comparison summary"
    );

    log_top_wins(&comparison, args.top);

    let by_dimension = per_dimension_mean_delta(&comparison.rows);
    let by_level = per_level_mean_delta(&comparison.rows);
    let dimension_hint = extremal_hint(&by_dimension);
    let level_hint = extremal_hint(&by_level);
    if let Some(hint) = dimension_hint {
        info!(
            strongest_gain_dimension = hint.strongest_gain,
            strongest_loss_dimension = hint.strongest_loss,
            "observed pattern hint"
        );
    }
    if let Some(hint) = level_hint {
        info!(
            strongest_gain_levels = hint.strongest_gain,
            strongest_loss_levels = hint.strongest_loss,
            "observed pattern hint"
        );
    }

    let csv_path = args.out_dir.join("comparison.csv");
    write_text_file(&csv_path, &render_comparison_csv(&comparison.rows))?;
    info!(path = %csv_path.display(), "wrote comparison csv");

    let baseline_means = mean_map(&baseline_agg);
    let candidate_means = mean_map(&candidate_agg);
    let axes = AxisValues::from_keys(baseline_means.keys())
        .merged(&AxisValues::from_keys(candidate_means.keys()));

    let slices = axes
        .scopes
        .iter()
        .map(|(scope, dataset_id)| {
            let matrix = delta_matrix(&candidate_means, &baseline_means, scope, *dataset_id, &axes);
            MatrixSlice::new(scope_slice_label(scope, *dataset_id), &axes, &matrix)
        })
        .collect();

    let matrices = DeltaMatricesReport {
        generated_at: now_utc_string(),
        value_range: value_range(&candidate_means, &baseline_means),
        slices,
    };
    let matrices_path = args.out_dir.join("comparison_matrices.json");
    write_json_pretty(&matrices_path, &matrices)?;
    info!(path = %matrices_path.display(), "wrote delta matrices");

    let manifest = CompareManifest {
        generated_at: now_utc_string(),
        baseline_csv: args.baseline.display().to_string(),
        baseline_sha256: sha256_file(&args.baseline)?,
        candidate_csv: args.candidate.display().to_string(),
        candidate_sha256: sha256_file(&args.candidate)?,
        accuracy_column: config.accuracy_field.column_name(),
        epsilon: config.epsilon,
        candidate_phase,
        baseline_skipped_rows: baseline_loaded.skipped_rows,
        candidate_skipped_rows: candidate_loaded.skipped_rows,
        compared_cases: comparison.rows.len(),
        baseline_only_keys: comparison.baseline_only,
        candidate_only_keys: comparison.candidate_only,
        wins: counts,
        mean_delta: overall_delta,
        per_scope: per_scope_summary(&comparison.rows),
        by_dimension,
        by_level,
        dimension_hint,
        level_hint,
    };
    let manifest_path = args.out_dir.join("comparison_manifest.json");
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote comparison manifest");

    Ok(())
}

/// Chooses the candidate phase when the candidate CSV carries phase tags:
/// prefer `test`, otherwise accept a unique single phase, otherwise fail —
/// silently mixing phases would pool incomparable accuracies.
fn pick_candidate_phase(phases: &BTreeSet<String>) -> Result<Option<String>> {
    if phases.is_empty() {
        return Ok(None);
    }
    if phases.contains("test") {
        return Ok(Some("test".to_string()));
    }
    if phases.len() == 1 {
        return Ok(phases.iter().next().cloned());
    }
    bail!(
        "candidate csv contains multiple phases and no unique default: {:?}; keep only one phase in the input",
        phases
    );
}

fn filter_by_phase(records: Vec<ResultRecord>, phase: Option<&str>) -> Vec<ResultRecord> {
    let Some(wanted) = phase else {
        return records;
    };
    records
        .into_iter()
        .filter(|record| match &record.phase {
            // Rows without a phase tag always pass.
            None => true,
            Some(tag) => tag == wanted,
        })
        .collect()
}

fn log_top_wins(comparison: &Comparison, top: usize) {
    for row in top_wins(&comparison.rows, Winner::Candidate, top) {
        info!(
            case = %row.key,
            baseline = format!("{:.4}", row.baseline_mean),
            candidate = format!("{:.4}", row.candidate_mean),
            delta = format!("{:+.4}", row.delta),
            "candidate better"
        );
    }
    for row in top_wins(&comparison.rows, Winner::Baseline, top) {
        info!(
            case = %row.key,
            baseline = format!("{:.4}", row.baseline_mean),
            candidate = format!("{:.4}", row.candidate_mean),
            delta = format!("{:+.4}", row.delta),
            "baseline better"
        );
    }
}

fn render_comparison_csv(rows: &[ComparisonRow]) -> String {
    let mut out = String::from(
        "num_levels,vector_dimension,scope,dataset_id,baseline_mean_accuracy,candidate_mean_accuracy,delta,winner\n",
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{}",
            row.key.num_levels,
            row.key.vector_dimension,
            row.key.scope,
            row.key.dataset_id,
            row.baseline_mean,
            row.candidate_mean,
            row.delta,
            row.winner.as_str(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::model::{AggregateEntry, CompositeKey, NO_DATASET, Scope};

    #[test]
    fn candidate_phase_prefers_test_then_unique() {
        assert_eq!(pick_candidate_phase(&BTreeSet::new()).unwrap(), None);

        let tagged = BTreeSet::from(["preopt-val".to_string(), "test".to_string()]);
        assert_eq!(
            pick_candidate_phase(&tagged).unwrap(),
            Some("test".to_string())
        );

        let unique = BTreeSet::from(["postopt-val".to_string()]);
        assert_eq!(
            pick_candidate_phase(&unique).unwrap(),
            Some("postopt-val".to_string())
        );

        let ambiguous = BTreeSet::from(["preopt-val".to_string(), "postopt-val".to_string()]);
        assert!(pick_candidate_phase(&ambiguous).is_err());
    }

    #[test]
    fn phase_filter_keeps_untagged_rows() {
        let record = |phase: Option<&str>| ResultRecord {
            num_levels: 61,
            vector_dimension: 1024,
            scope: Scope::Overall,
            dataset_id: NO_DATASET,
            phase: phase.map(str::to_string),
            accuracy: 0.8,
            extra: BTreeMap::new(),
        };
        let records = vec![record(Some("test")), record(Some("val")), record(None)];
        let kept = filter_by_phase(records, Some("test"));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn comparison_csv_contains_exactly_one_expected_row() {
        let key = CompositeKey {
            num_levels: 61,
            vector_dimension: 1024,
            scope: Scope::Overall,
            dataset_id: NO_DATASET,
            phase: None,
        };
        let mut baseline = Aggregate::new();
        baseline.insert(
            key.clone(),
            AggregateEntry {
                sample_count: 1,
                mean_accuracy: 0.80,
            },
        );
        let mut candidate = Aggregate::new();
        candidate.insert(
            key,
            AggregateEntry {
                sample_count: 1,
                mean_accuracy: 0.83,
            },
        );

        let comparison = compare(&baseline, &candidate, 1e-9).unwrap();
        let csv = render_comparison_csv(&comparison.rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "num_levels,vector_dimension,scope,dataset_id,baseline_mean_accuracy,candidate_mean_accuracy,delta,winner"
        );
        assert!(lines[1].starts_with("61,1024,overall,-1,0.8,0.83,"));
        assert!(lines[1].ends_with(",candidate"));
        assert!((comparison.rows[0].delta - 0.03).abs() < 1e-12);
    }
}
