use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AxisValues, aggregate, mean_map};
use crate::cli::HeatmapArgs;
use crate::config::AnalysisConfig;
use crate::matrix::{MatrixSlice, build_matrix};
use crate::results::load_result_records;
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

use super::aggregate::scope_slice_label;

#[derive(Debug, Serialize)]
struct HeatmapReport {
    generated_at: String,
    results_csv: String,
    results_sha256: String,
    accuracy_column: &'static str,
    skipped_rows: usize,
    /// Fixed accuracy color range for the renderer; the engine guarantees
    /// shape, ordering, and the missing sentinel, nothing aesthetic.
    value_range: (f64, f64),
    slices: Vec<MatrixSlice>,
}

pub fn run(args: HeatmapArgs) -> Result<()> {
    let config = AnalysisConfig {
        accuracy_field: args.accuracy_field,
        scope_filter: args.scope,
        dataset_filter: args.dataset,
        excluded_datasets: args.excluded_datasets.iter().copied().collect(),
        phase_filter: args.phase.clone(),
        ..AnalysisConfig::default()
    };

    let loaded = load_result_records(&args.results, &config)?;
    info!(
        path = %args.results.display(),
        records = loaded.records.len(),
        skipped_rows = loaded.skipped_rows,
        "loaded result csv"
    );

    let agg = aggregate(&loaded.records, false);
    let means = mean_map(&agg);
    let axes = AxisValues::from_keys(means.keys());

    let slices: Vec<MatrixSlice> = axes
        .scopes
        .iter()
        .map(|(scope, dataset_id)| {
            let matrix = build_matrix(&means, scope, *dataset_id, &axes);
            MatrixSlice::new(scope_slice_label(scope, *dataset_id), &axes, &matrix)
        })
        .collect();

    info!(
        scopes = slices.len(),
        levels = axes.levels.len(),
        dimensions = axes.dimensions.len(),
        "reconstructed accuracy matrices"
    );

    let report = HeatmapReport {
        generated_at: now_utc_string(),
        results_csv: args.results.display().to_string(),
        results_sha256: sha256_file(&args.results)?,
        accuracy_column: config.accuracy_field.column_name(),
        skipped_rows: loaded.skipped_rows,
        value_range: (args.vmin, args.vmax),
        slices,
    };

    let report_path = args.out_dir.join("accuracy_matrices.json");
    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), "wrote accuracy matrices");

    Ok(())
}
