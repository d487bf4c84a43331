use std::collections::BTreeSet;
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{Aggregate, AxisValues, aggregate};
use crate::cli::AggregateArgs;
use crate::config::AnalysisConfig;
use crate::results::load_result_records;
use crate::util::{now_utc_string, sha256_file, write_json_pretty, write_text_file};

#[derive(Debug, Serialize)]
struct AggregateManifest {
    generated_at: String,
    results_csv: String,
    results_sha256: String,
    accuracy_column: &'static str,
    record_count: usize,
    skipped_rows: usize,
    key_count: usize,
    phases_seen: BTreeSet<String>,
    levels: Vec<u32>,
    dimensions: Vec<u32>,
    scopes: Vec<String>,
    mean_of_means: Option<f64>,
    std_of_means: Option<f64>,
    min_mean: Option<f64>,
    max_mean: Option<f64>,
}

pub fn run(args: AggregateArgs) -> Result<()> {
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

    let agg = aggregate(&loaded.records, args.group_by_phase);
    let axes = AxisValues::from_keys(agg.keys());

    let means: Vec<f64> = agg.values().map(|entry| entry.mean_accuracy).collect();
    let stats = summary_stats(&means);
    if let Some((mean, std, min, max)) = stats {
        info!(
            keys = agg.len(),
            mean = format!("{mean:.6}"),
            std = format!("{std:.6}"),
            min = format!("{min:.6}"),
            max = format!("{max:.6}"),
            "aggregated per-key means"
        );
    }

    let csv_path = args.out_dir.join("aggregate_means.csv");
    write_text_file(&csv_path, &render_aggregate_csv(&agg))?;
    info!(path = %csv_path.display(), "wrote aggregate csv");

    let manifest = AggregateManifest {
        generated_at: now_utc_string(),
        results_csv: args.results.display().to_string(),
        results_sha256: sha256_file(&args.results)?,
        accuracy_column: config.accuracy_field.column_name(),
        record_count: loaded.records.len(),
        skipped_rows: loaded.skipped_rows,
        key_count: agg.len(),
        phases_seen: loaded.phases_seen,
        levels: axes.levels.clone(),
        dimensions: axes.dimensions.clone(),
        scopes: axes
            .scopes
            .iter()
            .map(|(scope, dataset_id)| scope_slice_label(scope, *dataset_id))
            .collect(),
        mean_of_means: stats.map(|s| s.0),
        std_of_means: stats.map(|s| s.1),
        min_mean: stats.map(|s| s.2),
        max_mean: stats.map(|s| s.3),
    };

    let manifest_path = args.out_dir.join("aggregate_manifest.json");
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote aggregate manifest");

    Ok(())
}

pub(crate) fn scope_slice_label(scope: &crate::model::Scope, dataset_id: i64) -> String {
    use crate::model::Scope;
    match scope {
        Scope::Overall => "overall".to_string(),
        Scope::Dataset => format!("dataset_{dataset_id}"),
        Scope::Other(tag) => format!("{tag}_{dataset_id}"),
    }
}

fn render_aggregate_csv(agg: &Aggregate) -> String {
    let mut out =
        String::from("num_levels,vector_dimension,scope,dataset_id,phase,sample_count,mean_accuracy\n");
    for (key, entry) in agg {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            key.num_levels,
            key.vector_dimension,
            key.scope,
            key.dataset_id,
            key.phase.as_deref().unwrap_or(""),
            entry.sample_count,
            entry.mean_accuracy,
        );
    }
    out
}

fn summary_stats(values: &[f64]) -> Option<(f64, f64, f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((mean, variance.sqrt(), min, max))
}
