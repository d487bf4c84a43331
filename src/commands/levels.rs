use std::path::Path;

use anyhow::Result;
use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use crate::cli::LevelsArgs;
use crate::levels::{LevelVectorSet, ShapeDefaults, load_level_vectors};
use crate::mds::classical_mds;
use crate::similarity::{
    VectorMode, consecutive_distance_stats, detect_mode, distance_matrix, mean_similarity_matrix,
    min_max_level_distance,
};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

#[derive(Debug, Serialize)]
struct LevelSetReport {
    path: String,
    sha256: String,
    mode: VectorMode,
    num_levels: usize,
    num_features: usize,
    dimension: usize,
    /// Consecutive-distance curve: per-step mean and population std across
    /// features. Length L-1.
    consecutive_mean: Vec<f64>,
    consecutive_std: Vec<f64>,
    /// Distance between the first and last level, averaged across features.
    min_max_distance: f64,
    /// L-by-L pairwise similarity, averaged across features.
    similarity: Vec<Vec<f64>>,
    /// Classical-MDS coordinates, meaningful up to rotation/reflection.
    embedding: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct LevelsReport {
    generated_at: String,
    mds_dim: usize,
    primary: LevelSetReport,
    comparison: Option<LevelSetReport>,
}

pub fn run(args: LevelsArgs) -> Result<()> {
    let defaults = ShapeDefaults {
        num_levels: args.num_levels,
        num_features: args.num_features,
        dimension: args.dimension,
    };

    let primary = analyze_file(&args.vectors, defaults, args.mds_dim)?;
    let comparison = match &args.compare_vectors {
        Some(path) => Some(analyze_file(path, defaults, args.mds_dim)?),
        None => None,
    };

    let report = LevelsReport {
        generated_at: now_utc_string(),
        mds_dim: args.mds_dim,
        primary,
        comparison,
    };

    let report_path = args.out_dir.join("level_similarity.json");
    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), "wrote level similarity report");

    Ok(())
}

fn analyze_file(path: &Path, defaults: ShapeDefaults, mds_dim: usize) -> Result<LevelSetReport> {
    let set = load_level_vectors(path, defaults)?;
    let mode = detect_mode(&set);
    info!(
        path = %path.display(),
        mode = mode.as_str(),
        num_levels = set.num_levels,
        num_features = set.num_features,
        dimension = set.dimension,
        "loaded level vectors"
    );

    Ok(analyze_set(&set, mode, path.display().to_string(), sha256_file(path)?, mds_dim))
}

fn analyze_set(
    set: &LevelVectorSet,
    mode: VectorMode,
    path: String,
    sha256: String,
    mds_dim: usize,
) -> LevelSetReport {
    let (consecutive_mean, consecutive_std) = consecutive_distance_stats(set, mode);
    let similarity = mean_similarity_matrix(set, mode);
    let distances = distance_matrix(&similarity);
    let embedding = classical_mds(&distances, mds_dim);
    let min_max_distance = min_max_level_distance(set, mode);

    info!(
        min_max_distance = format!("{min_max_distance:.6}"),
        steps = consecutive_mean.len(),
        "level similarity analysis"
    );

    LevelSetReport {
        path,
        sha256,
        mode,
        num_levels: set.num_levels,
        num_features: set.num_features,
        dimension: set.dimension,
        consecutive_mean,
        consecutive_std,
        min_max_distance,
        similarity: rows_of(&similarity),
        embedding: rows_of(&embedding),
    }
}

fn rows_of(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix
        .rows()
        .into_iter()
        .map(|row| row.to_vec())
        .collect()
}
