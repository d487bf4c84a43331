use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{AccuracyField, ScopeFilter};

#[derive(Parser, Debug)]
#[command(
    name = "hdsweep",
    version,
    about = "Aggregation, comparison, and level-vector analysis for HDC sweep results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate one result CSV and report per-key means.
    Aggregate(AggregateArgs),
    /// Compare a candidate result CSV against a baseline.
    Compare(CompareArgs),
    /// Reconstruct per-scope accuracy matrices for the renderer.
    Heatmap(HeatmapArgs),
    /// Inter-level similarity and MDS analysis of a vector-memory file.
    Levels(LevelsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    #[arg(long)]
    pub results: PathBuf,

    #[arg(long, default_value = "analysis")]
    pub out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = AccuracyField::OverallAccuracy)]
    pub accuracy_field: AccuracyField,

    #[arg(long, value_enum, default_value_t = ScopeFilter::All)]
    pub scope: ScopeFilter,

    #[arg(long)]
    pub dataset: Option<i64>,

    #[arg(long = "exclude-dataset")]
    pub excluded_datasets: Vec<i64>,

    #[arg(long)]
    pub phase: Option<String>,

    #[arg(long, default_value_t = false)]
    pub group_by_phase: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(long)]
    pub baseline: PathBuf,

    #[arg(long)]
    pub candidate: PathBuf,

    #[arg(long, default_value = "analysis")]
    pub out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = AccuracyField::OverallAccuracy)]
    pub accuracy_field: AccuracyField,

    /// Tie tolerance for the accuracy delta.
    #[arg(long, default_value_t = 1e-9)]
    pub eps: f64,

    #[arg(long, value_enum, default_value_t = ScopeFilter::All)]
    pub scope: ScopeFilter,

    #[arg(long)]
    pub dataset: Option<i64>,

    #[arg(long = "exclude-dataset")]
    pub excluded_datasets: Vec<i64>,

    /// How many strongest win cases per side to log.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Args, Debug, Clone)]
pub struct HeatmapArgs {
    #[arg(long)]
    pub results: PathBuf,

    #[arg(long, default_value = "analysis")]
    pub out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = AccuracyField::OverallAccuracy)]
    pub accuracy_field: AccuracyField,

    #[arg(long, value_enum, default_value_t = ScopeFilter::All)]
    pub scope: ScopeFilter,

    #[arg(long)]
    pub dataset: Option<i64>,

    #[arg(long = "exclude-dataset")]
    pub excluded_datasets: Vec<i64>,

    #[arg(long)]
    pub phase: Option<String>,

    /// Fixed accuracy color range handed to the renderer.
    #[arg(long, default_value_t = 0.0)]
    pub vmin: f64,

    #[arg(long, default_value_t = 1.0)]
    pub vmax: f64,
}

#[derive(Args, Debug, Clone)]
pub struct LevelsArgs {
    /// Primary level-vector memory file.
    #[arg(long)]
    pub vectors: PathBuf,

    /// Optional second memory file analyzed side by side.
    #[arg(long)]
    pub compare_vectors: Option<PathBuf>,

    #[arg(long, default_value = "analysis")]
    pub out_dir: PathBuf,

    /// Shape fallbacks when the file header omits them.
    #[arg(long)]
    pub num_levels: Option<usize>,

    #[arg(long)]
    pub num_features: Option<usize>,

    #[arg(long)]
    pub dimension: Option<usize>,

    #[arg(long, default_value_t = 2)]
    pub mds_dim: usize,
}
