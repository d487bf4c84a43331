use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures of the aggregation/comparison/similarity engine.
///
/// Row-level schema problems are deliberately not represented here: malformed
/// rows are skipped and counted by the loader, uniformly across every command.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("missing input file: {path}")]
    MissingFile { path: PathBuf },

    #[error("schema error in {path}: {detail}")]
    Schema { path: PathBuf, detail: String },

    #[error("shape mismatch in {path} at row {row}: {detail}")]
    ShapeMismatch {
        path: PathBuf,
        row: usize,
        detail: String,
    },

    #[error("no overlapping composite keys between baseline and candidate aggregates")]
    EmptyIntersection,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
