use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Aggregation granularity of one result row. Ordering puts the pooled
/// overall slice first, then per-dataset slices, then anything else, which is
/// also the panel order handed to the renderer.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Overall,
    Dataset,
    Other(String),
}

impl Scope {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "overall" => Self::Overall,
            "dataset" => Self::Dataset,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Overall => "overall",
            Self::Dataset => "dataset",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset id sentinel for rows without a dataset tag.
pub const NO_DATASET: i64 = -1;

/// One aggregation-ready data point, decoded once at the input boundary.
/// Unrecognized info keys are retained verbatim in `extra`.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    pub num_levels: u32,
    pub vector_dimension: u32,
    pub scope: Scope,
    pub dataset_id: i64,
    pub phase: Option<String>,
    pub accuracy: f64,
    pub extra: BTreeMap<String, String>,
}

/// The parameter tuple identifying one aggregation bucket. `phase` is `None`
/// for every key unless grouping by phase was requested, so keys stay
/// comparable within one aggregate. Ordering is derived field order, which
/// gives the deterministic ascending iteration the comparison and matrix
/// outputs rely on.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CompositeKey {
    pub num_levels: u32,
    pub vector_dimension: u32,
    pub scope: Scope,
    pub dataset_id: i64,
    pub phase: Option<String>,
}

impl CompositeKey {
    pub fn scope_label(&self) -> String {
        match self.scope {
            Scope::Overall => "overall".to_string(),
            Scope::Dataset => format!("dataset_{}", self.dataset_id),
            Scope::Other(ref tag) => format!("{}_{}", tag, self.dataset_id),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope == Scope::Dataset {
            write!(
                f,
                "L={} D={} dataset={}",
                self.num_levels, self.vector_dimension, self.dataset_id
            )
        } else {
            write!(
                f,
                "L={} D={} scope={}",
                self.num_levels, self.vector_dimension, self.scope
            )
        }
    }
}

/// Per-key aggregate. Never materialized for zero samples.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AggregateEntry {
    pub sample_count: usize,
    pub mean_accuracy: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Baseline,
    Candidate,
    Tie,
}

impl Winner {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Candidate => "candidate",
            Self::Tie => "tie",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ComparisonRow {
    pub key: CompositeKey,
    pub baseline_mean: f64,
    pub candidate_mean: f64,
    pub delta: f64,
    pub winner: Winner,
}
