use std::collections::BTreeMap;

use ndarray::Array2;
use serde::Serialize;

use crate::aggregate::AxisValues;
use crate::model::{CompositeKey, Scope};

/// Fallback symmetric range when no valid overlapping deltas exist.
const DEGENERATE_RANGE: (f64, f64) = (-0.1, 0.1);

fn lookup_key(levels: u32, dimension: u32, scope: &Scope, dataset_id: i64) -> CompositeKey {
    CompositeKey {
        num_levels: levels,
        vector_dimension: dimension,
        scope: scope.clone(),
        dataset_id,
        phase: None,
    }
}

/// Reconstructs the dense levels-by-dimensions matrix for one scope slice.
///
/// Rows follow `axes.levels`, columns `axes.dimensions` — the union of all
/// observed axis values, so every scope slice shares one shape and only the
/// cell values differ. Missing cells are NaN, the engine-wide missing
/// sentinel, which propagates through arithmetic instead of collapsing to
/// zero.
pub fn build_matrix(
    means: &BTreeMap<CompositeKey, f64>,
    scope: &Scope,
    dataset_id: i64,
    axes: &AxisValues,
) -> Array2<f64> {
    let mut matrix = Array2::from_elem((axes.levels.len(), axes.dimensions.len()), f64::NAN);

    for (i, &level) in axes.levels.iter().enumerate() {
        for (j, &dimension) in axes.dimensions.iter().enumerate() {
            if let Some(value) = means.get(&lookup_key(level, dimension, scope, dataset_id)) {
                matrix[[i, j]] = *value;
            }
        }
    }

    matrix
}

/// Cell-wise `current - previous` for one scope slice. A missing cell on
/// either side stays missing in the delta.
pub fn delta_matrix(
    current: &BTreeMap<CompositeKey, f64>,
    previous: &BTreeMap<CompositeKey, f64>,
    scope: &Scope,
    dataset_id: i64,
    axes: &AxisValues,
) -> Array2<f64> {
    let current = build_matrix(current, scope, dataset_id, axes);
    let previous = build_matrix(previous, scope, dataset_id, axes);
    &current - &previous
}

/// Symmetric `[-v, v]` color range sized to the largest absolute delta over
/// the key union of both maps. Degenerate input (no overlapping finite
/// values, or all-zero deltas) falls back to a fixed minimal range.
pub fn value_range(
    map_a: &BTreeMap<CompositeKey, f64>,
    map_b: &BTreeMap<CompositeKey, f64>,
) -> (f64, f64) {
    let mut largest = 0.0_f64;
    let mut seen_any = false;

    for key in map_a.keys().chain(map_b.keys()) {
        let (Some(a), Some(b)) = (map_a.get(key), map_b.get(key)) else {
            continue;
        };
        let delta = a - b;
        if !delta.is_finite() {
            continue;
        }
        seen_any = true;
        largest = largest.max(delta.abs());
    }

    if !seen_any || largest == 0.0 {
        return DEGENERATE_RANGE;
    }
    (-largest, largest)
}

/// Renderer-facing view of one matrix slice. The only contract is shape,
/// ordering, and the missing sentinel (NaN maps to JSON null).
#[derive(Clone, Debug, Serialize)]
pub struct MatrixSlice {
    pub label: String,
    pub row_levels: Vec<u32>,
    pub col_dimensions: Vec<u32>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl MatrixSlice {
    pub fn new(label: String, axes: &AxisValues, matrix: &Array2<f64>) -> Self {
        let values = matrix
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|value| if value.is_nan() { None } else { Some(*value) })
                    .collect()
            })
            .collect();

        Self {
            label,
            row_levels: axes.levels.clone(),
            col_dimensions: axes.dimensions.clone(),
            values,
        }
    }
}
