use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::levels::LevelVectorSet;

/// Guard against zero-norm vectors in the cosine denominator.
const NORM_EPS: f64 = 1e-12;

/// Metric family governing one whole analysis run. There is no mixed-mode
/// handling: detection looks at every component of every vector once.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorMode {
    Binary,
    Continuous,
}

impl VectorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Continuous => "continuous",
        }
    }
}

/// Binary iff every component across all vectors is exactly 0 or 1.
pub fn detect_mode(set: &LevelVectorSet) -> VectorMode {
    let all_binary = set
        .components()
        .all(|component| *component == 0.0 || *component == 1.0);
    if all_binary {
        VectorMode::Binary
    } else {
        VectorMode::Continuous
    }
}

/// Mode-selected similarity in [0, 1] for the vectors produced here.
///
/// Binary vectors score `1 - mean fractional disagreement` (normalized
/// Hamming agreement); continuous vectors score cosine similarity with a
/// small additive epsilon in the denominator.
pub fn similarity(u: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>, mode: VectorMode) -> f64 {
    match mode {
        VectorMode::Binary => {
            if u.is_empty() {
                return 1.0;
            }
            let disagreements = u
                .iter()
                .zip(v.iter())
                .filter(|(a, b)| a != b)
                .count();
            1.0 - disagreements as f64 / u.len() as f64
        }
        VectorMode::Continuous => {
            let dot = u.dot(&v);
            let norm_u = u.dot(&u).sqrt();
            let norm_v = v.dot(&v).sqrt();
            dot / (norm_u * norm_v + NORM_EPS)
        }
    }
}

pub fn distance(u: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>, mode: VectorMode) -> f64 {
    1.0 - similarity(u, v, mode)
}

/// Distances between neighboring levels for one feature: length L-1, entry l
/// is `distance(level l, level l+1)`. This is the primary probe for the
/// externally generated level ordering — small, roughly monotonic values
/// indicate a well-formed quantization sequence, large jumps an upstream
/// defect.
pub fn consecutive_distances(set: &LevelVectorSet, feature: usize, mode: VectorMode) -> Vec<f64> {
    (0..set.num_levels.saturating_sub(1))
        .map(|level| {
            distance(
                set.vector(level, feature),
                set.vector(level + 1, feature),
                mode,
            )
        })
        .collect()
}

/// Per-level mean and population standard deviation of the consecutive
/// distances across all features.
pub fn consecutive_distance_stats(set: &LevelVectorSet, mode: VectorMode) -> (Vec<f64>, Vec<f64>) {
    let steps = set.num_levels.saturating_sub(1);
    if steps == 0 || set.num_features == 0 {
        return (Vec::new(), Vec::new());
    }

    let per_feature: Vec<Vec<f64>> = (0..set.num_features)
        .map(|feature| consecutive_distances(set, feature, mode))
        .collect();

    let count = set.num_features as f64;
    let mut means = Vec::with_capacity(steps);
    let mut stds = Vec::with_capacity(steps);

    for step in 0..steps {
        let mean = per_feature.iter().map(|curve| curve[step]).sum::<f64>() / count;
        let variance = per_feature
            .iter()
            .map(|curve| (curve[step] - mean).powi(2))
            .sum::<f64>()
            / count;
        means.push(mean);
        stds.push(variance.sqrt());
    }

    (means, stds)
}

/// L-by-L pairwise similarity averaged across features. Symmetric with a
/// unit diagonal for nonzero vectors.
pub fn mean_similarity_matrix(set: &LevelVectorSet, mode: VectorMode) -> Array2<f64> {
    let n = set.num_levels;
    let mut sum = Array2::zeros((n, n));

    for feature in 0..set.num_features {
        for i in 0..n {
            for j in i..n {
                let value = similarity(set.vector(i, feature), set.vector(j, feature), mode);
                sum[[i, j]] += value;
                if i != j {
                    sum[[j, i]] += value;
                }
            }
        }
    }

    sum / set.num_features as f64
}

/// Distance matrix derived from a similarity matrix: `D = 1 - S`.
pub fn distance_matrix(similarity: &Array2<f64>) -> Array2<f64> {
    similarity.mapv(|value| 1.0 - value)
}

/// Distance between the first and last level, averaged across features. A
/// healthy quantization ordering keeps the endpoints far apart.
pub fn min_max_level_distance(set: &LevelVectorSet, mode: VectorMode) -> f64 {
    if set.num_levels == 0 || set.num_features == 0 {
        return 0.0;
    }
    let last = set.num_levels - 1;
    (0..set.num_features)
        .map(|feature| distance(set.vector(0, feature), set.vector(last, feature), mode))
        .sum::<f64>()
        / set.num_features as f64
}
