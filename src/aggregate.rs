use std::collections::BTreeMap;

use crate::model::{AggregateEntry, CompositeKey, ResultRecord, Scope};

/// Keyed per-bucket means. BTreeMap keeps iteration in ascending key order,
/// so downstream output is reproducible regardless of input row order.
pub type Aggregate = BTreeMap<CompositeKey, AggregateEntry>;

/// Groups records by composite key and computes the per-key sample mean.
///
/// With `group_by_phase` unset, the phase tag does not participate in the key
/// and repeated trials across phases pool together. The fold is commutative
/// (sum plus count), so input order cannot affect the means. Zero-sample
/// entries are never materialized; querying an absent key answers `None`.
pub fn aggregate(records: &[ResultRecord], group_by_phase: bool) -> Aggregate {
    let mut sums: BTreeMap<CompositeKey, (f64, usize)> = BTreeMap::new();

    for record in records {
        let key = CompositeKey {
            num_levels: record.num_levels,
            vector_dimension: record.vector_dimension,
            scope: record.scope.clone(),
            dataset_id: record.dataset_id,
            phase: if group_by_phase {
                record.phase.clone()
            } else {
                None
            },
        };
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += record.accuracy;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(key, (sum, count))| {
            (
                key,
                AggregateEntry {
                    sample_count: count,
                    mean_accuracy: sum / count as f64,
                },
            )
        })
        .collect()
}

/// Per-key means, the view the comparator and matrix builder consume.
pub fn mean_map(aggregate: &Aggregate) -> BTreeMap<CompositeKey, f64> {
    aggregate
        .iter()
        .map(|(key, entry)| (key.clone(), entry.mean_accuracy))
        .collect()
}

/// The shared axis-index assignment: sorted unique axis values over the whole
/// dataset, plus the ordered scope slices (overall first, then datasets
/// ascending, then anything else). Computed once and handed to every matrix
/// build so all scope slices share one shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AxisValues {
    pub levels: Vec<u32>,
    pub dimensions: Vec<u32>,
    pub scopes: Vec<(Scope, i64)>,
}

impl AxisValues {
    pub fn from_keys<'a>(keys: impl Iterator<Item = &'a CompositeKey>) -> Self {
        let mut levels = Vec::new();
        let mut dimensions = Vec::new();
        let mut scopes = Vec::new();

        for key in keys {
            levels.push(key.num_levels);
            dimensions.push(key.vector_dimension);
            let scope = (key.scope.clone(), key.dataset_id);
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        levels.sort_unstable();
        levels.dedup();
        dimensions.sort_unstable();
        dimensions.dedup();
        // Scope ordering delegates to the Scope enum: overall, datasets by
        // ascending id, then other tags lexicographically.
        scopes.sort();

        Self {
            levels,
            dimensions,
            scopes,
        }
    }

    /// Union of two axis sets, for comparisons spanning two aggregates.
    pub fn merged(&self, other: &Self) -> Self {
        let mut levels = [self.levels.as_slice(), other.levels.as_slice()].concat();
        levels.sort_unstable();
        levels.dedup();

        let mut dimensions = [self.dimensions.as_slice(), other.dimensions.as_slice()].concat();
        dimensions.sort_unstable();
        dimensions.dedup();

        let mut scopes = self.scopes.clone();
        for scope in &other.scopes {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        scopes.sort();

        Self {
            levels,
            dimensions,
            scopes,
        }
    }
}
