use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::Aggregate;
use crate::error::{AnalysisError, Result};
use crate::model::{ComparisonRow, Winner};

/// Key-wise comparison of two aggregates over their key intersection.
/// One-sided keys are dropped from the rows but counted for diagnostics.
#[derive(Clone, Debug)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
    pub baseline_only: usize,
    pub candidate_only: usize,
}

/// Compares candidate means against baseline means.
///
/// `delta = candidate - baseline`; the candidate wins iff `delta > epsilon`,
/// the baseline iff `delta < -epsilon`, everything else is a tie (so the
/// boundary `delta == epsilon` ties). Epsilon is a numerical-equality
/// tolerance, not a significance threshold.
pub fn compare(baseline: &Aggregate, candidate: &Aggregate, epsilon: f64) -> Result<Comparison> {
    let mut rows = Vec::new();

    for (key, baseline_entry) in baseline {
        let Some(candidate_entry) = candidate.get(key) else {
            continue;
        };
        let baseline_mean = baseline_entry.mean_accuracy;
        let candidate_mean = candidate_entry.mean_accuracy;
        let delta = candidate_mean - baseline_mean;

        let winner = if delta > epsilon {
            Winner::Candidate
        } else if delta < -epsilon {
            Winner::Baseline
        } else {
            Winner::Tie
        };

        rows.push(ComparisonRow {
            key: key.clone(),
            baseline_mean,
            candidate_mean,
            delta,
            winner,
        });
    }

    if rows.is_empty() {
        return Err(AnalysisError::EmptyIntersection);
    }

    let shared = rows.len();
    Ok(Comparison {
        baseline_only: baseline.len() - shared,
        candidate_only: candidate.len() - shared,
        rows,
    })
}

pub fn mean_delta(rows: &[ComparisonRow]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|row| row.delta).sum::<f64>() / rows.len() as f64
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct WinCounts {
    pub candidate: usize,
    pub baseline: usize,
    pub ties: usize,
}

pub fn win_counts(rows: &[ComparisonRow]) -> WinCounts {
    let mut counts = WinCounts::default();
    for row in rows {
        match row.winner {
            Winner::Candidate => counts.candidate += 1,
            Winner::Baseline => counts.baseline += 1,
            Winner::Tie => counts.ties += 1,
        }
    }
    counts
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopeSummary {
    pub mean_delta: f64,
    pub better: usize,
    pub worse: usize,
    pub even: usize,
    pub total: usize,
}

/// Per-scope mean delta with win/loss/even counts, keyed by the scope label
/// (`overall`, `dataset_<id>`, ...). Sign counts use the raw delta, so
/// within-tolerance wobble still shows up as better/worse here while the
/// winner column stays a tie.
pub fn per_scope_summary(rows: &[ComparisonRow]) -> BTreeMap<String, ScopeSummary> {
    let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.key.scope_label())
            .or_default()
            .push(row.delta);
    }

    grouped
        .into_iter()
        .map(|(label, deltas)| {
            let total = deltas.len();
            let mean = deltas.iter().sum::<f64>() / total as f64;
            let better = deltas.iter().filter(|delta| **delta > 0.0).count();
            let worse = deltas.iter().filter(|delta| **delta < 0.0).count();
            (
                label,
                ScopeSummary {
                    mean_delta: mean,
                    better,
                    worse,
                    even: total - better - worse,
                    total,
                },
            )
        })
        .collect()
}

/// Mean delta per vector dimension, ascending by dimension.
pub fn per_dimension_mean_delta(rows: &[ComparisonRow]) -> BTreeMap<u32, f64> {
    axis_mean_delta(rows, |row| row.key.vector_dimension)
}

/// Mean delta per level count, ascending by level count.
pub fn per_level_mean_delta(rows: &[ComparisonRow]) -> BTreeMap<u32, f64> {
    axis_mean_delta(rows, |row| row.key.num_levels)
}

fn axis_mean_delta(rows: &[ComparisonRow], axis: impl Fn(&ComparisonRow) -> u32) -> BTreeMap<u32, f64> {
    let mut grouped: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for row in rows {
        let entry = grouped.entry(axis(row)).or_insert((0.0, 0));
        entry.0 += row.delta;
        entry.1 += 1;
    }
    grouped
        .into_iter()
        .map(|(value, (sum, count))| (value, sum / count as f64))
        .collect()
}

/// Axis values with the largest and smallest mean delta. Ties break toward
/// the smallest axis value: iteration ascends and only a strictly better mean
/// displaces the current extremum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ExtremalHint {
    pub strongest_gain: u32,
    pub strongest_loss: u32,
}

pub fn extremal_hint(axis_means: &BTreeMap<u32, f64>) -> Option<ExtremalHint> {
    let mut best: Option<(u32, f64)> = None;
    let mut worst: Option<(u32, f64)> = None;

    for (&value, &mean) in axis_means {
        match best {
            Some((_, current)) if mean <= current => {}
            _ => best = Some((value, mean)),
        }
        match worst {
            Some((_, current)) if mean >= current => {}
            _ => worst = Some((value, mean)),
        }
    }

    Some(ExtremalHint {
        strongest_gain: best?.0,
        strongest_loss: worst?.0,
    })
}

/// The N strongest wins for one side, ordered by decreasing margin.
pub fn top_wins(rows: &[ComparisonRow], side: Winner, n: usize) -> Vec<ComparisonRow> {
    let mut wins: Vec<ComparisonRow> = rows
        .iter()
        .filter(|row| row.winner == side)
        .cloned()
        .collect();
    // Candidate margins are positive deltas, baseline margins negative.
    match side {
        Winner::Candidate => wins.sort_by(|a, b| b.delta.total_cmp(&a.delta)),
        Winner::Baseline => wins.sort_by(|a, b| a.delta.total_cmp(&b.delta)),
        Winner::Tie => {}
    }
    wins.truncate(n);
    wins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AggregateEntry, CompositeKey, NO_DATASET, Scope};

    fn key(levels: u32, dim: u32) -> CompositeKey {
        CompositeKey {
            num_levels: levels,
            vector_dimension: dim,
            scope: Scope::Overall,
            dataset_id: NO_DATASET,
            phase: None,
        }
    }

    fn entry(mean: f64) -> AggregateEntry {
        AggregateEntry {
            sample_count: 1,
            mean_accuracy: mean,
        }
    }

    #[test]
    fn identical_aggregates_tie_everywhere() {
        let mut agg = Aggregate::new();
        agg.insert(key(31, 1024), entry(0.7));
        agg.insert(key(61, 2048), entry(0.9));

        let comparison = compare(&agg, &agg, 1e-9).unwrap();
        assert_eq!(comparison.rows.len(), 2);
        assert!(comparison.rows.iter().all(|row| row.winner == Winner::Tie));
        assert_eq!(mean_delta(&comparison.rows), 0.0);
        assert_eq!(comparison.baseline_only, 0);
        assert_eq!(comparison.candidate_only, 0);
    }

    #[test]
    fn delta_equal_to_epsilon_is_a_tie() {
        // Exactly representable values so delta == eps holds bit-for-bit.
        let eps = 0.25;
        let mut baseline = Aggregate::new();
        baseline.insert(key(61, 1024), entry(0.5));

        let mut candidate = Aggregate::new();
        candidate.insert(key(61, 1024), entry(0.75));
        let comparison = compare(&baseline, &candidate, eps).unwrap();
        assert_eq!(comparison.rows[0].winner, Winner::Tie);

        // One ulp past the tolerance flips to candidate.
        let past = f64::from_bits(0.75_f64.to_bits() + 1);
        candidate.insert(key(61, 1024), entry(past));
        let comparison = compare(&baseline, &candidate, eps).unwrap();
        assert_eq!(comparison.rows[0].winner, Winner::Candidate);
    }

    #[test]
    fn empty_intersection_is_fatal() {
        let mut baseline = Aggregate::new();
        baseline.insert(key(31, 1024), entry(0.7));
        let mut candidate = Aggregate::new();
        candidate.insert(key(61, 1024), entry(0.8));

        let err = compare(&baseline, &candidate, 1e-9).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyIntersection));
    }

    #[test]
    fn one_sided_keys_are_counted() {
        let mut baseline = Aggregate::new();
        baseline.insert(key(31, 1024), entry(0.7));
        baseline.insert(key(61, 1024), entry(0.8));
        let mut candidate = Aggregate::new();
        candidate.insert(key(61, 1024), entry(0.85));
        candidate.insert(key(61, 2048), entry(0.8));
        candidate.insert(key(61, 4096), entry(0.8));

        let comparison = compare(&baseline, &candidate, 1e-9).unwrap();
        assert_eq!(comparison.rows.len(), 1);
        assert_eq!(comparison.baseline_only, 1);
        assert_eq!(comparison.candidate_only, 2);
    }

    #[test]
    fn single_shared_key_end_to_end() {
        let mut baseline = Aggregate::new();
        baseline.insert(key(61, 1024), entry(0.80));
        let mut candidate = Aggregate::new();
        candidate.insert(key(61, 1024), entry(0.83));

        let comparison = compare(&baseline, &candidate, 1e-9).unwrap();
        assert_eq!(comparison.rows.len(), 1);
        let row = &comparison.rows[0];
        assert!((row.delta - 0.03).abs() < 1e-12);
        assert_eq!(row.winner, Winner::Candidate);
        assert_eq!(row.baseline_mean, 0.80);
        assert_eq!(row.candidate_mean, 0.83);
    }

    #[test]
    fn summaries_group_by_scope_and_axes() {
        let rows = vec![
            ComparisonRow {
                key: key(31, 1024),
                baseline_mean: 0.7,
                candidate_mean: 0.8,
                delta: 0.1,
                winner: Winner::Candidate,
            },
            ComparisonRow {
                key: key(61, 1024),
                baseline_mean: 0.8,
                candidate_mean: 0.76,
                delta: -0.04,
                winner: Winner::Baseline,
            },
            ComparisonRow {
                key: CompositeKey {
                    scope: Scope::Dataset,
                    dataset_id: 2,
                    ..key(61, 2048)
                },
                baseline_mean: 0.8,
                candidate_mean: 0.8,
                delta: 0.0,
                winner: Winner::Tie,
            },
        ];

        let counts = win_counts(&rows);
        assert_eq!(counts.candidate, 1);
        assert_eq!(counts.baseline, 1);
        assert_eq!(counts.ties, 1);

        let scopes = per_scope_summary(&rows);
        assert_eq!(scopes["overall"].total, 2);
        assert_eq!(scopes["overall"].better, 1);
        assert_eq!(scopes["overall"].worse, 1);
        assert_eq!(scopes["overall"].even, 0);
        assert_eq!(scopes["dataset_2"].total, 1);
        assert_eq!(scopes["dataset_2"].even, 1);

        let by_dim = per_dimension_mean_delta(&rows);
        assert!((by_dim[&1024] - 0.03).abs() < 1e-12);
        assert_eq!(by_dim[&2048], 0.0);

        let by_level = per_level_mean_delta(&rows);
        assert!((by_level[&31] - 0.1).abs() < 1e-12);
        assert!((by_level[&61] - (-0.02)).abs() < 1e-12);
    }

    #[test]
    fn extremal_hint_breaks_ties_toward_smallest_axis_value() {
        let means = BTreeMap::from([(512_u32, 0.05), (1024, 0.05), (2048, -0.01)]);
        let hint = extremal_hint(&means).unwrap();
        assert_eq!(hint.strongest_gain, 512);
        assert_eq!(hint.strongest_loss, 2048);
        assert!(extremal_hint(&BTreeMap::new()).is_none());
    }

    #[test]
    fn top_wins_orders_by_margin() {
        let rows = vec![
            ComparisonRow {
                key: key(31, 1024),
                baseline_mean: 0.7,
                candidate_mean: 0.72,
                delta: 0.02,
                winner: Winner::Candidate,
            },
            ComparisonRow {
                key: key(61, 1024),
                baseline_mean: 0.7,
                candidate_mean: 0.78,
                delta: 0.08,
                winner: Winner::Candidate,
            },
            ComparisonRow {
                key: key(91, 1024),
                baseline_mean: 0.8,
                candidate_mean: 0.7,
                delta: -0.1,
                winner: Winner::Baseline,
            },
        ];
        let candidate_wins = top_wins(&rows, Winner::Candidate, 1);
        assert_eq!(candidate_wins.len(), 1);
        assert_eq!(candidate_wins[0].key.num_levels, 61);

        let baseline_wins = top_wins(&rows, Winner::Baseline, 5);
        assert_eq!(baseline_wins.len(), 1);
        assert_eq!(baseline_wins[0].key.num_levels, 91);
    }
}
