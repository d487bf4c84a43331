use std::collections::BTreeSet;

use clap::ValueEnum;

use crate::model::Scope;

/// Which accuracy column of the result CSV feeds the engine. This is a fixed
/// configuration choice, never auto-detected from the file.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum AccuracyField {
    OverallAccuracy,
    ClassAverageAccuracy,
}

impl AccuracyField {
    pub fn column_name(self) -> &'static str {
        match self {
            Self::OverallAccuracy => "overall_accuracy",
            Self::ClassAverageAccuracy => "class_average_accuracy",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ScopeFilter {
    All,
    Overall,
    Dataset,
}

impl ScopeFilter {
    pub fn matches(self, scope: &Scope) -> bool {
        match self {
            Self::All => true,
            Self::Overall => matches!(scope, Scope::Overall),
            Self::Dataset => matches!(scope, Scope::Dataset),
        }
    }
}

/// Effective configuration shared by the loader, aggregator, comparator, and
/// matrix builder. Built once from CLI arguments and passed in explicitly.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub accuracy_field: AccuracyField,
    /// Numerical-equality tolerance for tie classification, not a
    /// significance threshold.
    pub epsilon: f64,
    pub scope_filter: ScopeFilter,
    /// If set, keep only dataset-scoped rows with this dataset id.
    pub dataset_filter: Option<i64>,
    /// Dataset ids dropped from dataset-scoped rows before aggregation.
    pub excluded_datasets: BTreeSet<i64>,
    /// If set, rows carrying a phase tag must match it. Rows without a phase
    /// tag always pass.
    pub phase_filter: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            accuracy_field: AccuracyField::OverallAccuracy,
            epsilon: 1e-9,
            scope_filter: ScopeFilter::All,
            dataset_filter: None,
            excluded_datasets: BTreeSet::new(),
            phase_filter: None,
        }
    }
}
