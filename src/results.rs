use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::metadata::parse_info;
use crate::model::{NO_DATASET, ResultRecord, Scope};

/// Result of loading one sweep CSV. Malformed rows are skipped and counted,
/// uniformly across every command; they are never silently defaulted.
#[derive(Clone, Debug)]
pub struct LoadedRecords {
    pub records: Vec<ResultRecord>,
    pub skipped_rows: usize,
    /// Phase tags observed across the whole file, before phase filtering.
    pub phases_seen: BTreeSet<String>,
}

/// Loads and decodes one result CSV according to `config`.
pub fn load_result_records(path: &Path, config: &AnalysisConfig) -> Result<LoadedRecords> {
    if !path.is_file() {
        return Err(AnalysisError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let contents = fs::read_to_string(path).map_err(|err| AnalysisError::Schema {
        path: path.to_path_buf(),
        detail: format!("failed to read file: {err}"),
    })?;

    parse_result_records(&contents, path, config)
}

/// Decodes result rows from CSV text. Split out from the file wrapper so the
/// row policy is testable without touching the filesystem.
pub fn parse_result_records(
    contents: &str,
    path: &Path,
    config: &AnalysisConfig,
) -> Result<LoadedRecords> {
    let mut lines = contents.lines();
    let header_line = lines.next().ok_or_else(|| AnalysisError::Schema {
        path: path.to_path_buf(),
        detail: "file has no header row".to_string(),
    })?;

    let header = index_header(header_line);
    let accuracy_column = config.accuracy_field.column_name();
    let levels_idx = require_column(&header, "num_levels", path)?;
    let dimension_idx = require_column(&header, "vector_dimension", path)?;
    let accuracy_idx = require_column(&header, accuracy_column, path)?;
    let info_idx = header.get("info").copied();

    let mut records = Vec::new();
    let mut skipped_rows = 0_usize;
    let mut phases_seen = BTreeSet::new();

    for (line_no, line) in lines.enumerate() {
        // 1-based data row index, for diagnostics.
        let row = line_no + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_csv_line(line);
        let info_raw = info_idx
            .and_then(|idx| fields.get(idx))
            .map(String::as_str)
            .unwrap_or("");
        let info = parse_info(info_raw);

        if let Some(phase) = info.get("phase") {
            phases_seen.insert(phase.clone());
        }

        let Some(record) = decode_row(&fields, &info, levels_idx, dimension_idx, accuracy_idx)
        else {
            skipped_rows += 1;
            warn!(path = %path.display(), row, "skipping malformed result row");
            continue;
        };

        if !keep_record(&record, config) {
            continue;
        }

        records.push(record);
    }

    Ok(LoadedRecords {
        records,
        skipped_rows,
        phases_seen,
    })
}

fn decode_row(
    fields: &[String],
    info: &BTreeMap<String, String>,
    levels_idx: usize,
    dimension_idx: usize,
    accuracy_idx: usize,
) -> Option<ResultRecord> {
    let num_levels = fields.get(levels_idx)?.trim().parse::<u32>().ok()?;
    let vector_dimension = fields.get(dimension_idx)?.trim().parse::<u32>().ok()?;
    let accuracy = fields.get(accuracy_idx)?.trim().parse::<f64>().ok()?;

    let scope = info
        .get("scope")
        .map(|raw| Scope::parse(raw))
        .unwrap_or(Scope::Overall);
    let dataset_id = match info.get("dataset") {
        Some(raw) => raw.parse::<i64>().ok()?,
        None => NO_DATASET,
    };
    let phase = info.get("phase").cloned();

    let extra: BTreeMap<String, String> = info
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "scope" | "dataset" | "phase"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Some(ResultRecord {
        num_levels,
        vector_dimension,
        scope,
        dataset_id,
        phase,
        accuracy,
        extra,
    })
}

fn keep_record(record: &ResultRecord, config: &AnalysisConfig) -> bool {
    // Phase filtering only binds rows that actually carry a phase tag.
    if let (Some(wanted), Some(phase)) = (&config.phase_filter, &record.phase) {
        if phase != wanted {
            return false;
        }
    }

    if !config.scope_filter.matches(&record.scope) {
        return false;
    }

    if let Some(wanted) = config.dataset_filter {
        if record.dataset_id != wanted {
            return false;
        }
    }

    if record.scope == Scope::Dataset && config.excluded_datasets.contains(&record.dataset_id) {
        return false;
    }

    true
}

fn index_header(line: &str) -> BTreeMap<String, usize> {
    split_csv_line(line)
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_string(), idx))
        .collect()
}

fn require_column(header: &BTreeMap<String, usize>, name: &str, path: &Path) -> Result<usize> {
    header
        .get(name)
        .copied()
        .ok_or_else(|| AnalysisError::Schema {
            path: path.to_path_buf(),
            detail: format!("required column missing from header: {name}"),
        })
}

/// Splits one CSV line. Double-quoted fields may contain commas (the `info`
/// column is comma-joined metadata) and doubled quotes inside a quoted field
/// unescape to one quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::ScopeFilter;

    fn parse(contents: &str, config: &AnalysisConfig) -> LoadedRecords {
        parse_result_records(contents, &PathBuf::from("results.csv"), config)
            .expect("parse must succeed")
    }

    #[test]
    fn quoted_info_field_keeps_embedded_commas() {
        let csv = "num_levels,vector_dimension,overall_accuracy,info\n\
                   61,1024,0.80,\"scope=overall,phase=test\"\n";
        let loaded = parse(csv, &AnalysisConfig::default());
        assert_eq!(loaded.records.len(), 1);
        let record = &loaded.records[0];
        assert_eq!(record.scope, Scope::Overall);
        assert_eq!(record.phase.as_deref(), Some("test"));
        assert_eq!(record.dataset_id, NO_DATASET);
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let csv = "num_levels,vector_dimension,overall_accuracy,info\n\
                   61,1024,0.80,scope=overall\n\
                   not_a_number,1024,0.81,scope=overall\n\
                   61,2048,broken,scope=overall\n\
                   31,512,0.70,\"scope=dataset,dataset=2\"\n";
        let loaded = parse(csv, &AnalysisConfig::default());
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped_rows, 2);
    }

    #[test]
    fn missing_required_column_is_a_schema_error() {
        let csv = "num_levels,vector_dimension,info\n61,1024,scope=overall\n";
        let err = parse_result_records(
            csv,
            &PathBuf::from("results.csv"),
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Schema { .. }));
        assert!(format!("{err}").contains("overall_accuracy"));
    }

    #[test]
    fn phase_filter_only_binds_tagged_rows() {
        let csv = "num_levels,vector_dimension,overall_accuracy,info\n\
                   61,1024,0.80,\"scope=overall,phase=val\"\n\
                   61,1024,0.82,\"scope=overall,phase=test\"\n\
                   61,2048,0.85,scope=overall\n";
        let config = AnalysisConfig {
            phase_filter: Some("test".to_string()),
            ..AnalysisConfig::default()
        };
        let loaded = parse(csv, &config);
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(
            loaded.phases_seen,
            BTreeSet::from(["val".to_string(), "test".to_string()])
        );
    }

    #[test]
    fn scope_and_dataset_filters_apply_at_load() {
        let csv = "num_levels,vector_dimension,overall_accuracy,info\n\
                   61,1024,0.80,scope=overall\n\
                   61,1024,0.75,\"scope=dataset,dataset=1\"\n\
                   61,1024,0.78,\"scope=dataset,dataset=2\"\n";
        let config = AnalysisConfig {
            scope_filter: ScopeFilter::Dataset,
            excluded_datasets: BTreeSet::from([1]),
            ..AnalysisConfig::default()
        };
        let loaded = parse(csv, &config);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].dataset_id, 2);
    }

    #[test]
    fn unrecognized_info_keys_land_in_extra() {
        let csv = "num_levels,vector_dimension,overall_accuracy,info\n\
                   61,1024,0.80,\"scope=overall,seed=42\"\n";
        let loaded = parse(csv, &AnalysisConfig::default());
        assert_eq!(loaded.records[0].extra["seed"], "42");
    }

    #[test]
    fn missing_file_is_reported_immediately() {
        let err = load_result_records(
            &PathBuf::from("/nonexistent/results.csv"),
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingFile { .. }));
    }
}
