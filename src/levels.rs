use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ndarray::{Array2, ArrayView1};
use regex::Regex;
use tracing::warn;

use crate::error::{AnalysisError, Result};

/// An ordered sequence of quantization levels, each holding one or more
/// fixed-dimension memory vectors. Rows are level-major: all feature vectors
/// of level 0 first, then level 1, and so on. Loaded once per analysis,
/// immutable afterward.
#[derive(Clone, Debug)]
pub struct LevelVectorSet {
    pub num_levels: usize,
    pub num_features: usize,
    pub dimension: usize,
    data: Array2<f64>,
}

impl LevelVectorSet {
    pub fn vector(&self, level: usize, feature: usize) -> ArrayView1<'_, f64> {
        self.data.row(level * self.num_features + feature)
    }

    pub fn components(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }
}

/// Shape fallbacks used when the file header omits a value. The header, when
/// present, only validates or defaults shape; it never changes the layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShapeDefaults {
    pub num_levels: Option<usize>,
    pub num_features: Option<usize>,
    pub dimension: Option<usize>,
}

/// Loads a level-vector memory file.
///
/// Two layouts are accepted: a plain-text file with one bitstring per line
/// and no header, or a header-annotated flat file
/// (`#item_mem,num_vectors=<N>,dimension=<D>[,...]`) followed by
/// comma-separated numeric rows.
pub fn load_level_vectors(path: &Path, defaults: ShapeDefaults) -> Result<LevelVectorSet> {
    if !path.is_file() {
        return Err(AnalysisError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let contents = fs::read_to_string(path).map_err(|err| AnalysisError::Schema {
        path: path.to_path_buf(),
        detail: format!("failed to read file: {err}"),
    })?;

    parse_level_vectors(&contents, path, defaults)
}

pub fn parse_level_vectors(
    contents: &str,
    path: &Path,
    defaults: ShapeDefaults,
) -> Result<LevelVectorSet> {
    let mut header = BTreeMap::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut dimension: Option<usize> = defaults.dimension;

    for (line_no, line) in contents.lines().enumerate() {
        let row = line_no + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if rows.is_empty() {
                header = parse_flat_header(line);
            }
            continue;
        }

        let values = if line.contains(',') {
            parse_numeric_row(line, path, row)?
        } else {
            parse_bitstring_row(line, path, row)?
        };

        match dimension {
            None => dimension = Some(values.len()),
            Some(expected) if values.len() != expected => {
                return Err(AnalysisError::ShapeMismatch {
                    path: path.to_path_buf(),
                    row,
                    detail: format!("got {} columns, expected {expected}", values.len()),
                });
            }
            Some(_) => {}
        }

        rows.push(values);
    }

    if rows.is_empty() {
        return Err(AnalysisError::Schema {
            path: path.to_path_buf(),
            detail: "file contains no vector rows".to_string(),
        });
    }

    let dimension = dimension.unwrap_or(0);
    let (num_levels, num_features) = resolve_shape(&header, defaults, rows.len(), path)?;

    if let Some(declared) = header.get("dimension") {
        if *declared != dimension {
            warn!(
                path = %path.display(),
                declared, actual = dimension,
                "header dimension disagrees with file, using file value"
            );
        }
    }

    let mut data = Array2::zeros((rows.len(), dimension));
    for (i, values) in rows.iter().enumerate() {
        for (j, value) in values.iter().enumerate() {
            data[[i, j]] = *value;
        }
    }

    Ok(LevelVectorSet {
        num_levels,
        num_features,
        dimension,
        data,
    })
}

/// Decodes the `#name,k=v,...` header line into integer-valued fields.
/// Non-integer tokens (including the leading tag) are ignored.
pub fn parse_flat_header(line: &str) -> BTreeMap<String, usize> {
    let pattern = Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(\d+)").expect("static regex");
    pattern
        .captures_iter(line)
        .filter_map(|captures| {
            let key = captures.get(1)?.as_str().to_string();
            let value = captures.get(2)?.as_str().parse::<usize>().ok()?;
            Some((key, value))
        })
        .collect()
}

fn parse_numeric_row(line: &str, path: &Path, row: usize) -> Result<Vec<f64>> {
    line.split(',')
        .map(|token| {
            token
                .trim()
                .parse::<f64>()
                .map_err(|_| AnalysisError::Schema {
                    path: path.to_path_buf(),
                    detail: format!("row {row}: invalid numeric value: {token:?}"),
                })
        })
        .collect()
}

fn parse_bitstring_row(line: &str, path: &Path, row: usize) -> Result<Vec<f64>> {
    line.chars()
        .map(|bit| match bit {
            '0' => Ok(0.0),
            '1' => Ok(1.0),
            other => Err(AnalysisError::Schema {
                path: path.to_path_buf(),
                detail: format!("row {row}: non-binary character in bitstring: {other:?}"),
            }),
        })
        .collect()
}

fn resolve_shape(
    header: &BTreeMap<String, usize>,
    defaults: ShapeDefaults,
    rows: usize,
    path: &Path,
) -> Result<(usize, usize)> {
    let num_levels = header.get("num_levels").copied().or(defaults.num_levels);
    let num_features = header
        .get("num_features")
        .copied()
        .or(defaults.num_features);
    let num_vectors = header.get("num_vectors").copied();

    let (levels, features) = match (num_levels, num_features) {
        (Some(levels), Some(features)) => (levels, features),
        (Some(levels), None) => {
            if levels == 0 || rows % levels != 0 {
                return Err(shape_error(path, rows, levels, rows.max(1) / levels.max(1)));
            }
            (levels, rows / levels)
        }
        (None, Some(features)) => {
            if features == 0 || rows % features != 0 {
                return Err(shape_error(path, rows, rows.max(1) / features.max(1), features));
            }
            (rows / features, features)
        }
        // No declared or defaulted shape: one vector per level.
        (None, None) => (num_vectors.unwrap_or(rows), 1),
    };

    if levels * features != rows {
        // A bare num_vectors header describes a one-feature set.
        if num_vectors == Some(rows) {
            return Ok((rows, 1));
        }
        return Err(shape_error(path, rows, levels, features));
    }

    Ok((levels, features))
}

fn shape_error(path: &Path, rows: usize, levels: usize, features: usize) -> AnalysisError {
    AnalysisError::ShapeMismatch {
        path: path.to_path_buf(),
        row: rows,
        detail: format!("{rows} rows cannot form {levels} levels x {features} features"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn parse(contents: &str, defaults: ShapeDefaults) -> Result<LevelVectorSet> {
        parse_level_vectors(contents, &PathBuf::from("item_mem.csv"), defaults)
    }

    #[test]
    fn bitstring_lines_load_one_vector_per_level() {
        let set = parse("0101\n1100\n0011\n", ShapeDefaults::default()).unwrap();
        assert_eq!(set.num_levels, 3);
        assert_eq!(set.num_features, 1);
        assert_eq!(set.dimension, 4);
        assert_eq!(set.vector(0, 0).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(set.vector(2, 0).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn header_annotated_flat_file_loads() {
        let contents = "#item_mem,num_vectors=2,dimension=3\n0.5,0.25,0.125\n1.0,0.0,-1.0\n";
        let set = parse(contents, ShapeDefaults::default()).unwrap();
        assert_eq!(set.num_levels, 2);
        assert_eq!(set.num_features, 1);
        assert_eq!(set.dimension, 3);
        assert_eq!(set.vector(1, 0).to_vec(), vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn header_levels_and_features_shape_the_set() {
        let contents = "#item_mem,num_levels=2,num_features=2,dimension=2\n\
                        1,0\n0,1\n1,1\n0,0\n";
        let set = parse(contents, ShapeDefaults::default()).unwrap();
        assert_eq!(set.num_levels, 2);
        assert_eq!(set.num_features, 2);
        assert_eq!(set.vector(1, 0).to_vec(), vec![1.0, 1.0]);
        assert_eq!(set.vector(1, 1).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn ragged_rows_are_a_shape_mismatch_naming_the_row() {
        let err = parse("0101\n11\n", ShapeDefaults::default()).unwrap_err();
        match err {
            AnalysisError::ShapeMismatch { row, .. } => assert_eq!(row, 2),
            other => panic!("expected shape mismatch, got {other}"),
        }
    }

    #[test]
    fn row_count_disagreement_is_fatal() {
        let contents = "#item_mem,num_levels=3,num_features=2\n1,0\n0,1\n1,1\n";
        let err = parse(contents, ShapeDefaults::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::ShapeMismatch { .. }));
        assert!(format!("{err}").contains("3 rows"));
    }

    #[test]
    fn defaults_fill_missing_header_values() {
        let defaults = ShapeDefaults {
            num_levels: Some(2),
            num_features: None,
            dimension: None,
        };
        let set = parse("1,0\n0,1\n1,1\n0,0\n", defaults).unwrap();
        assert_eq!(set.num_levels, 2);
        assert_eq!(set.num_features, 2);
    }

    #[test]
    fn non_binary_character_in_bitstring_is_fatal() {
        let err = parse("0102\n", ShapeDefaults::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema { .. }));
        assert!(format!("{err}").contains("row 1"));
    }

    #[test]
    fn flat_header_parses_integer_fields_only() {
        let header = parse_flat_header("#item_mem,num_vectors=51,dimension=2048,tag=naive");
        assert_eq!(header.get("num_vectors"), Some(&51));
        assert_eq!(header.get("dimension"), Some(&2048));
        assert_eq!(header.get("tag"), None);
    }
}
