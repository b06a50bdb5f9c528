use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray,
};
use arrow::datatypes::DataType;
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{
    LabeledDataset, MetadataValue, PredictionInput, SpectralDataset, SpectralMap, Spectrum,
};
use super::preprocess::interpolate;
use crate::config::{DataConfig, PreprocessConfig};
use crate::error::SlpError;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a labeled training or test file.
///
/// Tabular sources (`.parquet`, `.json`, `.csv`) take their label from the
/// configured metadata column; anything else is read as a numeric matrix whose
/// first row holds the energy axis and whose first column holds the labels.
pub fn read_learn_file(
    path: &Path,
    data: &DataConfig,
    preprocess: &PreprocessConfig,
) -> Result<LabeledDataset> {
    let mut dataset = if is_tabular(path) {
        let tabular = load_file(path)?;
        labeled_from_tabular(&tabular, &data.label_column)
            .with_context(|| format!("reading labels from {}", path.display()))?
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        parse_learn_text(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    dataset.norm_index = norm_index(&dataset.energies, preprocess);

    log::info!(
        "{}: {} spectra, {} energies, {} classes",
        path.display(),
        dataset.len(),
        dataset.n_features(),
        dataset.distinct_labels().len()
    );
    Ok(dataset)
}

/// Load a single spectrum to classify: two columns, energy and intensity.
pub fn read_pred_file(path: &Path) -> Result<PredictionInput> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_pred_text(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load a 2D map: header row of energies after two placeholder cells, then
/// one `x y intensities...` row per pixel.
pub fn read_pred_map(path: &Path) -> Result<SpectralMap> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let map = parse_map_text(&text).with_context(|| format!("parsing {}", path.display()))?;
    log::info!(
        "{}: {} pixels, {} energies",
        path.display(),
        map.len(),
        map.energies.len()
    );
    Ok(map)
}

/// Index of the first energy at or above `ynorm_x - ynorm_x_delta`.
pub fn norm_index(energies: &[f64], preprocess: &PreprocessConfig) -> Option<usize> {
    let threshold = preprocess.ynorm_x - preprocess.ynorm_x_delta;
    energies.iter().position(|&e| e >= threshold)
}

/// Load a tabular spectral dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with `x` and `y` list columns
/// * `.json`    – `[{ "x": [...], "y": [...], ...meta }, ...]`
/// * `.csv`     – columns `x` and `y` containing semicolon-separated floats
pub fn load_file(path: &Path) -> Result<SpectralDataset> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn is_tabular(path: &Path) -> bool {
    matches!(extension(path).as_str(), "parquet" | "pq" | "json" | "csv")
}

// ---------------------------------------------------------------------------
// Numeric text formats
// ---------------------------------------------------------------------------

/// Split a text file into rows of tokens. Blank lines and `#` comments are skipped.
fn tokenize(text: &str) -> Vec<(usize, Vec<&str>)> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let tokens: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
                .filter(|t| !t.is_empty())
                .collect();
            Some((i + 1, tokens))
        })
        .collect()
}

fn parse_number(token: &str, line: usize, column: usize) -> Result<f64, SlpError> {
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SlpError::BadNumber {
            line,
            column,
            token: token.to_string(),
        }),
    }
}

fn parse_numbers(tokens: &[&str], line: usize, first_column: usize) -> Result<Vec<f64>, SlpError> {
    tokens
        .iter()
        .enumerate()
        .map(|(j, tok)| parse_number(tok, line, first_column + j))
        .collect()
}

pub(crate) fn parse_learn_text(text: &str) -> Result<LabeledDataset> {
    let rows = tokenize(text);
    let Some(((header_line, header), body)) = rows.split_first() else {
        return Err(SlpError::EmptyDataset("training file has no rows".into()).into());
    };
    if header.len() < 2 {
        bail!("line {header_line}: header needs a placeholder cell and at least one energy");
    }
    let energies = parse_numbers(&header[1..], *header_line, 2)?;
    if body.is_empty() {
        return Err(SlpError::EmptyDataset("training file has no spectra".into()).into());
    }

    let n_features = energies.len();
    let mut labels = Vec::with_capacity(body.len());
    let mut values = Vec::with_capacity(body.len() * n_features);
    for (line, tokens) in body {
        if tokens.len() != n_features + 1 {
            return Err(SlpError::DimensionMismatch {
                what: format!("line {line}"),
                expected: n_features + 1,
                found: tokens.len(),
            }
            .into());
        }
        labels.push(tokens[0].to_string());
        values.extend(parse_numbers(&tokens[1..], *line, 2)?);
    }

    let features = Array2::from_shape_vec((labels.len(), n_features), values)?;
    Ok(LabeledDataset {
        energies,
        labels,
        features,
        norm_index: None,
    })
}

pub(crate) fn parse_pred_text(text: &str) -> Result<PredictionInput> {
    let mut energies = Vec::new();
    let mut intensities = Vec::new();
    for (line, tokens) in tokenize(text) {
        if tokens.len() < 2 {
            return Err(SlpError::DimensionMismatch {
                what: format!("line {line}"),
                expected: 2,
                found: tokens.len(),
            }
            .into());
        }
        energies.push(parse_number(tokens[0], line, 1)?);
        intensities.push(parse_number(tokens[1], line, 2)?);
    }
    if energies.is_empty() {
        return Err(SlpError::EmptyDataset("prediction file has no points".into()).into());
    }
    Ok(PredictionInput {
        energies,
        intensities,
    })
}

pub(crate) fn parse_map_text(text: &str) -> Result<SpectralMap> {
    let rows = tokenize(text);
    let Some(((header_line, header), body)) = rows.split_first() else {
        return Err(SlpError::EmptyDataset("map file has no rows".into()).into());
    };
    if header.len() < 3 {
        bail!("line {header_line}: map header needs two placeholder cells and energies");
    }
    let energies = parse_numbers(&header[2..], *header_line, 3)?;
    let n_features = energies.len();

    let mut x = Vec::with_capacity(body.len());
    let mut y = Vec::with_capacity(body.len());
    let mut values = Vec::with_capacity(body.len() * n_features);
    for (line, tokens) in body {
        if tokens.len() != n_features + 2 {
            return Err(SlpError::DimensionMismatch {
                what: format!("line {line}"),
                expected: n_features + 2,
                found: tokens.len(),
            }
            .into());
        }
        x.push(parse_number(tokens[0], *line, 1)?);
        y.push(parse_number(tokens[1], *line, 2)?);
        values.extend(parse_numbers(&tokens[2..], *line, 3)?);
    }
    if x.is_empty() {
        return Err(SlpError::EmptyDataset("map file has no pixels".into()).into());
    }

    let spectra = Array2::from_shape_vec((x.len(), n_features), values)?;
    Ok(SpectralMap {
        x,
        y,
        energies,
        spectra,
    })
}

/// Flatten a tabular dataset into a labeled matrix on the first spectrum's axis.
pub(crate) fn labeled_from_tabular(
    dataset: &SpectralDataset,
    label_column: &str,
) -> Result<LabeledDataset> {
    let Some(first) = dataset.spectra.first() else {
        return Err(SlpError::EmptyDataset("tabular file has no spectra".into()).into());
    };
    if !dataset.unique_values.contains_key(label_column) {
        bail!(
            "label column '{label_column}' not found (available: {})",
            dataset.column_names.join(", ")
        );
    }

    let energies = first.x.clone();
    let n_features = energies.len();
    let mut labels = Vec::with_capacity(dataset.len());
    let mut values = Vec::with_capacity(dataset.len() * n_features);

    for (i, sp) in dataset.spectra.iter().enumerate() {
        let label = sp
            .metadata
            .get(label_column)
            .and_then(MetadataValue::as_label)
            .with_context(|| format!("spectrum {i} has no '{label_column}' value"))?;
        labels.push(label);
        if sp.x == energies {
            values.extend_from_slice(&sp.y);
        } else {
            log::debug!("spectrum {i}: interpolating onto the shared energy axis");
            values.extend(interpolate(&sp.x, &sp.y, &energies));
        }
    }

    let features = Array2::from_shape_vec((labels.len(), n_features), values)?;
    Ok(LabeledDataset {
        energies,
        labels,
        features,
        norm_index: None,
    })
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "x": [4000.0, 3999.0, ...], "y": [0.12, 0.14, ...], "label": "A" },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<SpectralDataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut spectra = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;

        if x.len() != y.len() {
            bail!("Row {i}: x has {} values but y has {}", x.len(), y.len());
        }

        let metadata = obj
            .iter()
            .filter(|(key, _)| key.as_str() != "x" && key.as_str() != "y")
            .map(|(key, val)| (key.clone(), json_to_metadata(val)))
            .collect();

        spectra.push(Spectrum { x, y, metadata });
    }

    Ok(SpectralDataset::from_spectra(spectra))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `x` and `y` columns contain semicolon-separated floats:
///   `"4000.0;3999.0;3998.0"`, `"0.12;0.14;0.11"`
/// All other columns are treated as metadata.
fn load_csv(path: &Path) -> Result<SpectralDataset> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let x_idx = headers
        .iter()
        .position(|h| h == "x")
        .context("CSV missing 'x' column")?;
    let y_idx = headers
        .iter()
        .position(|h| h == "y")
        .context("CSV missing 'y' column")?;

    let mut spectra = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no, "x")?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), row_no, "y")?;

        if x.len() != y.len() {
            bail!(
                "CSV row {row_no}: x has {} values but y has {}",
                x.len(),
                y.len()
            );
        }

        let mut metadata = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if col_idx == x_idx || col_idx == y_idx {
                continue;
            }
            metadata.insert(headers[col_idx].clone(), guess_metadata_type(value));
        }

        spectra.push(Spectrum { x, y, metadata });
    }

    Ok(SpectralDataset::from_spectra(spectra))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing spectral data.
///
/// Expected schema:
/// - `x`: List<Float64> or LargeList<Float64> – wavenumber arrays
/// - `y`: List<Float64> or LargeList<Float64> – intensity arrays
/// - Any other columns are treated as metadata (strings, ints, floats, bools)
fn load_parquet(path: &Path) -> Result<SpectralDataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;

        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != x_idx && *i != y_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..batch.num_rows() {
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'y'"))?;

            if x.len() != y.len() {
                bail!("Row {row}: x has {} values but y has {}", x.len(), y.len());
            }

            let metadata = meta_cols
                .iter()
                .map(|(col_idx, col_name)| {
                    (col_name.clone(), extract_metadata_value(batch.column(*col_idx), row))
                })
                .collect();

            spectra.push(Spectrum { x, y, metadata });
        }
    }

    Ok(SpectralDataset::from_spectra(spectra))
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected ListArray")?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .context("expected LargeListArray")?
            .value(row),
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a single metadata value from an Arrow column at a given row.
fn extract_metadata_value(col: &Arc<dyn Array>, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => MetadataValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => {
            MetadataValue::String(col.as_string::<i64>().value(row).to_string())
        }
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Integer(a.value(row) as i64)),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Float(a.value(row) as f64)),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Bool(a.value(row))),
        other => MetadataValue::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEARN: &str = "\
0 100 200 300
A 1 2 3
B 3 2 1
A 1.5 2.5 3.5
";

    #[test]
    fn learn_text_splits_axis_labels_and_matrix() {
        let ds = parse_learn_text(LEARN).unwrap();
        assert_eq!(ds.energies, vec![100.0, 200.0, 300.0]);
        assert_eq!(ds.labels, vec!["A", "B", "A"]);
        assert_eq!(ds.features.dim(), (3, 3));
        assert_eq!(ds.features[[1, 0]], 3.0);
    }

    #[test]
    fn learn_text_rejects_ragged_rows() {
        let err = parse_learn_text("0 1 2\nA 1\n").unwrap_err();
        let slp = err.downcast_ref::<SlpError>().unwrap();
        assert!(matches!(slp, SlpError::DimensionMismatch { expected: 3, found: 2, .. }));
    }

    #[test]
    fn learn_text_reports_bad_numbers_with_position() {
        let err = parse_learn_text("0 1 2\nA 1 x\n").unwrap_err();
        let slp = err.downcast_ref::<SlpError>().unwrap();
        assert!(matches!(slp, SlpError::BadNumber { line: 2, column: 3, .. }));
    }

    #[test]
    fn non_finite_cells_are_bad_numbers() {
        for cell in ["nan", "NaN", "inf", "-infinity"] {
            let err = parse_learn_text(&format!("0 1 2\nA 1 {cell}\n")).unwrap_err();
            let slp = err.downcast_ref::<SlpError>().unwrap();
            assert!(matches!(slp, SlpError::BadNumber { line: 2, column: 3, .. }));
        }
    }

    #[test]
    fn pred_text_accepts_commas_and_comments() {
        let input = parse_pred_text("# energy, intensity\n100,1.0\n200,2.0\n").unwrap();
        assert_eq!(input.energies, vec![100.0, 200.0]);
        assert_eq!(input.intensities, vec![1.0, 2.0]);
    }

    #[test]
    fn map_text_reads_coordinates() {
        let map = parse_map_text("0 0 10 20\n0 0 1 2\n0 1 3 4\n1 0 5 6\n").unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.x, vec![0.0, 0.0, 1.0]);
        assert_eq!(map.y, vec![0.0, 1.0, 0.0]);
        assert_eq!(map.pixel(2).intensities, vec![5.0, 6.0]);
    }

    #[test]
    fn norm_index_is_first_energy_past_threshold() {
        let cfg = PreprocessConfig {
            ynorm_x: 250.0,
            ynorm_x_delta: 30.0,
            ..PreprocessConfig::default()
        };
        assert_eq!(norm_index(&[100.0, 200.0, 300.0], &cfg), Some(2));
        let far = PreprocessConfig {
            ynorm_x: 5000.0,
            ..cfg
        };
        assert_eq!(norm_index(&[100.0, 200.0, 300.0], &far), None);
    }

    #[test]
    fn tabular_labels_come_from_metadata_column() {
        let mk = |label: &str, x: Vec<f64>, y: Vec<f64>| {
            let mut metadata = BTreeMap::new();
            metadata.insert("label".to_string(), MetadataValue::String(label.into()));
            Spectrum { x, y, metadata }
        };
        let ds = SpectralDataset::from_spectra(vec![
            mk("A", vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]),
            mk("B", vec![1.0, 3.0], vec![10.0, 30.0]),
        ]);
        let labeled = labeled_from_tabular(&ds, "label").unwrap();
        assert_eq!(labeled.labels, vec!["A", "B"]);
        assert_eq!(labeled.features.row(1).to_vec(), vec![10.0, 20.0, 30.0]);
        assert!(labeled_from_tabular(&ds, "missing").is_err());
    }

    #[test]
    fn csv_loader_reads_semicolon_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, "x,y,label\n\"1;2\",\"3;4\",A\n\"1;2\",\"5;6\",B\n").unwrap();
        let data = DataConfig::default();
        let ds = read_learn_file(&path, &data, &PreprocessConfig::default()).unwrap();
        assert_eq!(ds.labels, vec!["A", "B"]);
        assert_eq!(ds.features[[1, 1]], 6.0);
    }
}
