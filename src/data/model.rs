use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ndarray::{Array2, Axis};

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a metadata column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value mirroring common Pandas dtypes.
/// Using `BTreeMap` / `BTreeSet` downstream so `MetadataValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Class label text for this cell; `None` for missing values.
    pub fn as_label(&self) -> Option<String> {
        match self {
            MetadataValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum / SpectralDataset – tabular sources
// ---------------------------------------------------------------------------

/// A single spectrum with its metadata row.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Wavenumber axis (x).
    pub x: Vec<f64>,
    /// Intensity axis (y) – same length as `x`.
    pub y: Vec<f64>,
    /// Dynamic metadata columns: column_name → value.
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// A parsed tabular file (parquet / json / csv) with pre-computed column indices.
#[derive(Debug, Clone)]
pub struct SpectralDataset {
    pub spectra: Vec<Spectrum>,
    /// Ordered list of metadata column names (excludes x, y).
    pub column_names: Vec<String>,
    /// For each metadata column the sorted set of unique values.
    pub unique_values: BTreeMap<String, BTreeSet<MetadataValue>>,
}

impl SpectralDataset {
    /// Build column indices from the loaded spectra.
    pub fn from_spectra(spectra: Vec<Spectrum>) -> Self {
        let mut column_names_set: BTreeSet<String> = BTreeSet::new();
        let mut unique_values: BTreeMap<String, BTreeSet<MetadataValue>> = BTreeMap::new();

        for sp in &spectra {
            for (col, val) in &sp.metadata {
                column_names_set.insert(col.clone());
                unique_values
                    .entry(col.clone())
                    .or_default()
                    .insert(val.clone());
            }
        }
        SpectralDataset {
            spectra,
            column_names: column_names_set.into_iter().collect(),
            unique_values,
        }
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Learning-side views
// ---------------------------------------------------------------------------

/// Labeled training (or test) data: one row of `features` per label, all
/// sampled on the shared `energies` axis.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub energies: Vec<f64>,
    pub labels: Vec<String>,
    /// N × F intensity matrix.
    pub features: Array2<f64>,
    /// Column used for intensity normalisation, `None` → normalise to maximum.
    pub norm_index: Option<usize>,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.energies.len()
    }

    /// Distinct labels in order of first occurrence.
    pub fn distinct_labels(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.labels
            .iter()
            .filter(|l| seen.insert(l.as_str()))
            .cloned()
            .collect()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> LabeledDataset {
        LabeledDataset {
            energies: self.energies.clone(),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
            features: self.features.select(Axis(0), indices),
            norm_index: self.norm_index,
        }
    }
}

/// One unlabeled spectrum to classify.
#[derive(Debug, Clone)]
pub struct PredictionInput {
    pub energies: Vec<f64>,
    pub intensities: Vec<f64>,
}

/// A 2D map: one spectrum per (x, y) coordinate, in file order.
#[derive(Debug, Clone)]
pub struct SpectralMap {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub energies: Vec<f64>,
    /// One row per pixel.
    pub spectra: Array2<f64>,
}

impl SpectralMap {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The spectrum of pixel `i` as a prediction input.
    pub fn pixel(&self, i: usize) -> PredictionInput {
        PredictionInput {
            energies: self.energies.clone(),
            intensities: self.spectra.row(i).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dataset() -> LabeledDataset {
        LabeledDataset {
            energies: vec![1.0, 2.0],
            labels: vec!["b".into(), "a".into(), "b".into(), "c".into()],
            features: array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]],
            norm_index: None,
        }
    }

    #[test]
    fn distinct_labels_keep_first_occurrence_order() {
        assert_eq!(dataset().distinct_labels(), vec!["b", "a", "c"]);
    }

    #[test]
    fn select_keeps_rows_and_labels_aligned() {
        let sub = dataset().select(&[3, 1]);
        assert_eq!(sub.labels, vec!["c", "a"]);
        assert_eq!(sub.features, array![[4.0, 4.0], [2.0, 2.0]]);
    }

    #[test]
    fn float_metadata_labels_keep_their_text() {
        assert_eq!(MetadataValue::Float(0.45).as_label().as_deref(), Some("0.45"));
        assert_eq!(MetadataValue::Null.as_label(), None);
    }

    #[test]
    fn unique_values_are_collected_per_column() {
        let mut meta = BTreeMap::new();
        meta.insert("label".to_string(), MetadataValue::String("A".into()));
        let sp = Spectrum { x: vec![1.0], y: vec![1.0], metadata: meta };
        let ds = SpectralDataset::from_spectra(vec![sp.clone(), sp]);
        assert_eq!(ds.column_names, vec!["label"]);
        assert_eq!(ds.unique_values["label"].len(), 1);
    }
}
