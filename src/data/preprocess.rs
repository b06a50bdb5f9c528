//! Spectral preprocessing: intensity normalisation, energy windowing and
//! column standardisation.
//!
//! The [`Preprocessor`] is fitted once on the training set and then applied,
//! unchanged, to the training set, test sets, prediction files and map pixels
//! so that every feature vector lives in the same space.

use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::model::{LabeledDataset, PredictionInput};
use crate::config::PreprocessConfig;
use crate::error::SlpError;

/// Linear interpolation of `(xp, fp)` at `x`, clamped to the end values
/// outside the sampled range. `xp` may be in either order.
pub fn interpolate(xp: &[f64], fp: &[f64], x: &[f64]) -> Vec<f64> {
    let mut pairs: Vec<(f64, f64)> = xp.iter().copied().zip(fp.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    if pairs.is_empty() {
        return vec![f64::NAN; x.len()];
    }
    let first = pairs[0];
    let last = pairs[pairs.len() - 1];

    x.iter()
        .map(|&xi| {
            if xi <= first.0 {
                return first.1;
            }
            if xi >= last.0 {
                return last.1;
            }
            // first index with pairs[i].0 >= xi; guaranteed in 1..len
            let i = pairs.partition_point(|p| p.0 < xi);
            let (x0, y0) = pairs[i - 1];
            let (x1, y1) = pairs[i];
            if x1 == x0 {
                y1
            } else {
                y0 + (y1 - y0) * (xi - x0) / (x1 - x0)
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Scaler {
    mean: Array1<f64>,
    std: Array1<f64>,
}

/// Transform fitted on a training set.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    settings: PreprocessConfig,
    /// Energy axis of the raw training data.
    source_energies: Vec<f64>,
    /// Columns of the source axis kept by the energy window.
    columns: Vec<usize>,
    norm_index: Option<usize>,
    scaler: Option<Scaler>,
}

impl Preprocessor {
    pub fn fit(train: &LabeledDataset, settings: &PreprocessConfig) -> Result<Self> {
        if train.is_empty() {
            return Err(SlpError::EmptyDataset("cannot fit preprocessing on no spectra".into()).into());
        }
        let columns: Vec<usize> = train
            .energies
            .iter()
            .enumerate()
            .filter(|(_, &e)| {
                settings.energy_min.map_or(true, |lo| e >= lo)
                    && settings.energy_max.map_or(true, |hi| e <= hi)
            })
            .map(|(i, _)| i)
            .collect();
        if columns.is_empty() {
            return Err(SlpError::InvalidConfig(
                "energy window excludes every training energy".into(),
            )
            .into());
        }

        let mut fitted = Preprocessor {
            settings: settings.clone(),
            source_energies: train.energies.clone(),
            columns,
            norm_index: train.norm_index,
            scaler: None,
        };

        if settings.standard_scale {
            let base = fitted.normalise_and_window(&train.features);
            let mean = base
                .mean_axis(Axis(0))
                .ok_or_else(|| SlpError::EmptyDataset("training matrix".into()))?;
            let std = base
                .std_axis(Axis(0), 0.0)
                .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
            fitted.scaler = Some(Scaler { mean, std });
        }

        log::debug!(
            "preprocessing fitted: {} of {} energies kept, ynorm={}, scale={}",
            fitted.columns.len(),
            fitted.source_energies.len(),
            settings.ynorm,
            settings.standard_scale
        );
        Ok(fitted)
    }

    /// Energy axis of transformed feature vectors.
    pub fn energies(&self) -> Vec<f64> {
        self.columns.iter().map(|&i| self.source_energies[i]).collect()
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    /// Transform a labeled set (training or test) into the fitted feature space.
    pub fn transform_dataset(&self, data: &LabeledDataset) -> Result<LabeledDataset> {
        let aligned = self.align(data)?;
        Ok(LabeledDataset {
            energies: self.energies(),
            labels: data.labels.clone(),
            features: self.transform_matrix(&aligned),
            norm_index: None,
        })
    }

    /// Transform one unlabeled spectrum into a feature vector.
    pub fn transform_input(&self, input: &PredictionInput) -> Result<Array1<f64>> {
        if input.energies.len() != input.intensities.len() {
            return Err(SlpError::DimensionMismatch {
                what: "prediction spectrum".into(),
                expected: input.energies.len(),
                found: input.intensities.len(),
            }
            .into());
        }
        let row = if input.energies == self.source_energies {
            input.intensities.clone()
        } else {
            interpolate(&input.energies, &input.intensities, &self.source_energies)
        };
        let matrix = Array1::from(row).insert_axis(Axis(0));
        Ok(self.transform_matrix(&matrix).row(0).to_owned())
    }

    /// Apply the fitted transform to rows already on the source axis.
    pub fn transform_matrix(&self, raw: &Array2<f64>) -> Array2<f64> {
        let mut out = self.normalise_and_window(raw);
        if let Some(scaler) = &self.scaler {
            for mut row in out.rows_mut() {
                row -= &scaler.mean;
                row /= &scaler.std;
            }
        }
        out
    }

    fn align(&self, data: &LabeledDataset) -> Result<Array2<f64>> {
        if data.energies == self.source_energies {
            return Ok(data.features.clone());
        }
        log::debug!("interpolating {} spectra onto the training axis", data.len());
        let n = self.source_energies.len();
        let mut out = Array2::zeros((data.len(), n));
        for (i, row) in data.features.rows().into_iter().enumerate() {
            let row = row.to_vec();
            if row.len() != data.energies.len() {
                return Err(SlpError::DimensionMismatch {
                    what: format!("spectrum {i}"),
                    expected: data.energies.len(),
                    found: row.len(),
                }
                .into());
            }
            let resampled = interpolate(&data.energies, &row, &self.source_energies);
            out.row_mut(i).assign(&Array1::from(resampled));
        }
        Ok(out)
    }

    fn normalise_and_window(&self, raw: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((raw.nrows(), self.columns.len()));
        for (i, row) in raw.rows().into_iter().enumerate() {
            let factor = self.norm_factor(row);
            for (j, &col) in self.columns.iter().enumerate() {
                out[[i, j]] = row[col] * factor;
            }
        }
        out
    }

    fn norm_factor(&self, row: ArrayView1<f64>) -> f64 {
        if !self.settings.ynorm {
            return 1.0;
        }
        let reference = match self.norm_index {
            Some(idx) if !self.settings.full_ynorm => row[idx],
            _ => row.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        if reference.abs() < f64::EPSILON || !reference.is_finite() {
            log::trace!("skipping normalisation of a flat spectrum");
            1.0
        } else {
            self.settings.ynorm_to / reference
        }
    }
}

/// Partition `data` into disjoint (train, test) subsets, `percent` of the rows
/// going to the test side. Both sides keep at least one spectrum.
pub fn split_subset(
    data: &LabeledDataset,
    percent: f64,
    seed: u64,
) -> Result<(LabeledDataset, LabeledDataset)> {
    let n = data.len();
    if n < 2 {
        return Err(SlpError::EmptyDataset(format!(
            "need at least 2 spectra to split, found {n}"
        ))
        .into());
    }
    let n_test = ((n as f64 * percent).round() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test, train) = indices.split_at_mut(n_test);
    test.sort_unstable();
    train.sort_unstable();
    Ok((data.select(train), data.select(test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn train() -> LabeledDataset {
        LabeledDataset {
            energies: vec![100.0, 200.0, 300.0, 400.0],
            labels: vec!["A".into(), "B".into(), "A".into()],
            features: array![[1.0, 2.0, 4.0, 1.0], [2.0, 6.0, 3.0, 0.5], [0.5, 1.0, 2.0, 1.0]],
            norm_index: Some(1),
        }
    }

    #[test]
    fn interpolation_clamps_and_handles_descending_axis() {
        let out = interpolate(&[3.0, 2.0, 1.0], &[30.0, 20.0, 10.0], &[0.0, 1.5, 2.5, 9.0]);
        assert_eq!(out, vec![10.0, 15.0, 25.0, 30.0]);
    }

    #[test]
    fn normalisation_pins_reference_column() {
        let cfg = PreprocessConfig {
            standard_scale: false,
            ynorm_to: 10.0,
            ..PreprocessConfig::default()
        };
        let pre = Preprocessor::fit(&train(), &cfg).unwrap();
        let out = pre.transform_dataset(&train()).unwrap();
        for row in out.features.rows() {
            assert!((row[1] - 10.0).abs() < 1e-12);
        }
    }

    #[test]
    fn transform_is_pure_given_fitted_parameters() {
        let pre = Preprocessor::fit(&train(), &PreprocessConfig::default()).unwrap();
        let once = pre.transform_matrix(&train().features);
        let again = pre.transform_matrix(&train().features);
        assert_eq!(once, again);
        let ds_once = pre.transform_dataset(&train()).unwrap();
        let ds_twice = pre.transform_dataset(&train()).unwrap();
        assert_eq!(ds_once.features, ds_twice.features);
    }

    #[test]
    fn scaled_training_columns_are_centred() {
        let pre = Preprocessor::fit(&train(), &PreprocessConfig::default()).unwrap();
        let out = pre.transform_dataset(&train()).unwrap();
        let mean = out.features.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-9));
    }

    #[test]
    fn prediction_input_matches_training_row_transform() {
        let pre = Preprocessor::fit(&train(), &PreprocessConfig::default()).unwrap();
        let ds = pre.transform_dataset(&train()).unwrap();
        let input = PredictionInput {
            energies: vec![400.0, 300.0, 200.0, 100.0],
            intensities: vec![1.0, 4.0, 2.0, 1.0],
        };
        let row = pre.transform_input(&input).unwrap();
        for (a, b) in row.iter().zip(ds.features.row(0).iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn energy_window_drops_columns() {
        let cfg = PreprocessConfig {
            energy_min: Some(150.0),
            energy_max: Some(350.0),
            ..PreprocessConfig::default()
        };
        let pre = Preprocessor::fit(&train(), &cfg).unwrap();
        assert_eq!(pre.energies(), vec![200.0, 300.0]);
        assert_eq!(pre.transform_dataset(&train()).unwrap().features.ncols(), 2);
    }

    #[test]
    fn split_is_disjoint_and_complete() {
        let data = LabeledDataset {
            energies: vec![1.0],
            labels: (0..20).map(|i| format!("L{}", i % 3)).collect(),
            features: Array2::from_shape_fn((20, 1), |(i, _)| i as f64),
            norm_index: None,
        };
        let (tr, te) = split_subset(&data, 0.25, 7).unwrap();
        assert_eq!(te.len(), 5);
        assert_eq!(tr.len(), 15);
        let mut all: Vec<f64> = tr.features.iter().chain(te.features.iter()).copied().collect();
        all.sort_by(f64::total_cmp);
        assert_eq!(all, (0..20).map(|i| i as f64).collect::<Vec<_>>());
        for (row, label) in te.features.rows().into_iter().zip(&te.labels) {
            assert_eq!(*label, format!("L{}", row[0] as usize % 3));
        }
    }

    #[test]
    fn split_never_empties_a_side() {
        let data = train();
        let (tr, te) = split_subset(&data, 0.01, 1).unwrap();
        assert_eq!((tr.len(), te.len()), (2, 1));
    }
}
