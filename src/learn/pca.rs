//! Principal component analysis used as a diagnostic on the training matrix.
//!
//! Components are the leading eigenvectors of the covariance matrix. When
//! there are fewer spectra than energies the (smaller) Gram matrix is
//! decomposed instead and mapped back.

use anyhow::Result;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::SlpError;

#[derive(Debug, Clone)]
pub struct PcaFit {
    /// k × F loading vectors, unit length, sign-normalised.
    pub components: Array2<f64>,
    pub explained_variance: Array1<f64>,
    pub explained_variance_ratio: Array1<f64>,
    pub mean: Array1<f64>,
    /// N × k projections of the training rows.
    pub scores: Array2<f64>,
}

impl PcaFit {
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }
}

/// Components to compute: one per distinct label, unless overridden.
pub fn component_count(distinct_labels: usize, custom: Option<usize>) -> usize {
    custom.unwrap_or(distinct_labels)
}

pub fn fit(data: ArrayView2<f64>, n_components: usize) -> Result<PcaFit> {
    let (n, f) = data.dim();
    if n_components == 0 || n_components > n.min(f) {
        return Err(SlpError::TooManyComponents {
            requested: n_components,
            rows: n,
            cols: f,
        }
        .into());
    }
    let mean = data
        .mean_axis(Axis(0))
        .ok_or_else(|| SlpError::EmptyDataset("PCA input".into()))?;
    let centred = &data - &mean;
    let dof = (n.max(2) - 1) as f64;
    let total_variance = centred.mapv(|v| v * v).sum() / dof;

    let mut components = Array2::zeros((n_components, f));
    let mut explained_variance = Array1::zeros(n_components);

    if n < f {
        let gram = centred.dot(&centred.t());
        for (i, (value, vector)) in top_eigen(gram, n_components).into_iter().enumerate() {
            let mut loading = centred.t().dot(&vector);
            let norm = loading.dot(&loading).sqrt();
            if norm > f64::EPSILON {
                loading /= norm;
            }
            components.row_mut(i).assign(&loading);
            explained_variance[i] = value.max(0.0) / dof;
        }
    } else {
        let covariance = centred.t().dot(&centred);
        for (i, (value, vector)) in top_eigen(covariance, n_components).into_iter().enumerate() {
            components.row_mut(i).assign(&vector);
            explained_variance[i] = value.max(0.0) / dof;
        }
    }

    for mut row in components.rows_mut() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
        }
    }

    let explained_variance_ratio = if total_variance > 0.0 {
        &explained_variance / total_variance
    } else {
        Array1::zeros(n_components)
    };
    let scores = centred.dot(&components.t());

    Ok(PcaFit {
        components,
        explained_variance,
        explained_variance_ratio,
        mean,
        scores,
    })
}

/// Leading `k` (eigenvalue, eigenvector) pairs of a symmetric PSD matrix,
/// largest eigenvalue first.
fn top_eigen(matrix: Array2<f64>, k: usize) -> Vec<(f64, Array1<f64>)> {
    let d = matrix.nrows();
    let eigen = SymmetricEigen::new(DMatrix::from_fn(d, d, |i, j| matrix[[i, j]]));
    let mut pairs: Vec<(usize, f64)> = eigen.eigenvalues.iter().copied().enumerate().collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    pairs
        .into_iter()
        .take(k)
        .map(|(idx, value)| {
            let vector = eigen.eigenvectors.column(idx);
            (value, Array1::from_iter(vector.iter().copied()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::testutil::blobs;
    use ndarray::array;

    #[test]
    fn one_component_per_label_by_default() {
        assert_eq!(component_count(3, None), 3);
        assert_eq!(component_count(3, Some(5)), 5);
    }

    #[test]
    fn three_labels_give_three_components_under_full_variance() {
        let data = blobs(8, 12, 4);
        let k = component_count(data.distinct_labels().len(), None);
        let fit = fit(data.features.view(), k).unwrap();
        assert_eq!(fit.n_components(), 3);
        let total: f64 = fit.explained_variance_ratio.sum();
        assert!(total <= 1.0 + 1e-9, "ratios sum to {total}");
        assert!(fit.explained_variance_ratio[0] >= fit.explained_variance_ratio[1]);
        assert_eq!(fit.scores.dim(), (24, 3));
    }

    #[test]
    fn finds_dominant_axis() {
        let data = array![[-2.0, 0.1], [-1.0, -0.1], [0.0, 0.0], [1.0, 0.1], [2.0, -0.1]];
        let fit = fit(data.view(), 2).unwrap();
        assert!(fit.components[[0, 0]] > 0.99);
        assert!(fit.explained_variance_ratio[0] > 0.99);
        let dot = fit.components.row(0).dot(&fit.components.row(1));
        assert!(dot.abs() < 1e-6);
    }

    #[test]
    fn separates_nearly_equal_variances() {
        // two orthogonal axes rotated by (0.6, 0.8), variances 1.0 and 0.9999
        let (u, v) = ([0.6, 0.8, 0.0], [-0.8, 0.6, 0.0]);
        let (a, b) = (1.0f64.sqrt() * 1.5f64.sqrt(), 0.9999f64.sqrt() * 1.5f64.sqrt());
        let data = Array2::from_shape_fn((4, 3), |(i, j)| match i {
            0 => a * u[j],
            1 => -a * u[j],
            2 => b * v[j],
            _ => -b * v[j],
        });
        let fit = fit(data.view(), 2).unwrap();
        let cos = fit.components.row(0).dot(&array![0.6, 0.8, 0.0]).abs();
        assert!(cos > 1.0 - 1e-9, "|cos| = {cos}");
        assert!(fit.explained_variance[0] >= fit.explained_variance[1]);
    }

    #[test]
    fn gram_path_matches_covariance_variance() {
        // more energies than spectra
        let data = blobs(2, 10, 8);
        let fit = fit(data.features.view(), 2).unwrap();
        let projected_var = fit.scores.column(0).mapv(|s| s * s).sum() / 5.0;
        assert!((projected_var - fit.explained_variance[0]).abs() < 1e-6);
    }

    #[test]
    fn rejects_too_many_components() {
        let data = blobs(1, 4, 1);
        let err = fit(data.features.view(), 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SlpError>(),
            Some(SlpError::TooManyComponents { requested: 4, rows: 3, cols: 4 })
        ));
    }
}
