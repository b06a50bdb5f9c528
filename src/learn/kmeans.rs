//! K-Means clustering used as a classifier: each cluster predicts the label
//! distribution of the training spectra assigned to it.

use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Classifier, Family, Learner};
use crate::config::KMeansConfig;
use crate::error::SlpError;

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub centroids: Array2<f64>,
    pub assignments: Vec<usize>,
    pub inertia: f64,
    pub iterations: usize,
}

fn sq_dist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &Array2<f64>, x: ArrayView1<f64>) -> (usize, f64) {
    centroids
        .rows()
        .into_iter()
        .enumerate()
        .map(|(c, centre)| (c, sq_dist(centre, x)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// Lloyd's algorithm with k-means++ seeding.
pub fn kmeans(data: ArrayView2<f64>, k: usize, max_iter: usize, seed: u64) -> Result<KMeansFit> {
    let n = data.nrows();
    if k == 0 || k > n {
        return Err(SlpError::InvalidConfig(format!(
            "cannot form {k} clusters from {n} spectra"
        ))
        .into());
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // k-means++ seeding
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut dist: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| sq_dist(row, data.row(chosen[0])))
        .collect();
    while chosen.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            dist.iter()
                .position(|&d| {
                    target -= d;
                    target <= 0.0
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        chosen.push(next);
        for (i, row) in data.rows().into_iter().enumerate() {
            dist[i] = dist[i].min(sq_dist(row, data.row(next)));
        }
    }
    let mut centroids = data.select(Axis(0), &chosen);

    let mut assignments = vec![usize::MAX; n];
    let mut iterations = 0;
    for iter in 0..max_iter.max(1) {
        iterations = iter + 1;
        let mut changed = false;
        for (i, row) in data.rows().into_iter().enumerate() {
            let (c, _) = nearest(&centroids, row);
            if assignments[i] != c {
                assignments[i] = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
        let mut counts = vec![0usize; k];
        for (row, &c) in data.rows().into_iter().zip(&assignments) {
            let mut target = sums.row_mut(c);
            target += &row;
            counts[c] += 1;
        }
        for c in 0..k {
            // empty clusters keep their previous centre
            if counts[c] > 0 {
                let mean = &sums.row(c) / counts[c] as f64;
                centroids.row_mut(c).assign(&mean);
            }
        }
    }

    let inertia = data
        .rows()
        .into_iter()
        .zip(&assignments)
        .map(|(row, &c)| sq_dist(row, centroids.row(c)))
        .sum();
    Ok(KMeansFit {
        centroids,
        assignments,
        inertia,
        iterations,
    })
}

#[derive(Debug, Clone)]
pub struct KMeansLearner {
    clusters: Option<usize>,
    max_iter: usize,
    seed: u64,
}

impl KMeansLearner {
    pub fn new(cfg: &KMeansConfig) -> Self {
        Self {
            clusters: cfg.clusters,
            max_iter: cfg.max_iter,
            seed: cfg.seed,
        }
    }
}

impl Learner for KMeansLearner {
    fn family(&self) -> Family {
        Family::KMeans
    }

    fn fit(
        &self,
        features: ArrayView2<f64>,
        targets: &[usize],
        n_classes: usize,
    ) -> Result<Box<dyn Classifier>> {
        let k = self.clusters.unwrap_or(n_classes).min(features.nrows());
        let fit = kmeans(features, k, self.max_iter, self.seed)?;

        let mut label_counts = Array2::<f64>::zeros((k, n_classes));
        for (&c, &t) in fit.assignments.iter().zip(targets) {
            label_counts[[c, t]] += 1.0;
        }
        for mut row in label_counts.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            } else {
                row.fill(1.0 / n_classes as f64);
            }
        }
        log::debug!(
            "K-Means: {k} clusters after {} iterations, inertia {:.3}",
            fit.iterations,
            fit.inertia
        );
        Ok(Box::new(ClusterClassifier {
            centroids: fit.centroids,
            label_share: label_counts,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct ClusterClassifier {
    centroids: Array2<f64>,
    /// Per cluster, share of each training label among its members.
    label_share: Array2<f64>,
}

impl Classifier for ClusterClassifier {
    fn predict_proba(&self, features: ArrayView1<f64>) -> Array1<f64> {
        let (c, _) = nearest(&self.centroids, features);
        self.label_share.row(c).to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::TrainedModel;
    use crate::learn::testutil::blobs;

    #[test]
    fn recovers_blob_partition() {
        let data = blobs(10, 4, 5);
        let fit = kmeans(data.features.view(), 3, 100, 9).unwrap();
        for block in fit.assignments.chunks(10) {
            assert!(block.iter().all(|&c| c == block[0]));
        }
        let mut firsts: Vec<usize> = fit.assignments.chunks(10).map(|b| b[0]).collect();
        firsts.sort_unstable();
        assert_eq!(firsts, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_more_clusters_than_points() {
        let data = blobs(1, 2, 5);
        assert!(kmeans(data.features.view(), 4, 10, 1).is_err());
    }

    #[test]
    fn classifier_reports_cluster_majority() {
        let data = blobs(10, 4, 6);
        let learner = KMeansLearner::new(&KMeansConfig::default());
        let model = TrainedModel::train(&learner, &data, None).unwrap();
        assert_eq!(model.accuracy, 1.0);
        let pred = model.predict(data.features.row(15)).unwrap();
        assert_eq!(pred.label, "mid");
        assert!((pred.confidence - 1.0).abs() < 1e-12);
    }
}
