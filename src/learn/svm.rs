//! Linear support vector machine, one-vs-rest, trained with the Pegasos
//! stochastic sub-gradient method. The bias is learned as an extra constant
//! feature.

use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::{Classifier, Family, Learner, softmax};
use crate::config::SvmConfig;
use crate::error::SlpError;

#[derive(Debug, Clone)]
pub struct SvmLearner {
    c: f64,
    epochs: usize,
    seed: u64,
}

impl SvmLearner {
    pub fn new(cfg: &SvmConfig) -> Self {
        Self {
            c: cfg.c,
            epochs: cfg.epochs,
            seed: cfg.seed,
        }
    }
}

impl Learner for SvmLearner {
    fn family(&self) -> Family {
        Family::Svm
    }

    fn fit(
        &self,
        features: ArrayView2<f64>,
        targets: &[usize],
        n_classes: usize,
    ) -> Result<Box<dyn Classifier>> {
        let (n, f) = features.dim();
        if n == 0 || n_classes == 0 {
            return Err(SlpError::EmptyDataset("SVM training set".into()).into());
        }
        if self.c <= 0.0 {
            return Err(SlpError::InvalidConfig(format!("svm.c must be positive, got {}", self.c)).into());
        }

        let lambda = 1.0 / (self.c * n as f64);
        let radius = 1.0 / lambda.sqrt();
        let mut weights = Array2::<f64>::zeros((n_classes, f + 1));
        let mut order: Vec<usize> = (0..n).collect();

        for k in 0..n_classes {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(k as u64));
            let mut w = Array1::<f64>::zeros(f + 1);
            let mut step = 0u64;
            for _ in 0..self.epochs {
                order.shuffle(&mut rng);
                for &i in &order {
                    step += 1;
                    let eta = 1.0 / (lambda * step as f64);
                    let y = if targets[i] == k { 1.0 } else { -1.0 };
                    let x = features.row(i);
                    let margin = y * decision(w.view(), x);

                    w *= 1.0 - eta * lambda;
                    if margin < 1.0 {
                        w.slice_mut(s![..f]).scaled_add(eta * y, &x);
                        w[f] += eta * y;
                    }
                    let norm = w.dot(&w).sqrt();
                    if norm > radius {
                        w *= radius / norm;
                    }
                }
            }
            weights.row_mut(k).assign(&w);
        }
        log::debug!("SVM: {n_classes} one-vs-rest hyperplanes over {f} features");
        Ok(Box::new(LinearSvm { weights }))
    }
}

fn decision(w: ArrayView1<f64>, x: ArrayView1<f64>) -> f64 {
    let f = x.len();
    w.slice(s![..f]).dot(&x) + w[f]
}

/// One hyperplane (weights + bias) per class.
#[derive(Debug, Clone)]
pub struct LinearSvm {
    weights: Array2<f64>,
}

impl LinearSvm {
    pub fn decision_function(&self, features: ArrayView1<f64>) -> Array1<f64> {
        self.weights
            .rows()
            .into_iter()
            .map(|w| decision(w, features))
            .collect()
    }
}

impl Classifier for LinearSvm {
    fn predict_proba(&self, features: ArrayView1<f64>) -> Array1<f64> {
        softmax(self.decision_function(features).view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::TrainedModel;
    use crate::learn::testutil::blobs;

    #[test]
    fn separates_blobs() {
        let data = blobs(12, 5, 21);
        let learner = SvmLearner::new(&SvmConfig {
            epochs: 50,
            ..SvmConfig::default()
        });
        let model = TrainedModel::train(&learner, &data, None).unwrap();
        assert!(model.accuracy > 0.95, "accuracy {}", model.accuracy);
        let pred = model.predict(data.features.row(30)).unwrap();
        assert_eq!(pred.label, "high");
        assert!(pred.confidence > 1.0 / 3.0);
        assert_eq!(pred.accuracy, None);
    }

    #[test]
    fn rejects_non_positive_c() {
        let data = blobs(2, 2, 1);
        let learner = SvmLearner::new(&SvmConfig {
            c: 0.0,
            ..SvmConfig::default()
        });
        assert!(learner.fit(data.features.view(), &[0, 0, 1, 1, 2, 2], 3).is_err());
    }
}
