//! Model families and the trait seam the pipeline drives them through.
//!
//! A [`Learner`] turns a feature matrix and ordinal targets into a
//! [`Classifier`]; [`TrainedModel`] pairs that classifier with the label
//! encoder so callers only ever see class labels.

pub mod encoder;
pub mod kmeans;
pub mod mlp;
pub mod pca;
pub mod svm;

use std::fmt;

use anyhow::Result;
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::data::model::LabeledDataset;
use crate::error::SlpError;
pub use encoder::LabelEncoder;

/// The model families, in the fixed order every mode iterates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Dnn,
    Nn,
    Svm,
    Tf,
    Keras,
    KMeans,
}

impl Family {
    pub const ORDER: [Family; 6] = [
        Family::Dnn,
        Family::Nn,
        Family::Svm,
        Family::Tf,
        Family::Keras,
        Family::KMeans,
    ];

    /// Short tag used in summary columns and output file names.
    pub fn tag(self) -> &'static str {
        match self {
            Family::Dnn => "DNN-TF",
            Family::Nn => "NN",
            Family::Svm => "SVM",
            Family::Tf => "TF",
            Family::Keras => "Keras",
            Family::KMeans => "KM",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Family::Dnn => "Deep Neural Network",
            Family::Nn => "Neural Network",
            Family::Svm => "SVM",
            Family::Tf => "Softmax Network",
            Family::Keras => "Layered Neural Network",
            Family::KMeans => "K-Means Prediction",
        }
    }

    /// Whether summary rows carry an accuracy column for this family.
    pub fn reports_accuracy(self) -> bool {
        matches!(self, Family::Tf)
    }

    /// Number of summary fields one prediction of this family occupies.
    pub fn summary_width(self) -> usize {
        if self.reports_accuracy() { 3 } else { 2 }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outcome of classifying one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label`, in `[0, 1]`.
    pub confidence: f64,
    /// Accuracy of the producing model on its evaluation set.
    pub accuracy: Option<f64>,
}

/// A fitted model working on ordinal classes.
pub trait Classifier: Send + Sync {
    /// Probability for each class index.
    fn predict_proba(&self, features: ArrayView1<f64>) -> Array1<f64>;
}

/// Something that can be trained into a [`Classifier`].
pub trait Learner: Send + Sync {
    fn family(&self) -> Family;

    fn fit(
        &self,
        features: ArrayView2<f64>,
        targets: &[usize],
        n_classes: usize,
    ) -> Result<Box<dyn Classifier>>;
}

/// A classifier plus the label mapping it was trained with.
pub struct TrainedModel {
    pub family: Family,
    encoder: LabelEncoder,
    classifier: Box<dyn Classifier>,
    n_features: usize,
    /// Accuracy on the evaluation set (the training set when none was given).
    pub accuracy: f64,
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("family", &self.family)
            .field("classes", &self.encoder.classes())
            .field("n_features", &self.n_features)
            .field("accuracy", &self.accuracy)
            .finish()
    }
}

impl TrainedModel {
    pub fn train(
        learner: &dyn Learner,
        train: &LabeledDataset,
        eval: Option<&LabeledDataset>,
    ) -> Result<Self> {
        if train.is_empty() {
            return Err(SlpError::EmptyDataset(format!(
                "no training spectra for {}",
                learner.family()
            ))
            .into());
        }
        let encoder = LabelEncoder::fit(&train.labels);
        let targets = encoder.encode_all(&train.labels)?;
        let classifier = learner.fit(train.features.view(), &targets, encoder.n_classes())?;

        let mut model = TrainedModel {
            family: learner.family(),
            encoder,
            classifier,
            n_features: train.n_features(),
            accuracy: 0.0,
        };
        model.accuracy = model.evaluate(eval.unwrap_or(train))?;
        log::info!(
            "{}: trained on {} spectra, {} classes, accuracy {:.1}%",
            model.family,
            train.len(),
            model.encoder.n_classes(),
            model.accuracy * 100.0
        );
        Ok(model)
    }

    pub fn classes(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn predict(&self, features: ArrayView1<f64>) -> Result<Prediction> {
        if features.len() != self.n_features {
            return Err(SlpError::DimensionMismatch {
                what: format!("{} input", self.family),
                expected: self.n_features,
                found: features.len(),
            }
            .into());
        }
        if let Some(j) = features.iter().position(|v| !v.is_finite()) {
            return Err(SlpError::NonFinite(format!("{} input at feature {j}", self.family)).into());
        }
        let proba = self.classifier.predict_proba(features);
        let (best, confidence) = proba
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        if !confidence.is_finite() {
            return Err(SlpError::NonFinite(format!("{} class probabilities", self.family)).into());
        }
        let label = self
            .encoder
            .decode(best)
            .ok_or_else(|| SlpError::UnknownLabel(format!("class #{best}")))?
            .to_string();
        Ok(Prediction {
            label,
            confidence,
            accuracy: self.family.reports_accuracy().then_some(self.accuracy),
        })
    }

    /// Fraction of `data` classified correctly; labels never seen in training count as misses.
    pub fn evaluate(&self, data: &LabeledDataset) -> Result<f64> {
        if data.is_empty() {
            return Err(SlpError::EmptyDataset("evaluation set".into()).into());
        }
        let mut correct = 0usize;
        for (row, label) in data.features.rows().into_iter().zip(&data.labels) {
            if self.predict(row)?.label == *label {
                correct += 1;
            }
        }
        Ok(correct as f64 / data.len() as f64)
    }
}

/// Row-wise softmax of a score vector.
pub(crate) fn softmax(scores: ArrayView1<f64>) -> Array1<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = scores.mapv(|s| (s - max).exp());
    let sum = exp.sum();
    exp / sum
}

#[cfg(test)]
pub(crate) mod testutil {
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use crate::data::model::LabeledDataset;

    /// Three well separated Gaussian blobs in `dims` dimensions.
    pub fn blobs(per_class: usize, dims: usize, seed: u64) -> LabeledDataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let centres = [-4.0, 0.0, 4.0];
        let names = ["low", "mid", "high"];
        let n = per_class * centres.len();
        let mut features = Array2::zeros((n, dims));
        let mut labels = Vec::with_capacity(n);
        for (c, (&centre, name)) in centres.iter().zip(names).enumerate() {
            for i in 0..per_class {
                let row = c * per_class + i;
                for d in 0..dims {
                    let offset = if d % 3 == c { centre } else { -centre * 0.5 };
                    features[[row, d]] = offset + rng.gen_range(-0.5..0.5);
                }
                labels.push(name.to_string());
            }
        }
        LabeledDataset {
            energies: (0..dims).map(|d| 100.0 + d as f64).collect(),
            labels,
            features,
            norm_index: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Constant([f64; 2]);

    impl Classifier for Constant {
        fn predict_proba(&self, _: ArrayView1<f64>) -> Array1<f64> {
            Array1::from(self.0.to_vec())
        }
    }

    struct ConstantLearner([f64; 2]);

    const LEARNER: ConstantLearner = ConstantLearner([0.2, 0.8]);

    impl Learner for ConstantLearner {
        fn family(&self) -> Family {
            Family::Tf
        }

        fn fit(&self, _: ArrayView2<f64>, _: &[usize], _: usize) -> Result<Box<dyn Classifier>> {
            Ok(Box::new(Constant(self.0)))
        }
    }

    #[test]
    fn trained_model_decodes_best_class() {
        let data = testutil::blobs(2, 3, 1);
        let model = TrainedModel::train(&LEARNER, &data, None).unwrap();
        let pred = model.predict(data.features.row(0)).unwrap();
        // classes sort as high, low, mid
        assert_eq!(pred.label, "low");
        assert!((pred.confidence - 0.8).abs() < 1e-12);
        assert!(pred.accuracy.is_some());
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let data = testutil::blobs(2, 3, 1);
        let model = TrainedModel::train(&LEARNER, &data, None).unwrap();
        let err = model.predict(array![1.0, 2.0].view()).unwrap_err();
        assert!(err.downcast_ref::<SlpError>().is_some());
    }

    #[test]
    fn rejects_nan_input() {
        let data = testutil::blobs(2, 3, 1);
        let model = TrainedModel::train(&LEARNER, &data, None).unwrap();
        let err = model.predict(array![1.0, f64::NAN, 2.0].view()).unwrap_err();
        assert!(matches!(err.downcast_ref::<SlpError>(), Some(SlpError::NonFinite(_))));
    }

    #[test]
    fn nan_probabilities_are_an_error_not_class_zero() {
        let data = testutil::blobs(2, 3, 1);
        let learner = ConstantLearner([0.5, 0.5]);
        let mut model = TrainedModel::train(&learner, &data, None).unwrap();
        model.classifier = Box::new(Constant([f64::NAN, f64::NAN]));
        let err = model.predict(data.features.row(0)).unwrap_err();
        assert!(matches!(err.downcast_ref::<SlpError>(), Some(SlpError::NonFinite(_))));
    }

    #[test]
    fn family_order_and_widths() {
        let widths: Vec<usize> = Family::ORDER.iter().map(|f| f.summary_width()).collect();
        assert_eq!(widths, vec![2, 2, 2, 3, 2, 2]);
        assert_eq!(Family::ORDER[0], Family::Dnn);
        assert_eq!(Family::ORDER[5], Family::KMeans);
    }

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(array![1.0, 2.0, 3.0].view());
        assert!((p.sum() - 1.0).abs() < 1e-12);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }
}
