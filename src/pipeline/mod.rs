//! Orchestration of the run modes.
//!
//! ```text
//!  learn file ─► loader ─► Preprocessor::fit ─┬─► registry (fixed family order)
//!                                            │        │ train
//!  sample/map ─► loader ─► transform ─────────┴────────┴─► predict ─► summary / map sink / plots
//! ```
//!
//! Every mode takes the immutable [`Config`] by reference. Families never see
//! each other's output.

pub mod batch;
pub mod evaluate;
pub mod map;
pub mod pca;
pub mod single;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::ArrayView1;

use crate::config::{Config, RunSettings};
use crate::data::loader::read_learn_file;
use crate::data::model::LabeledDataset;
use crate::data::preprocess::Preprocessor;
use crate::learn::kmeans::KMeansLearner;
use crate::learn::mlp::MlpLearner;
use crate::learn::svm::SvmLearner;
use crate::learn::{Family, Learner, Prediction, TrainedModel};

pub use batch::{BatchReport, batch_files, learn_predict_batch};
pub use evaluate::train_accuracy;
pub use map::{MapReport, learn_predict_map};
pub use pca::{learn_pca, run_pca};
pub use single::learn_predict_file;

/// One enabled model family and the policy it runs under.
pub struct ModelEntry {
    pub family: Family,
    pub run: RunSettings,
    pub learner: Box<dyn Learner>,
}

impl ModelEntry {
    pub fn train(&self, data: &LabeledDataset) -> Result<TrainedModel> {
        TrainedModel::train(self.learner.as_ref(), data, None)
            .with_context(|| format!("training {}", self.family.title()))
    }

    /// Predict with `shared` when present, otherwise fit a fresh model on `data` first.
    pub fn predict(
        &self,
        shared: Option<&TrainedModel>,
        data: &LabeledDataset,
        features: ArrayView1<f64>,
    ) -> Result<Prediction> {
        match shared {
            Some(model) => model.predict(features),
            None => self.train(data)?.predict(features),
        }
    }
}

fn run_settings(family: Family, config: &Config) -> RunSettings {
    match family {
        Family::Dnn => config.dnn.run(),
        Family::Nn => config.nn.run(),
        Family::Svm => config.svm.run(),
        Family::Tf => config.tf.run(),
        Family::Keras => config.keras.run(),
        Family::KMeans => config.kmeans.run(),
    }
}

fn learner_for(family: Family, config: &Config) -> Box<dyn Learner> {
    match family {
        Family::Dnn => Box::new(MlpLearner::dnn(&config.dnn)),
        Family::Nn => Box::new(MlpLearner::nn(&config.nn)),
        Family::Svm => Box::new(SvmLearner::new(&config.svm)),
        Family::Tf => Box::new(MlpLearner::tf(&config.tf)),
        Family::Keras => Box::new(MlpLearner::keras(&config.keras)),
        Family::KMeans => Box::new(KMeansLearner::new(&config.kmeans)),
    }
}

/// Enabled families in [`Family::ORDER`].
pub fn registry(config: &Config) -> Vec<ModelEntry> {
    Family::ORDER
        .iter()
        .copied()
        .filter(|&family| run_settings(family, config).enabled)
        .map(|family| ModelEntry {
            family,
            run: run_settings(family, config),
            learner: learner_for(family, config),
        })
        .collect()
}

/// File stem used to name plots and outputs.
pub fn file_root(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("spectra")
        .to_string()
}

/// Directory receiving plots, created on demand.
pub(crate) fn plot_dir(config: &Config) -> Result<PathBuf> {
    let dir = PathBuf::from(&config.plot.output_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating plot directory {}", dir.display()))?;
    Ok(dir)
}

/// Training data as loaded, and mapped into the fitted feature space.
pub(crate) struct PreparedTraining {
    pub raw: LabeledDataset,
    pub preprocessor: Preprocessor,
    pub train: LabeledDataset,
}

pub(crate) fn prepare_training(config: &Config, learn_file: &Path) -> Result<PreparedTraining> {
    let raw = read_learn_file(learn_file, &config.data, &config.preprocess)?;
    let preprocessor = Preprocessor::fit(&raw, &config.preprocess)?;
    let train = preprocessor.transform_dataset(&raw)?;
    Ok(PreparedTraining {
        raw,
        preprocessor,
        train,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_follows_fixed_order() {
        let mut config = Config::default();
        config.kmeans.enabled = true;
        config.nn.enabled = true;
        config.tf.enabled = true;
        let families: Vec<Family> = registry(&config).iter().map(|e| e.family).collect();
        assert_eq!(
            families,
            vec![Family::Dnn, Family::Nn, Family::Svm, Family::Tf, Family::KMeans]
        );
    }

    #[test]
    fn registry_carries_run_policy() {
        let mut config = Config::default();
        config.dnn.enabled = false;
        config.svm.enabled = false;
        config.tf.enabled = true;
        let entries = registry(&config);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].learner.family(), Family::Tf);
        assert!(entries[0].run.retrain_per_pixel);
    }

    #[test]
    fn file_root_strips_extension() {
        assert_eq!(file_root(Path::new("/x/train_set.txt")), "train_set");
    }
}
