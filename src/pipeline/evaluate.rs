use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;

use super::{file_root, plot_dir, registry};
use crate::config::Config;
use crate::data::loader::read_learn_file;
use crate::data::model::LabeledDataset;
use crate::data::preprocess::{Preprocessor, split_subset};
use crate::error::SlpError;
use crate::learn::Family;
use crate::plot::{plot_path, plot_training_data};

/// Raw (train, test) pair: a seeded split of the learn file when
/// `subset_cross_valid` is set, otherwise the learn file and `test_file`.
fn train_test(
    config: &Config,
    learn_file: &Path,
    test_file: Option<&Path>,
) -> Result<(LabeledDataset, LabeledDataset)> {
    let learn = read_learn_file(learn_file, &config.data, &config.preprocess)?;
    if config.preprocess.subset_cross_valid {
        let (train, test) = split_subset(
            &learn,
            config.preprocess.percent_cross_valid,
            config.preprocess.seed,
        )?;
        log::info!(
            "split {}: {} training / {} test spectra",
            learn_file.display(),
            train.len(),
            test.len()
        );
        return Ok((train, test));
    }
    let test_file = test_file.ok_or(SlpError::MissingTestData)?;
    let test = read_learn_file(test_file, &config.data, &config.preprocess)
        .with_context(|| format!("loading test set {}", test_file.display()))?;
    Ok((learn, test))
}

/// Train every enabled family and report its accuracy on the test data.
pub fn train_accuracy(
    config: &Config,
    learn_file: &Path,
    test_file: Option<&Path>,
) -> Result<Vec<(Family, f64)>> {
    let (raw_train, raw_test) = train_test(config, learn_file, test_file)?;
    let preprocessor = Preprocessor::fit(&raw_train, &config.preprocess)?;
    let train = preprocessor.transform_dataset(&raw_train)?;
    let test = preprocessor.transform_dataset(&raw_test)?;

    if config.plot.training_data {
        let dir = plot_dir(config)?;
        let root = file_root(learn_file);
        // raw test spectra are only comparable on the same axis
        let raw_overlay = if raw_test.energies == raw_train.energies {
            raw_test.features.clone()
        } else {
            Array2::zeros((0, raw_train.n_features()))
        };
        plot_training_data(
            &plot_path(&dir, &root, "_raw"),
            &format!("{root}: raw training data"),
            &raw_train,
            &raw_overlay,
            config.plot.all_spectra,
        )?;
        plot_training_data(
            &plot_path(&dir, &root, "_norm"),
            &format!("{root}: normalised training data"),
            &train,
            &test.features,
            config.plot.all_spectra,
        )?;
    }

    let mut accuracies = Vec::new();
    for entry in registry(config) {
        let model = entry.train(&train)?;
        let accuracy = model.evaluate(&test)?;
        log::info!("{}: accuracy {:.1}%", entry.family.title(), accuracy * 100.0);
        accuracies.push((entry.family, accuracy));
    }
    Ok(accuracies)
}
