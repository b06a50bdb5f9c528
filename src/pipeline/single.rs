use std::path::Path;

use anyhow::Result;
use ndarray::Axis;

use super::{file_root, plot_dir, prepare_training, registry, run_pca};
use crate::config::Config;
use crate::data::loader::read_pred_file;
use crate::output::ResultRow;
use crate::plot::{plot_path, plot_training_data};

/// Train every enabled family on `learn_file` and classify `sample_file`.
///
/// Any failure aborts the run; there is no partial row.
pub fn learn_predict_file(config: &Config, learn_file: &Path, sample_file: &Path) -> Result<ResultRow> {
    let prepared = prepare_training(config, learn_file)?;
    let root = file_root(learn_file);

    if config.pca.enabled {
        run_pca(config, &prepared.raw, None, &root)?;
    }

    let input = read_pred_file(sample_file)?;
    let features = prepared.preprocessor.transform_input(&input)?;

    if config.plot.training_data {
        let path = plot_path(&plot_dir(config)?, &root, "_train");
        let overlay = features.clone().insert_axis(Axis(0));
        plot_training_data(
            &path,
            &format!("{root}: training data"),
            &prepared.train,
            &overlay,
            config.plot.all_spectra,
        )?;
    }

    let mut predictions = Vec::new();
    for entry in registry(config) {
        let model = entry.train(&prepared.train)?;
        let prediction = model.predict(features.view())?;
        log::info!(
            "{}: {} ({:.1}%)",
            entry.family.title(),
            prediction.label,
            prediction.confidence * 100.0
        );
        predictions.push((entry.family, prediction));
    }

    Ok(ResultRow {
        file: sample_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| sample_file.display().to_string()),
        predictions,
    })
}
