use std::path::Path;

use anyhow::Result;

use super::{file_root, plot_dir};
use crate::config::Config;
use crate::data::loader::read_learn_file;
use crate::data::model::LabeledDataset;
use crate::learn::pca::{self, PcaFit, component_count};
use crate::plot::plot_pca;

/// PCA diagnostic on the training set as loaded, before normalisation and scaling.
///
/// `components` overrides both the config and the one-per-label default.
pub fn run_pca(
    config: &Config,
    train: &LabeledDataset,
    components: Option<usize>,
    root: &str,
) -> Result<PcaFit> {
    let k = component_count(
        train.distinct_labels().len(),
        components.or(config.pca.custom_components),
    );
    log::info!("PCA: {k} components on {} spectra", train.len());
    let fit = pca::fit(train.features.view(), k)?;
    for (i, ratio) in fit.explained_variance_ratio.iter().enumerate() {
        log::info!("Score PC {i}: {:.1}%", ratio * 100.0);
    }
    if config.pca.show_plots {
        for path in plot_pca(&plot_dir(config)?, root, &train.energies, &fit, &train.labels)? {
            log::info!("PCA plot written to {}", path.display());
        }
    }
    Ok(fit)
}

/// Load `learn_file` and run the PCA diagnostic on it.
pub fn learn_pca(config: &Config, learn_file: &Path, components: Option<usize>) -> Result<PcaFit> {
    let raw = read_learn_file(learn_file, &config.data, &config.preprocess)?;
    run_pca(config, &raw, components, &file_root(learn_file))
}
