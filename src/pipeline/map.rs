//! Map mode: classify every pixel of a 2D map with every enabled family.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{file_root, plot_dir, prepare_training, registry};
use crate::config::Config;
use crate::data::loader::read_pred_map;
use crate::error::SlpError;
use crate::learn::{Family, TrainedModel};
use crate::output::MapSink;
use crate::plot::{plot_map, plot_path};

#[derive(Debug)]
pub struct MapReport {
    /// One record file per family.
    pub outputs: Vec<PathBuf>,
    pub plots: Vec<PathBuf>,
    /// Per family, the label of every pixel in map order.
    pub labels: Vec<(Family, Vec<String>)>,
}

/// Train on `learn_file` and sweep every pixel of `map_file`.
///
/// Families are trained once before the sweep unless `retrain_per_pixel` is
/// set, in which case a fresh model is fitted for every pixel.
pub fn learn_predict_map(config: &Config, learn_file: &Path, map_file: &Path) -> Result<MapReport> {
    let prepared = prepare_training(config, learn_file)?;
    let map = read_pred_map(map_file)?;
    if map.is_empty() {
        return Err(SlpError::EmptyDataset(format!("map {}", map_file.display())).into());
    }
    let entries = registry(config);

    let shared = entries
        .iter()
        .map(|entry| {
            if entry.run.retrain_per_pixel {
                log::info!("{}: retraining for each of {} pixels", entry.family.title(), map.len());
                Ok(None)
            } else {
                entry.train(&prepared.train).map(Some)
            }
        })
        .collect::<Result<Vec<Option<TrainedModel>>>>()?;

    let families: Vec<Family> = entries.iter().map(|e| e.family).collect();
    let mut sink = MapSink::create(map_file, &families)?;
    let mut labels: Vec<Vec<String>> = vec![Vec::with_capacity(map.len()); entries.len()];

    for i in 0..map.len() {
        let features = prepared.preprocessor.transform_input(&map.pixel(i))?;
        let (x, y) = (map.x[i], map.y[i]);
        for ((entry, model), column) in entries.iter().zip(&shared).zip(labels.iter_mut()) {
            let prediction = entry.predict(model.as_ref(), &prepared.train, features.view())?;
            sink.record(entry.family, &prediction.label, x, y)?;
            column.push(prediction.label);
        }
        log::debug!("pixel {i} ({x}, {y}) classified");
    }
    let outputs = sink.finish()?;

    let mut plots = Vec::new();
    let root = file_root(map_file);
    for (entry, column) in entries.iter().zip(&labels) {
        if !entry.run.plot_map {
            continue;
        }
        let path = plot_path(&plot_dir(config)?, &root, &format!("_{}_map", entry.family.tag()));
        plot_map(&path, &map.x, &map.y, column, entry.family.title())?;
        plots.push(path);
    }

    Ok(MapReport {
        outputs,
        plots,
        labels: families.into_iter().zip(labels).collect(),
    })
}
