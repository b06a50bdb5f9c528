//! Batch mode: one summary row per prediction file in a directory.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use anyhow::{Context, Result};
use chrono::Local;
use rayon::prelude::*;

use super::{ModelEntry, prepare_training, registry};
use crate::config::Config;
use crate::data::loader::read_pred_file;
use crate::data::model::LabeledDataset;
use crate::data::preprocess::Preprocessor;
use crate::error::SlpError;
use crate::learn::{Family, TrainedModel};
use crate::output::summary::summary_file_name;
use crate::output::{ResultRow, SummaryWriter};

#[derive(Debug)]
pub struct BatchReport {
    pub summary_path: PathBuf,
    /// Rows written to the summary.
    pub processed: usize,
    /// Files whose row was dropped, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Every `*.txt` file in `dir` except `learn_file`, sorted by name.
pub fn batch_files(dir: &Path, learn_file: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let is_txt = path.extension().is_some_and(|ext| ext == "txt");
        // hidden files, including editor and OS sidecars such as `._a.txt`
        let hidden = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        if path.is_file() && is_txt && !hidden && !same_file(&path, learn_file) {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(SlpError::EmptyBatch(dir.display().to_string()).into());
    }
    files.sort();
    Ok(files)
}

/// Everything a worker needs, shared read-only across threads.
struct BatchContext<'a> {
    entries: &'a [ModelEntry],
    shared: &'a [Option<TrainedModel>],
    preprocessor: &'a Preprocessor,
    train: &'a LabeledDataset,
}

impl BatchContext<'_> {
    fn process(&self, path: &Path, rows: &Sender<ResultRow>) -> Result<()> {
        let input = read_pred_file(path)?;
        let features = self.preprocessor.transform_input(&input)?;
        let mut predictions = Vec::with_capacity(self.entries.len());
        for (entry, shared) in self.entries.iter().zip(self.shared) {
            let prediction = entry.predict(shared.as_ref(), self.train, features.view())?;
            predictions.push((entry.family, prediction));
        }
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        log::info!("{file}: done");
        rows.send(ResultRow { file, predictions })
            .context("summary writer stopped")?;
        Ok(())
    }

    fn run(&self, path: &PathBuf, rows: &Sender<ResultRow>) -> Option<(PathBuf, String)> {
        match self.process(path, rows) {
            Ok(()) => None,
            Err(err) => {
                log::error!("{}: {err:#}", path.display());
                Some((path.clone(), format!("{err:#}")))
            }
        }
    }
}

/// Classify every prediction file in `dir`, writing one summary row per file.
///
/// Families with `always_retrain` are fitted again for each file; the rest are
/// trained once and shared. A failing file costs only its own row.
pub fn learn_predict_batch(config: &Config, learn_file: &Path, dir: &Path) -> Result<BatchReport> {
    let files = batch_files(dir, learn_file)?;
    let prepared = prepare_training(config, learn_file)?;
    let entries = registry(config);

    let shared = entries
        .iter()
        .map(|entry| {
            if entry.run.always_retrain {
                Ok(None)
            } else {
                entry.train(&prepared.train).map(Some)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let families: Vec<Family> = entries.iter().map(|e| e.family).collect();
    let learn_name = learn_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| learn_file.display().to_string());
    let summary_path = dir.join(summary_file_name(Local::now()));
    let writer = SummaryWriter::create(&summary_path, &learn_name, &families)?;
    log::info!(
        "batch: {} files, summary {}",
        files.len(),
        writer.path().display()
    );

    let ctx = BatchContext {
        entries: &entries,
        shared: &shared,
        preprocessor: &prepared.preprocessor,
        train: &prepared.train,
    };

    let failed: Vec<(PathBuf, String)> = if config.system.multi_proc {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.system.num_cores)
            .build()
            .context("building batch thread pool")?;
        pool.install(|| {
            files
                .par_iter()
                .map_with(writer.sender(), |rows, path| ctx.run(path, rows))
                .flatten()
                .collect()
        })
    } else {
        let rows = writer.sender();
        files.iter().filter_map(|path| ctx.run(path, &rows)).collect()
    };

    let processed = writer.finish()?;
    log::info!("batch: {processed} rows written, {} failed", failed.len());
    Ok(BatchReport {
        summary_path,
        processed,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_skips_learn_file_hidden_files_and_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["train.txt", "b.txt", "a.txt", "notes.md", ".cache.txt", "._a.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.txt")).unwrap();
        let files = batch_files(dir.path(), &dir.path().join("train.txt")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train.txt"), "").unwrap();
        let err = batch_files(dir.path(), &dir.path().join("train.txt")).unwrap_err();
        assert!(matches!(err.downcast_ref::<SlpError>(), Some(SlpError::EmptyBatch(_))));
    }
}
