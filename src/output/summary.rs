//! Summary CSV: one header block, then one row per processed file.
//!
//! Rows are produced by any number of workers but written by exactly one
//! thread: workers send completed [`ResultRow`]s through a channel to the
//! writer, which owns the file handle.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};

use crate::learn::{Family, Prediction};

/// Predictions for one source file, in fixed family order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub file: String,
    pub predictions: Vec<(Family, Prediction)>,
}

impl ResultRow {
    /// CSV fields: file name, then label / confidence% (/ accuracy%) per family.
    pub fn to_record(&self) -> Vec<String> {
        let mut record = vec![self.file.clone()];
        for (family, pred) in &self.predictions {
            record.push(pred.label.clone());
            record.push(format!("{:.1}", pred.confidence * 100.0));
            if family.reports_accuracy() {
                record.push(format!("{:.1}", pred.accuracy.unwrap_or(0.0) * 100.0));
            }
        }
        record
    }
}

/// Column names matching [`ResultRow::to_record`] for `families`.
pub fn header_columns(families: &[Family]) -> Vec<String> {
    let mut columns = vec!["File".to_string()];
    for family in families {
        columns.push(format!("{}-HC", family.tag()));
        columns.push(format!("{}-Prob%", family.tag()));
        if family.reports_accuracy() {
            columns.push(format!("{}-Accuracy%", family.tag()));
        }
    }
    columns
}

/// `summary_YYYY-MM-DD_HH-MM-SS.csv`
pub fn summary_file_name(now: DateTime<Local>) -> String {
    format!("summary{}", now.format("_%Y-%m-%d_%H-%M-%S.csv"))
}

fn csv_writer(path: &Path, truncate: bool) -> Result<csv::Writer<std::fs::File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!truncate)
        .truncate(truncate)
        .open(path)
        .with_context(|| format!("opening summary {}", path.display()))?;
    Ok(csv::WriterBuilder::new().flexible(true).from_writer(file))
}

/// Owner of the summary file for the duration of a batch.
pub struct SummaryWriter {
    path: PathBuf,
    sender: Sender<ResultRow>,
    handle: JoinHandle<Result<usize>>,
}

impl SummaryWriter {
    /// Write the header block, then start the single writer thread.
    pub fn create(path: &Path, learn_file: &str, families: &[Family]) -> Result<Self> {
        {
            let mut header = csv_writer(path, true)?;
            header.write_record(["Training File:", learn_file])?;
            header.write_record(header_columns(families))?;
            header.flush()?;
        }

        let (sender, receiver) = mpsc::channel::<ResultRow>();
        let thread_path = path.to_path_buf();
        let handle = std::thread::Builder::new()
            .name("summary-writer".into())
            .spawn(move || -> Result<usize> {
                let mut writer = csv_writer(&thread_path, false)?;
                let mut written = 0;
                for row in receiver {
                    writer.write_record(row.to_record())?;
                    writer.flush()?;
                    written += 1;
                    log::debug!("summary: wrote row for {}", row.file);
                }
                Ok(written)
            })
            .context("spawning summary writer")?;

        Ok(SummaryWriter {
            path: path.to_path_buf(),
            sender,
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle workers use to submit rows.
    pub fn sender(&self) -> Sender<ResultRow> {
        self.sender.clone()
    }

    /// Close the channel and wait for every queued row to be written.
    /// Returns the number of rows written.
    pub fn finish(self) -> Result<usize> {
        let SummaryWriter { sender, handle, .. } = self;
        drop(sender);
        handle
            .join()
            .map_err(|_| anyhow!("summary writer thread panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(label: &str, accuracy: Option<f64>) -> Prediction {
        Prediction {
            label: label.into(),
            confidence: 0.875,
            accuracy,
        }
    }

    #[test]
    fn row_width_follows_family_widths() {
        let row = ResultRow {
            file: "a.txt".into(),
            predictions: vec![
                (Family::Dnn, pred("A", None)),
                (Family::Tf, pred("B", Some(0.5))),
                (Family::KMeans, pred("A", None)),
            ],
        };
        let record = row.to_record();
        assert_eq!(record.len(), 1 + 2 + 3 + 2);
        assert_eq!(record, vec!["a.txt", "A", "87.5", "B", "87.5", "50.0", "A", "87.5"]);
        assert_eq!(header_columns(&[Family::Dnn, Family::Tf, Family::KMeans]).len(), record.len());
    }

    #[test]
    fn file_name_has_timestamp() {
        let now = Local::now();
        let name = summary_file_name(now);
        assert!(name.starts_with("summary_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "summary_2024-01-01_00-00-00.csv".len());
    }

    #[test]
    fn writer_puts_header_before_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let writer = SummaryWriter::create(&path, "train.txt", &[Family::Svm]).unwrap();
        let tx = writer.sender();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    tx.send(ResultRow {
                        file: format!("f{i}.txt"),
                        predictions: vec![(Family::Svm, pred("A", None))],
                    })
                    .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        drop(tx);
        assert_eq!(writer.finish().unwrap(), 4);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Training File:,train.txt");
        assert_eq!(lines[1], "File,SVM-HC,SVM-Prob%");
        assert_eq!(lines.len(), 6);
        assert!(lines[2..].iter().all(|l| l.split(',').count() == 3));
    }
}
