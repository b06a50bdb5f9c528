use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::learn::Family;

/// Classification-kind tag written with every map record.
pub const KIND_TAG: &str = "HC";

/// `<map stem>_<family tag>_<kind>.csv`, next to the map file.
pub fn map_output_path(map_file: &Path, family: Family) -> PathBuf {
    let stem = map_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("map");
    map_file.with_file_name(format!("{stem}_{}_{KIND_TAG}.csv", family.tag()))
}

/// Per-family record files for a map sweep. Each record is
/// `family, kind, label, x, y`; one record per pixel per family.
pub struct MapSink {
    writers: BTreeMap<Family, (PathBuf, csv::Writer<File>)>,
}

impl MapSink {
    /// Open one output file per family for appending, creating it if missing.
    /// Records from earlier runs on the same map are kept.
    pub fn create(map_file: &Path, families: &[Family]) -> Result<Self> {
        let mut writers = BTreeMap::new();
        for &family in families {
            let path = map_output_path(map_file, family);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening map output {}", path.display()))?;
            let writer = csv::WriterBuilder::new().from_writer(file);
            writers.insert(family, (path, writer));
        }
        Ok(MapSink { writers })
    }

    pub fn record(&mut self, family: Family, label: &str, x: f64, y: f64) -> Result<()> {
        let Some((_, writer)) = self.writers.get_mut(&family) else {
            bail!("no map output opened for {family}");
        };
        let (xs, ys) = (x.to_string(), y.to_string());
        writer.write_record([family.tag(), KIND_TAG, label, xs.as_str(), ys.as_str()])?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.writers.len());
        for (_, (path, mut writer)) in self.writers {
            writer
                .flush()
                .with_context(|| format!("flushing {}", path.display()))?;
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_carries_family_and_kind() {
        let p = map_output_path(Path::new("/data/sample_map.txt"), Family::Svm);
        assert_eq!(p, Path::new("/data/sample_map_SVM_HC.csv"));
    }

    #[test]
    fn records_land_in_family_files() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("m.txt");
        let mut sink = MapSink::create(&map, &[Family::Nn, Family::KMeans]).unwrap();
        sink.record(Family::Nn, "A", 0.0, 1.5).unwrap();
        sink.record(Family::KMeans, "B", 0.0, 1.5).unwrap();
        assert!(sink.record(Family::Svm, "B", 0.0, 1.5).is_err());
        let paths = sink.finish().unwrap();
        assert_eq!(paths.len(), 2);
        let nn = std::fs::read_to_string(dir.path().join("m_NN_HC.csv")).unwrap();
        assert_eq!(nn.trim(), "NN,HC,A,0,1.5");
    }

    #[test]
    fn second_sweep_appends_to_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("m.txt");
        for (label, y) in [("A", 0.0), ("B", 1.0)] {
            let mut sink = MapSink::create(&map, &[Family::Svm]).unwrap();
            sink.record(Family::Svm, label, 2.0, y).unwrap();
            sink.finish().unwrap();
        }
        let text = std::fs::read_to_string(dir.path().join("m_SVM_HC.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["SVM,HC,A,2,0", "SVM,HC,B,2,1"]);
    }
}
