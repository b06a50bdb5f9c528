//! Writes a synthetic data set for trying out `spectra-learn`:
//!
//! * `train.txt`       labeled training spectra (three classes)
//! * `sample_<n>.txt`  single spectra to classify
//! * `map.dat`         a small 2D map (not `.txt`, so batch mode skips it)
//! * `train.parquet`   the training spectra as a tabular dataset with a `label` column
//!
//! Usage: `generate-sample [output dir]` (default `sample_data`).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// (centre, width, amplitude) of each peak.
type Peaks = [(f64, f64, f64); 3];

const CLASSES: [(&str, Peaks); 3] = [
    ("1", [(520.0, 12.0, 6.0), (1000.0, 20.0, 3.0), (1600.0, 25.0, 4.0)]),
    ("2", [(780.0, 15.0, 5.0), (1350.0, 30.0, 6.0), (1600.0, 25.0, 4.0)]),
    ("3", [(640.0, 18.0, 4.0), (1150.0, 22.0, 2.0), (1600.0, 25.0, 4.0)]),
];

const PER_CLASS: usize = 12;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut ChaCha8Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn generate_spectrum(
    energies: &[f64],
    peaks: &Peaks,
    scale: f64,
    noise_level: f64,
    rng: &mut ChaCha8Rng,
) -> Vec<f64> {
    energies
        .iter()
        .map(|&e| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(e, mu, sigma, amp * scale))
                .sum();
            // sloped baseline
            signal + 0.5 + e * 2e-4 + gauss(rng, 0.0, noise_level)
        })
        .collect()
}

fn join(values: &[f64]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{v:.4}");
    }
    out
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn write_parquet(path: &Path, energies: &[f64], labels: &[String], spectra: &[Vec<f64>]) -> Result<()> {
    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for row in spectra {
        x_builder.values().append_slice(energies);
        x_builder.append(true);
        y_builder.values().append_slice(row);
        y_builder.append(true);
    }
    let scale: Vec<f64> = spectra
        .iter()
        .map(|row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();

    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item.clone()), false),
        Field::new("y", DataType::List(item), false),
        Field::new("label", DataType::Utf8, false),
        Field::new("peak_max", DataType::Float64, false),
        Field::new("measurement_id", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(StringArray::from(
                labels.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(scale)),
            Arc::new(Int64Array::from((0..labels.len() as i64).collect::<Vec<_>>())),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn run(out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    // Raman shift 400 → 2000, step 4
    let energies: Vec<f64> = (0..=400).map(|i| 400.0 + i as f64 * 4.0).collect();

    let mut labels = Vec::new();
    let mut spectra = Vec::new();
    let mut train = format!("0 {}\n", join(&energies));
    for (label, peaks) in &CLASSES {
        for _ in 0..PER_CLASS {
            let scale = rng.gen_range(0.6..1.6);
            let y = generate_spectrum(&energies, peaks, scale, 0.05, &mut rng);
            let _ = writeln!(train, "{label} {}", join(&y));
            labels.push(label.to_string());
            spectra.push(y);
        }
    }
    write_text(&out_dir.join("train.txt"), &train)?;
    write_parquet(&out_dir.join("train.parquet"), &energies, &labels, &spectra)?;

    for (n, (_, peaks)) in CLASSES.iter().enumerate() {
        let y = generate_spectrum(&energies, peaks, 1.0, 0.05, &mut rng);
        let mut text = String::new();
        for (e, v) in energies.iter().zip(&y) {
            let _ = writeln!(text, "{e:.1}\t{v:.4}");
        }
        write_text(&out_dir.join(format!("sample_{}.txt", n + 1)), &text)?;
    }

    // 6 × 4 map: class changes along x
    let mut map = format!("0 0 {}\n", join(&energies));
    for yi in 0..4 {
        for xi in 0..6 {
            let (_, peaks) = &CLASSES[(xi / 2) % CLASSES.len()];
            let y = generate_spectrum(&energies, peaks, 1.0, 0.08, &mut rng);
            let _ = writeln!(map, "{} {} {}", xi as f64 * 10.0, yi as f64 * 10.0, join(&y));
        }
    }
    write_text(&out_dir.join("map.dat"), &map)?;

    println!(
        "Wrote {} training spectra ({} energies each), {} samples and a 24-pixel map to {}",
        labels.len(),
        energies.len(),
        CLASSES.len(),
        out_dir.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    run(&out_dir)
}
