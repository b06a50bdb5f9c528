use std::path::Path;

use anyhow::Result;
use ndarray::{Array1, Array2, Axis};
use plotters::prelude::*;

use super::{SIZE, padded_range, rgb};
use crate::color::LabelColors;
use crate::data::model::LabeledDataset;

/// Mean spectrum of every label, in first-occurrence order.
fn class_means(train: &LabeledDataset) -> Vec<(String, Array1<f64>)> {
    train
        .distinct_labels()
        .into_iter()
        .filter_map(|label| {
            let rows: Vec<usize> = train
                .labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == label)
                .map(|(i, _)| i)
                .collect();
            let mean = train.features.select(Axis(0), &rows).mean_axis(Axis(0))?;
            Some((label, mean))
        })
        .collect()
}

/// Training spectra coloured by label, with `overlay` rows (prediction or test
/// spectra on the same energy axis) drawn in black on top.
pub fn plot_training_data(
    path: &Path,
    title: &str,
    train: &LabeledDataset,
    overlay: &Array2<f64>,
    all_spectra: bool,
) -> Result<()> {
    write_training_plot(path, title, train, overlay, all_spectra, true)?;
    log::info!("training data plot written to {}", path.display());
    Ok(())
}

/// `text` off leaves out the caption, tick labels and legend, so no font is needed.
pub(crate) fn write_training_plot(
    path: &Path,
    title: &str,
    train: &LabeledDataset,
    overlay: &Array2<f64>,
    all_spectra: bool,
    text: bool,
) -> Result<()> {
    let colors = LabelColors::new(&train.labels);
    let series: Vec<(String, Array1<f64>)> = if all_spectra {
        train
            .labels
            .iter()
            .cloned()
            .zip(train.features.rows().into_iter().map(|r| r.to_owned()))
            .collect()
    } else {
        class_means(train)
    };

    let (x_lo, x_hi) = padded_range(train.energies.iter().copied());
    let (y_lo, y_hi) = padded_range(
        series
            .iter()
            .flat_map(|(_, s)| s.iter().copied())
            .chain(overlay.iter().copied()),
    );

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(12).x_label_area_size(40).y_label_area_size(60);
    if text {
        builder.caption(title, ("sans-serif", 22));
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    let mut mesh = chart.configure_mesh();
    if text {
        mesh.x_desc("Raman shift [1/cm]").y_desc("Intensity");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let mut labelled = std::collections::BTreeSet::new();
    for (label, spectrum) in &series {
        let color = rgb(colors.color_for(label));
        let points = train.energies.iter().copied().zip(spectrum.iter().copied());
        let drawn = chart.draw_series(LineSeries::new(points, color.stroke_width(1)))?;
        if labelled.insert(label.clone()) {
            drawn
                .label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
    }
    for row in overlay.rows() {
        let points = train.energies.iter().copied().zip(row.iter().copied());
        chart.draw_series(LineSeries::new(points, BLACK.stroke_width(2)))?;
    }

    if text {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn class_means_average_rows_per_label() {
        let ds = LabeledDataset {
            energies: vec![1.0, 2.0],
            labels: vec!["A".into(), "B".into(), "A".into()],
            features: array![[1.0, 3.0], [5.0, 5.0], [3.0, 5.0]],
            norm_index: None,
        };
        let means = class_means(&ds);
        assert_eq!(means[0].0, "A");
        assert_eq!(means[0].1, array![2.0, 4.0]);
        assert_eq!(means[1].1, array![5.0, 5.0]);
    }

    #[test]
    fn writes_training_plot_with_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let ds = LabeledDataset {
            energies: vec![100.0, 200.0, 300.0],
            labels: vec!["A".into(), "B".into(), "A".into()],
            features: array![[1.0, 3.0, 2.0], [5.0, 5.0, 4.0], [3.0, 5.0, 1.0]],
            norm_index: None,
        };
        let overlay = array![[2.0, 2.5, 3.0]];
        for all_spectra in [false, true] {
            let path = dir.path().join(format!("train_{all_spectra}.png"));
            write_training_plot(&path, "train", &ds, &overlay, all_spectra, false).unwrap();
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }
    }
}
