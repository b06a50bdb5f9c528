use std::path::{Path, PathBuf};

use anyhow::Result;
use plotters::data::fitting_range;
use plotters::prelude::*;

use super::{SIZE, padded_range, plot_path, rgb};
use crate::color::LabelColors;
use crate::learn::pca::PcaFit;

fn pc_label(fit: &PcaFit, i: usize) -> String {
    format!("PC{i} ({:.0}%)", fit.explained_variance_ratio[i] * 100.0)
}

/// Loadings, score scatter, per-component score box plot and, for numeric
/// labels, one score-vs-label scatter per component.
/// Returns the written file paths.
pub fn plot_pca(
    dir: &Path,
    root_name: &str,
    energies: &[f64],
    fit: &PcaFit,
    labels: &[String],
) -> Result<Vec<PathBuf>> {
    write_pca_plots(dir, root_name, energies, fit, labels, true)
}

/// `text` off draws no captions, tick labels or legends, so no font is needed.
pub(crate) fn write_pca_plots(
    dir: &Path,
    root_name: &str,
    energies: &[f64],
    fit: &PcaFit,
    labels: &[String],
    text: bool,
) -> Result<Vec<PathBuf>> {
    let colors = LabelColors::new(labels);
    let mut written = Vec::new();

    let loadings = plot_path(dir, root_name, "_pca_loadings");
    plot_loadings(&loadings, energies, fit, text)?;
    written.push(loadings);

    if fit.n_components() >= 2 {
        let scores = plot_path(dir, root_name, "_pca_scores");
        plot_scores(&scores, fit, labels, &colors, text)?;
        written.push(scores);
    }

    let boxes = plot_path(dir, root_name, "_pca_box");
    plot_score_boxes(&boxes, fit, labels, &colors, text)?;
    written.push(boxes);

    match label_values(labels) {
        Some(values) => {
            for j in 0..fit.n_components() {
                let path = plot_path(dir, root_name, &format!("_pca_pc{j}_vs_label"));
                plot_scores_vs_label(&path, fit, j, labels, &values, &colors, text)?;
                written.push(path);
            }
        }
        None => log::debug!("labels are not numeric, skipping score vs label plots"),
    }
    Ok(written)
}

/// Labels as numbers, `None` when any label is not numeric.
fn label_values(labels: &[String]) -> Option<Vec<f64>> {
    labels
        .iter()
        .map(|l| l.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

fn plot_loadings(path: &Path, energies: &[f64], fit: &PcaFit, text: bool) -> Result<()> {
    let palette = LabelColors::new(
        &(0..fit.n_components()).map(|i| i.to_string()).collect::<Vec<_>>(),
    );
    let (x_lo, x_hi) = padded_range(energies.iter().copied());
    let (y_lo, y_hi) = padded_range(fit.components.iter().copied());

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(12).x_label_area_size(40).y_label_area_size(60);
    if text {
        builder.caption("Loadings plot", ("sans-serif", 22));
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    let mut mesh = chart.configure_mesh();
    if text {
        mesh.x_desc("Raman shift [1/cm]").y_desc("Principal component");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    for (i, component) in fit.components.rows().into_iter().enumerate() {
        let color = rgb(palette.color_for(&i.to_string()));
        let points = energies.iter().copied().zip(component.iter().copied());
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(pc_label(fit, i))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    // zero line
    chart.draw_series(DashedLineSeries::new(
        [(x_lo, 0.0), (x_hi, 0.0)],
        6,
        4,
        BLACK.stroke_width(1),
    ))?;

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

fn plot_scores(
    path: &Path,
    fit: &PcaFit,
    labels: &[String],
    colors: &LabelColors,
    text: bool,
) -> Result<()> {
    let (x_lo, x_hi) = padded_range(fit.scores.column(0).iter().copied());
    let (y_lo, y_hi) = padded_range(fit.scores.column(1).iter().copied());

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(12).x_label_area_size(40).y_label_area_size(60);
    if text {
        builder.caption("Score plot", ("sans-serif", 22));
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    let mut mesh = chart.configure_mesh();
    if text {
        mesh.x_desc(pc_label(fit, 0)).y_desc(pc_label(fit, 1));
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    for (label, color) in colors.legend_entries() {
        let color = rgb(color);
        let points: Vec<(f64, f64)> = labels
            .iter()
            .zip(fit.scores.rows())
            .filter(|(l, _)| **l == label)
            .map(|(_, s)| (s[0], s[1]))
            .collect();
        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))?
            .label(label)
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
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

fn plot_score_boxes(
    path: &Path,
    fit: &PcaFit,
    labels: &[String],
    colors: &LabelColors,
    text: bool,
) -> Result<()> {
    let k = fit.n_components() as u32;
    let columns: Vec<Vec<f64>> = fit.scores.columns().into_iter().map(|c| c.to_vec()).collect();
    let range = fitting_range(fit.scores.iter().map(|&v| v as f32).collect::<Vec<f32>>().iter());
    let pad = ((range.end - range.start) * 0.05).max(1e-3);

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(12).x_label_area_size(40).y_label_area_size(60);
    if text {
        builder.caption("Score box plot", ("sans-serif", 22));
    }
    let mut chart = builder
        .build_cartesian_2d((0..k).into_segmented(), range.start - pad..range.end + pad)?;
    let mut mesh = chart.configure_mesh();
    if text {
        mesh.x_desc("Principal Component").y_desc("Score");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    chart.draw_series(columns.iter().enumerate().map(|(j, values)| {
        Boxplot::new_vertical(SegmentValue::CenterOf(j as u32), &Quartiles::new(values.as_slice()))
    }))?;

    for (j, values) in columns.iter().enumerate() {
        let points: Vec<(SegmentValue<u32>, f32, RGBColor)> = values
            .iter()
            .zip(labels)
            .map(|(&v, l)| {
                (
                    SegmentValue::CenterOf(j as u32),
                    v as f32,
                    rgb(colors.color_for(l)),
                )
            })
            .collect();
        chart.draw_series(
            points
                .into_iter()
                .map(|(x, y, c)| Circle::new((x, y), 3, c.mix(0.8).filled())),
        )?;
    }
    root.present()?;
    Ok(())
}

/// Score on component `j` against the numeric label of each spectrum.
fn plot_scores_vs_label(
    path: &Path,
    fit: &PcaFit,
    j: usize,
    labels: &[String],
    values: &[f64],
    colors: &LabelColors,
    text: bool,
) -> Result<()> {
    let (x_lo, x_hi) = padded_range(values.iter().copied());
    let (y_lo, y_hi) = padded_range(fit.scores.column(j).iter().copied());

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(12).x_label_area_size(40).y_label_area_size(60);
    if text {
        builder.caption(format!("Scores vs label, PC{j}"), ("sans-serif", 22));
    }
    let mut chart = builder.build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    let mut mesh = chart.configure_mesh();
    if text {
        mesh.x_desc("Label").y_desc(pc_label(fit, j));
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;

    let points: Vec<(f64, f64, RGBColor)> = values
        .iter()
        .zip(fit.scores.column(j))
        .zip(labels)
        .map(|((&x, &y), l)| (x, y, rgb(colors.color_for(l))))
        .collect();
    chart.draw_series(
        points
            .into_iter()
            .map(|(x, y, c)| Circle::new((x, y), 4, c.filled())),
    )?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::pca::fit;
    use ndarray::array;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_labels_parse_and_text_labels_do_not() {
        assert_eq!(label_values(&labels(&["1", "2.5", " 3 "])), Some(vec![1.0, 2.5, 3.0]));
        assert_eq!(label_values(&labels(&["1", "b"])), None);
        assert_eq!(label_values(&labels(&["nan"])), None);
    }

    #[test]
    fn writes_every_pca_plot() {
        let dir = tempfile::tempdir().unwrap();
        let data = array![
            [1.0, 2.0, 0.5],
            [1.2, 1.8, 0.4],
            [3.0, 0.5, 1.0],
            [3.1, 0.4, 1.2],
            [2.0, 1.0, 2.0],
            [2.2, 1.1, 2.1]
        ];
        let pca = fit(data.view(), 2).unwrap();
        let names = labels(&["1", "1", "2", "2", "3", "3"]);
        let written =
            write_pca_plots(dir.path(), "t", &[100.0, 200.0, 300.0], &pca, &names, false).unwrap();

        let expected = ["t_pca_loadings", "t_pca_scores", "t_pca_box", "t_pca_pc0_vs_label", "t_pca_pc1_vs_label"];
        assert_eq!(written.len(), expected.len());
        for stem in expected {
            let path = dir.path().join(format!("{stem}.png"));
            assert!(written.contains(&path));
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }
    }

    #[test]
    fn text_labels_skip_score_vs_label_plots() {
        let dir = tempfile::tempdir().unwrap();
        let data = array![[1.0, 2.0], [1.5, 1.0], [3.0, 0.5]];
        let pca = fit(data.view(), 1).unwrap();
        let names = labels(&["a", "b", "c"]);
        let written = write_pca_plots(dir.path(), "t", &[1.0, 2.0], &pca, &names, false).unwrap();
        assert_eq!(written.len(), 2);
        assert!(!dir.path().join("t_pca_pc0_vs_label.png").exists());
    }
}
