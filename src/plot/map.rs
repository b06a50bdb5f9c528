use std::path::Path;

use anyhow::{Result, ensure};
use image::{Rgb, RgbImage};

use crate::color::LabelColors;

/// Pixels per map cell.
const CELL: u32 = 8;

/// Sorted distinct coordinates.
fn axis_values(values: &[f64]) -> Vec<f64> {
    let mut axis: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    axis.sort_by(f64::total_cmp);
    axis.dedup();
    axis
}

fn cell_index(axis: &[f64], v: f64) -> Option<usize> {
    axis.binary_search_by(|a| a.total_cmp(&v)).ok()
}

/// Label raster: one `CELL`×`CELL` block per map position, y increasing
/// upwards, colours assigned by label in first-occurrence order.
pub fn render_map(x: &[f64], y: &[f64], labels: &[String]) -> Result<(RgbImage, LabelColors)> {
    ensure!(
        x.len() == y.len() && y.len() == labels.len(),
        "map plot needs one label per position ({} x, {} y, {} labels)",
        x.len(),
        y.len(),
        labels.len()
    );
    let xs = axis_values(x);
    let ys = axis_values(y);
    ensure!(!xs.is_empty() && !ys.is_empty(), "map plot has no finite positions");

    let colors = LabelColors::new(labels);
    let width = xs.len() as u32 * CELL;
    let height = ys.len() as u32 * CELL;
    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for ((&px, &py), label) in x.iter().zip(y).zip(labels) {
        let (Some(col), Some(row)) = (cell_index(&xs, px), cell_index(&ys, py)) else {
            continue;
        };
        let color = Rgb(colors.color_for(label));
        let top = (ys.len() - 1 - row) as u32 * CELL;
        let left = col as u32 * CELL;
        for dy in 0..CELL {
            for dx in 0..CELL {
                img.put_pixel(left + dx, top + dy, color);
            }
        }
    }
    Ok((img, colors))
}

/// Write the label raster for one family's map predictions.
pub fn plot_map(path: &Path, x: &[f64], y: &[f64], labels: &[String], title: &str) -> Result<()> {
    let (img, colors) = render_map(x, y, labels)?;
    img.save(path)?;
    let legend: Vec<String> = colors
        .legend_entries()
        .into_iter()
        .map(|(label, [r, g, b])| format!("{label}=#{r:02x}{g:02x}{b:02x}"))
        .collect();
    log::info!("{title}: map written to {} ({})", path.display(), legend.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_places_cells_with_y_up() {
        let x = [0.0, 1.0, 0.0, 1.0];
        let y = [0.0, 0.0, 1.0, 1.0];
        let labels: Vec<String> = ["A", "B", "B", "A"].iter().map(|s| s.to_string()).collect();
        let (img, colors) = render_map(&x, &y, &labels).unwrap();
        assert_eq!(img.dimensions(), (2 * CELL, 2 * CELL));
        // (0, 0) sits in the bottom-left cell
        assert_eq!(img.get_pixel(0, 2 * CELL - 1).0, colors.color_for("A"));
        assert_eq!(img.get_pixel(0, 0).0, colors.color_for("B"));
        assert_eq!(img.get_pixel(2 * CELL - 1, 0).0, colors.color_for("A"));
    }

    #[test]
    fn plot_map_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m_SVM_map.png");
        let labels = vec!["A".to_string(), "B".to_string()];
        plot_map(&path, &[0.0, 5.0], &[1.0, 1.0], &labels, "SVM").unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), 2 * CELL);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let labels = vec!["A".to_string()];
        assert!(render_map(&[0.0, 1.0], &[0.0, 1.0], &labels).is_err());
    }
}
