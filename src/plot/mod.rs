//! PNG rendering of training data, PCA diagnostics and prediction maps.

pub mod map;
pub mod pca;
pub mod spectra;

use std::path::{Path, PathBuf};

use plotters::style::RGBColor;

pub use map::plot_map;
pub use pca::plot_pca;
pub use spectra::plot_training_data;

const SIZE: (u32, u32) = (1000, 650);

pub(crate) fn rgb(c: [u8; 3]) -> RGBColor {
    RGBColor(c[0], c[1], c[2])
}

/// `<dir>/<root><suffix>.png`
pub fn plot_path(dir: &Path, root: &str, suffix: &str) -> PathBuf {
    dir.join(format!("{root}{suffix}.png"))
}

/// Min/max of `values` widened so a flat series still spans a visible range.
pub(crate) fn padded_range<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    (lo - pad, hi + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_range_handles_flat_and_empty() {
        let (lo, hi) = padded_range([2.0, 2.0]);
        assert!(lo < 2.0 && hi > 2.0);
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
        let (lo, hi) = padded_range([0.0, 10.0, f64::NAN]);
        assert!((lo + 0.5).abs() < 1e-12 && (hi - 10.5).abs() < 1e-12);
    }

    #[test]
    fn plot_names_join_root_and_suffix() {
        assert_eq!(
            plot_path(Path::new("out"), "train", "_raw"),
            Path::new("out/train_raw.png")
        );
    }
}
