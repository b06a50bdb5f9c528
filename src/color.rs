use std::collections::BTreeMap;

use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<[u8; 3]> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            [
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            ]
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Label → colour mapping
// ---------------------------------------------------------------------------

pub const DEFAULT_COLOR: [u8; 3] = [128, 128, 128];

/// Maps class labels to distinct colours, assigned in order of first occurrence.
#[derive(Debug, Clone)]
pub struct LabelColors {
    order: Vec<String>,
    mapping: BTreeMap<String, [u8; 3]>,
}

impl LabelColors {
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut order: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref();
            if !order.iter().any(|l| l == label) {
                order.push(label.to_string());
            }
        }
        let mapping = order
            .iter()
            .cloned()
            .zip(generate_palette(order.len()))
            .collect();
        LabelColors { order, mapping }
    }

    /// Look up the colour for a given label.
    pub fn color_for(&self, label: &str) -> [u8; 3] {
        self.mapping.get(label).copied().unwrap_or(DEFAULT_COLOR)
    }

    /// Legend entries (label → colour) in first-occurrence order.
    pub fn legend_entries(&self) -> Vec<(String, [u8; 3])> {
        self.order
            .iter()
            .map(|l| (l.clone(), self.color_for(l)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_colours_are_distinct() {
        let p = generate_palette(4);
        assert_eq!(p.len(), 4);
        for i in 0..4 {
            for j in i + 1..4 {
                assert_ne!(p[i], p[j]);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn colours_follow_first_occurrence() {
        let colors = LabelColors::new(&["b", "a", "b", "c"]);
        let legend: Vec<String> = colors.legend_entries().into_iter().map(|(l, _)| l).collect();
        assert_eq!(legend, vec!["b", "a", "c"]);
        assert_eq!(colors.color_for("b"), generate_palette(3)[0]);
        assert_eq!(colors.color_for("zzz"), DEFAULT_COLOR);
    }
}
