use std::cmp::Ordering;

use crate::error::SlpError;

/// Bidirectional mapping between class labels and ordinal indices.
///
/// Classes are sorted; labels that all parse as numbers (e.g. H:C ratios)
/// sort numerically, anything else lexicographically.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

fn label_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut classes: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort_by(|a, b| label_order(a, b));
        classes.dedup();
        LabelEncoder { classes }
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, label: &str) -> Result<usize, SlpError> {
        self.classes
            .binary_search_by(|c| label_order(c, label))
            .map_err(|_| SlpError::UnknownLabel(label.to_string()))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, SlpError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_labels_sort_by_value() {
        let enc = LabelEncoder::fit(&["10", "2", "0.5", "2"]);
        assert_eq!(enc.classes(), &["0.5", "2", "10"]);
        assert_eq!(enc.encode("10").unwrap(), 2);
        assert_eq!(enc.decode(0), Some("0.5"));
    }

    #[test]
    fn unknown_label_is_an_error() {
        let enc = LabelEncoder::fit(&["a", "b"]);
        assert!(matches!(enc.encode("c"), Err(SlpError::UnknownLabel(l)) if l == "c"));
    }

    #[test]
    fn mixed_labels_put_numbers_first() {
        let enc = LabelEncoder::fit(&["glass", "3", "amber"]);
        assert_eq!(enc.classes(), &["3", "amber", "glass"]);
        assert_eq!(enc.encode_all(&["amber", "3"]).unwrap(), vec![1, 0]);
    }
}
