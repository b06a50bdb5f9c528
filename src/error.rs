use thiserror::Error;

/// Typed failures raised by the data, learning and pipeline layers.
///
/// Call sites that only need to bubble errors up wrap these in `anyhow` with
/// context; tests match on the variants directly.
#[derive(Debug, Error)]
pub enum SlpError {
    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("line {line}, column {column}: '{token}' is not a number")]
    BadNumber {
        line: usize,
        column: usize,
        token: String,
    },

    #[error("non-finite value in {0}")]
    NonFinite(String),

    #[error("label '{0}' was not seen during training")]
    UnknownLabel(String),

    #[error("cannot compute {requested} principal components from a {rows}x{cols} matrix")]
    TooManyComponents {
        requested: usize,
        rows: usize,
        cols: usize,
    },

    #[error("no prediction files found in {0}")]
    EmptyBatch(String),

    #[error("no test data: pass a test file or enable subset_cross_valid")]
    MissingTestData,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
