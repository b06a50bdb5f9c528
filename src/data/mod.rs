/// Data layer: core types, loading, and preprocessing.
///
/// Architecture:
/// ```text
///  .txt matrix / .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → LabeledDataset / PredictionInput / SpectralMap
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ preprocess  │  fit on training data → same transform for every input
///   └────────────┘
/// ```

pub mod loader;
pub mod model;
pub mod preprocess;
