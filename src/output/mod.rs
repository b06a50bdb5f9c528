//! Result sinks: the batch summary CSV and per-family map records.

pub mod map_sink;
pub mod summary;

pub use map_sink::MapSink;
pub use summary::{ResultRow, SummaryWriter};
