//! Spectroscopy classification: train several independent model families on
//! labeled spectra and apply them to single files, whole directories or 2D
//! maps.

pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod learn;
pub mod output;
pub mod pipeline;
pub mod plot;

pub use config::Config;
pub use error::SlpError;
