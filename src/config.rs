//! Run configuration loaded from a TOML file.
//!
//! Every section and every key is optional; missing values fall back to the
//! defaults below. The structure is immutable once loaded and is passed by
//! reference into every pipeline mode.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SlpError;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "spectra-learn.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system: SystemConfig,
    pub data: DataConfig,
    pub preprocess: PreprocessConfig,
    pub pca: PcaConfig,
    pub plot: PlotConfig,
    pub dnn: DnnConfig,
    pub nn: NnConfig,
    pub svm: SvmConfig,
    pub tf: TfConfig,
    pub keras: KerasConfig,
    pub kmeans: KMeansConfig,
}

// ---------------------------------------------------------------------------
// Global sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Process batch files on a thread pool.
    pub multi_proc: bool,
    /// Pool size when `multi_proc` is on.
    pub num_cores: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            multi_proc: false,
            num_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Metadata column holding the class label in tabular datasets.
    pub label_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            label_column: "label".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Scale every spectrum so its intensity at the normalisation point equals `ynorm_to`.
    pub ynorm: bool,
    pub ynorm_to: f64,
    /// Energy of the normalisation point.
    pub ynorm_x: f64,
    pub ynorm_x_delta: f64,
    /// Normalise to the spectrum maximum instead of the normalisation point.
    pub full_ynorm: bool,
    /// Standardise each energy column with mean/std fitted on the training set.
    pub standard_scale: bool,
    /// Optional energy window; columns outside are dropped.
    pub energy_min: Option<f64>,
    pub energy_max: Option<f64>,
    /// Carve the evaluation set out of the training file.
    pub subset_cross_valid: bool,
    pub percent_cross_valid: f64,
    pub seed: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            ynorm: true,
            ynorm_to: 10.0,
            ynorm_x: 1600.0,
            ynorm_x_delta: 30.0,
            full_ynorm: false,
            standard_scale: true,
            energy_min: None,
            energy_max: None,
            subset_cross_valid: false,
            percent_cross_valid: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub enabled: bool,
    /// Overrides the "one component per distinct label" rule.
    pub custom_components: Option<usize>,
    pub show_plots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub training_data: bool,
    /// Draw every training spectrum rather than one per label.
    pub all_spectra: bool,
    /// Directory receiving PNG plots.
    pub output_dir: String,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            training_data: false,
            all_spectra: false,
            output_dir: ".".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Model family sections
// ---------------------------------------------------------------------------

/// Run policy shared by every model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSettings {
    pub enabled: bool,
    /// Batch mode: retrain for every processed file instead of once.
    pub always_retrain: bool,
    /// Map mode: render the prediction map.
    pub plot_map: bool,
    /// Map mode: retrain for every pixel instead of once.
    pub retrain_per_pixel: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optimizer {
    Sgd,
    Adam,
}

/// Deep network (primary classifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnnConfig {
    pub enabled: bool,
    pub always_retrain: bool,
    pub plot_map: bool,
    pub retrain_per_pixel: bool,
    /// Use the alternative architecture (tanh units, momentum SGD).
    pub alt: bool,
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub l2: f64,
    pub seed: u64,
}

impl Default for DnnConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            always_retrain: false,
            plot_map: true,
            retrain_per_pixel: false,
            alt: false,
            hidden_layers: vec![200],
            activation: Activation::Relu,
            learning_rate: 0.01,
            epochs: 300,
            batch_size: 32,
            l2: 1e-4,
            seed: 42,
        }
    }
}

/// General purpose multilayer perceptron.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NnConfig {
    pub enabled: bool,
    pub always_retrain: bool,
    pub plot_map: bool,
    pub retrain_per_pixel: bool,
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    pub seed: u64,
}

impl Default for NnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            always_retrain: false,
            plot_map: true,
            retrain_per_pixel: false,
            hidden_layers: vec![100],
            activation: Activation::Tanh,
            learning_rate: 0.01,
            epochs: 200,
            l2: 1e-4,
            seed: 42,
        }
    }
}

/// Linear support vector machine, one-vs-rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    pub enabled: bool,
    pub always_retrain: bool,
    pub plot_map: bool,
    pub retrain_per_pixel: bool,
    /// Inverse regularisation strength.
    pub c: f64,
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            always_retrain: false,
            plot_map: true,
            retrain_per_pixel: false,
            c: 1.0,
            epochs: 200,
            seed: 42,
        }
    }
}

/// Single-layer softmax network; also reports its evaluation accuracy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TfConfig {
    pub enabled: bool,
    pub always_retrain: bool,
    pub plot_map: bool,
    pub retrain_per_pixel: bool,
    pub learning_rate: f64,
    pub epochs: usize,
    pub seed: u64,
}

impl Default for TfConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            always_retrain: true,
            plot_map: true,
            retrain_per_pixel: true,
            learning_rate: 0.1,
            epochs: 500,
            seed: 42,
        }
    }
}

/// Layered network with mini-batch Adam and L2 penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KerasConfig {
    pub enabled: bool,
    pub always_retrain: bool,
    pub plot_map: bool,
    pub retrain_per_pixel: bool,
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub l2: f64,
    pub seed: u64,
}

impl Default for KerasConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            always_retrain: false,
            plot_map: true,
            retrain_per_pixel: false,
            hidden_layers: vec![200, 100],
            learning_rate: 0.001,
            epochs: 300,
            batch_size: 16,
            l2: 1e-3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub enabled: bool,
    pub always_retrain: bool,
    pub plot_map: bool,
    pub retrain_per_pixel: bool,
    /// Cluster count; defaults to the number of distinct labels.
    pub clusters: Option<usize>,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            always_retrain: false,
            plot_map: true,
            retrain_per_pixel: false,
            clusters: None,
            max_iter: 300,
            seed: 42,
        }
    }
}

macro_rules! run_settings {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $ty {
                pub fn run(&self) -> RunSettings {
                    RunSettings {
                        enabled: self.enabled,
                        always_retrain: self.always_retrain,
                        plot_map: self.plot_map,
                        retrain_per_pixel: self.retrain_per_pixel,
                    }
                }
            }
        )+
    };
}

run_settings!(DnnConfig, NnConfig, SvmConfig, TfConfig, KerasConfig, KMeansConfig);

// ---------------------------------------------------------------------------
// Loading / validation
// ---------------------------------------------------------------------------

impl Config {
    /// Load from `path`, or return the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SlpError> {
        let invalid = |msg: String| Err(SlpError::InvalidConfig(msg));

        if self.system.num_cores == 0 {
            return invalid("system.num_cores must be at least 1".into());
        }
        let pct = self.preprocess.percent_cross_valid;
        if !(pct > 0.0 && pct < 1.0) {
            return invalid(format!(
                "preprocess.percent_cross_valid must be in (0, 1), got {pct}"
            ));
        }
        if let (Some(lo), Some(hi)) = (self.preprocess.energy_min, self.preprocess.energy_max) {
            if lo >= hi {
                return invalid(format!(
                    "preprocess.energy_min ({lo}) must be below energy_max ({hi})"
                ));
            }
        }
        if self.pca.custom_components == Some(0) {
            return invalid("pca.custom_components must be positive".into());
        }
        if self.kmeans.clusters == Some(0) {
            return invalid("kmeans.clusters must be positive".into());
        }
        let layers = [
            ("dnn", &self.dnn.hidden_layers),
            ("nn", &self.nn.hidden_layers),
            ("keras", &self.keras.hidden_layers),
        ];
        for (name, hidden) in layers {
            if hidden.iter().any(|&w| w == 0) {
                return invalid(format!("{name}.hidden_layers contains a zero-width layer"));
            }
        }
        if self.dnn.batch_size == 0 || self.keras.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        Ok(())
    }
}
