//! TOML configuration deserialisation for hologram jobs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use holotrap_core::{Algorithm, ConvergenceCriterion, RunParams};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub target: TargetConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Target pattern to reproduce.
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    /// Grayscale image; colour images are converted to luma.
    pub image: PathBuf,
}

/// Phase-retrieval parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// `{ mode = "rmse" | "ssim" | "efficiency" | "uniformity", threshold = .. }`
    #[serde(default)]
    pub criterion: ConvergenceCriterion,
    #[serde(default)]
    pub init: InitConfig,
    /// Compute backend: "auto" or "cpu". Default: "auto".
    #[serde(default = "default_backend")]
    pub backend: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_iterations: default_max_iterations(),
            criterion: ConvergenceCriterion::default(),
            init: InitConfig::default(),
            backend: default_backend(),
        }
    }
}

impl RetrievalConfig {
    pub fn run_params(&self) -> RunParams {
        RunParams {
            max_iterations: self.max_iterations,
            criterion: self.criterion,
            algorithm: self.algorithm,
        }
    }
}

fn default_max_iterations() -> usize {
    RunParams::default().max_iterations
}

fn default_backend() -> String {
    "auto".into()
}

/// Initial phase selection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InitConfig {
    Random {
        #[serde(default)]
        seed: Option<u64>,
    },
    InverseFft,
    /// Phase map stored as a float64 `.npy` file.
    File { path: PathBuf },
}

impl Default for InitConfig {
    fn default() -> Self {
        InitConfig::Random { seed: None }
    }
}

/// Reconstruction preview parameters (millimetres).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconstructionConfig {
    #[serde(default = "default_distance")]
    pub distance: f64,
    #[serde(default = "default_wavelength")]
    pub wavelength: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            distance: default_distance(),
            wavelength: default_wavelength(),
        }
    }
}

fn default_distance() -> f64 {
    50.0
}
fn default_wavelength() -> f64 {
    532e-6
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the metric history as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_metrics_csv: bool,
    /// Whether to also save the metric history as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to write a reconstruction preview image (default: true).
    #[serde(default = "default_true")]
    pub save_reconstruction: bool,
    /// Whether to write the 90° rotated bitmap for the SLM display (default: false).
    #[serde(default)]
    pub rotate_for_display: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_metrics_csv: true,
            save_json: false,
            save_reconstruction: true,
            rotate_for_display: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
///
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut config: JobConfig =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.target.image = base.join(&config.target.image);
    if let InitConfig::File { path } = &mut config.retrieval.init {
        *path = base.join(&*path);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &JobConfig) -> anyhow::Result<()> {
    if !config.retrieval.criterion.threshold().is_finite() {
        anyhow::bail!("retrieval.criterion.threshold must be finite");
    }
    if !matches!(config.retrieval.backend.as_str(), "auto" | "cpu") {
        anyhow::bail!(
            "unknown backend '{}' (expected \"auto\" or \"cpu\")",
            config.retrieval.backend
        );
    }
    let r = &config.reconstruction;
    if !(r.wavelength > 0.0 && r.wavelength.is_finite()) {
        anyhow::bail!("reconstruction.wavelength must be positive, got {}", r.wavelength);
    }
    if !r.distance.is_finite() {
        anyhow::bail!("reconstruction.distance must be finite");
    }
    Ok(())
}
