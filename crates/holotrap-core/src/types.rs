//! Core types shared across holotrap.
//!
//! This module defines the data that flows through a retrieval run: the
//! validated target pattern, field and phase aliases, the run parameters
//! (termination criterion, phase initialisation, algorithm choice), and the
//! metric containers the engine appends to.

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::engine::HoloError;

/// Complex optical field sampled on the hologram or image plane.
pub type ComplexField = Array2<Complex64>;

/// Phase angles in radians, range (−π, π] as produced by `Complex64::arg`.
pub type PhaseMap = Array2<f64>;

/// Which target pixels count as the signal region.
///
/// Both definitions are in use: metrics that assume a binary spot mask
/// select `target == 1`, while the constraint operators and the efficiency
/// metric select every lit pixel (`target > 0`). The distinction only matters
/// for graded targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMask {
    /// `target > 0`
    Positive,
    /// `target == 1`
    Binary,
}

impl SignalMask {
    #[inline]
    pub fn contains(self, value: f64) -> bool {
        match self {
            SignalMask::Positive => value > 0.0,
            SignalMask::Binary => value == 1.0,
        }
    }
}

/// Target intensity pattern, normalised to [0, 1].
///
/// Immutable once constructed. Every field derived during a run has the
/// same shape as the target.
#[derive(Debug, Clone)]
pub struct TargetField {
    amplitude: Array2<f64>,
}

impl TargetField {
    /// Validate and wrap a normalised target.
    ///
    /// Rejects empty shapes and values that are non-finite or outside
    /// [0, 1]. An all-zero target is accepted: it is degenerate but runs
    /// to completion, producing NaN-filled outputs.
    pub fn new(amplitude: Array2<f64>) -> Result<Self, HoloError> {
        let (rows, cols) = amplitude.dim();
        if rows == 0 || cols == 0 {
            return Err(HoloError::InvalidInput(format!(
                "target must be a non-empty 2D array, got shape {}x{}",
                rows, cols
            )));
        }

        if let Some(((i, j), v)) = amplitude
            .indexed_iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(HoloError::InvalidInput(format!(
                "target value {} at ({}, {}) is outside [0, 1]",
                v, i, j
            )));
        }

        let target = Self { amplitude };
        if target.signal_count(SignalMask::Positive) == 0 {
            log::warn!(
                "target {}x{} has an empty signal region; results will be degenerate",
                rows,
                cols
            );
        }
        Ok(target)
    }

    /// Build a target from an 8-bit grayscale image (pixel / 255).
    pub fn from_grayscale(pixels: &Array2<u8>) -> Result<Self, HoloError> {
        Self::new(pixels.mapv(|p| p as f64 / 255.0))
    }

    /// Target amplitude values.
    pub fn amplitude(&self) -> &Array2<f64> {
        &self.amplitude
    }

    /// Shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        self.amplitude.dim()
    }

    /// Total number of samples (H·W).
    pub fn len(&self) -> usize {
        self.amplitude.len()
    }

    /// Always false: construction rejects empty targets.
    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }

    /// Boolean mask of the signal region under `mask`.
    pub fn mask(&self, mask: SignalMask) -> Array2<bool> {
        self.amplitude.mapv(|v| mask.contains(v))
    }

    /// Number of signal pixels under `mask`.
    pub fn signal_count(&self, mask: SignalMask) -> usize {
        self.amplitude.iter().filter(|&&v| mask.contains(v)).count()
    }
}

/// Termination criterion evaluated after every iteration.
///
/// The comparator is `≤` for RMSE and `≥` for the other three metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConvergenceCriterion {
    Rmse { threshold: f64 },
    Ssim { threshold: f64 },
    Efficiency { threshold: f64 },
    Uniformity { threshold: f64 },
}

impl Default for ConvergenceCriterion {
    fn default() -> Self {
        ConvergenceCriterion::Rmse { threshold: 0.01 }
    }
}

impl ConvergenceCriterion {
    pub fn threshold(&self) -> f64 {
        match *self {
            ConvergenceCriterion::Rmse { threshold }
            | ConvergenceCriterion::Ssim { threshold }
            | ConvergenceCriterion::Efficiency { threshold }
            | ConvergenceCriterion::Uniformity { threshold } => threshold,
        }
    }

    /// Whether the metrics of the just-completed iteration satisfy the
    /// criterion. NaN metrics never satisfy it.
    pub fn is_satisfied(&self, metrics: &Metrics) -> bool {
        match *self {
            ConvergenceCriterion::Rmse { threshold } => metrics.rmse <= threshold,
            ConvergenceCriterion::Ssim { threshold } => metrics.ssim >= threshold,
            ConvergenceCriterion::Efficiency { threshold } => metrics.efficiency >= threshold,
            ConvergenceCriterion::Uniformity { threshold } => metrics.uniformity >= threshold,
        }
    }
}

/// How the phase of the first iteration is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseInit {
    /// Uniform random phase in [0, 1) rad. A seed makes the run reproducible.
    Random { seed: Option<u64> },
    /// Phase of the centred inverse FFT of the target.
    InverseFft,
    /// Caller-supplied phase array; must match the target shape.
    Custom(PhaseMap),
}

impl Default for PhaseInit {
    fn default() -> Self {
        PhaseInit::Random { seed: None }
    }
}

/// Phase-retrieval algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Gerchberg–Saxton.
    Gs,
    /// Weighted Gerchberg–Saxton.
    Gsw,
    /// Weighted constraint iterative algorithm with adaptive β schedule.
    #[default]
    Wcia,
}

/// Parameters of a retrieval run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    /// Upper bound on the number of iterations.
    pub max_iterations: usize,
    /// Early-termination criterion.
    pub criterion: ConvergenceCriterion,
    /// Algorithm variant.
    pub algorithm: Algorithm,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            criterion: ConvergenceCriterion::default(),
            algorithm: Algorithm::default(),
        }
    }
}

/// The four convergence metrics of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub uniformity: f64,
    pub efficiency: f64,
    pub rmse: f64,
    pub ssim: f64,
}

/// Append-only metric history, one entry per completed iteration.
///
/// Supplied by the caller so that partial history survives early
/// termination and can be plotted while the caller still owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSeries {
    pub uniformity: Vec<f64>,
    pub efficiency: Vec<f64>,
    pub rmse: Vec<f64>,
    pub ssim: Vec<f64>,
}

impl MetricsSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: &Metrics) {
        self.uniformity.push(metrics.uniformity);
        self.efficiency.push(metrics.efficiency);
        self.rmse.push(metrics.rmse);
        self.ssim.push(metrics.ssim);
    }

    /// Number of recorded iterations.
    pub fn len(&self) -> usize {
        self.rmse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rmse.is_empty()
    }

    /// Metrics of the most recent iteration.
    pub fn last(&self) -> Option<Metrics> {
        Some(Metrics {
            uniformity: *self.uniformity.last()?,
            efficiency: *self.efficiency.last()?,
            rmse: *self.rmse.last()?,
            ssim: *self.ssim.last()?,
        })
    }

    pub fn clear(&mut self) {
        self.uniformity.clear();
        self.efficiency.clear();
        self.rmse.clear();
        self.ssim.clear();
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The criterion was satisfied after the given (1-based) iteration.
    Converged { iteration: usize },
    /// `max_iterations` ran without satisfying the criterion.
    MaxIterations,
}

/// Result of a retrieval run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final hologram-plane field.
    pub field: ComplexField,
    /// Phase of `field`.
    pub phase: PhaseMap,
    /// Number of completed iterations.
    pub iterations: usize,
    pub termination: Termination,
}

impl RunOutcome {
    pub fn converged(&self) -> bool {
        matches!(self.termination, Termination::Converged { .. })
    }
}
