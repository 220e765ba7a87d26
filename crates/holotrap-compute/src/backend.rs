//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over different execution environments
//! so that the phase-retrieval code in `holotrap-core` remains device-agnostic.
//! The hot path of every iteration is a pair of 2D FFTs; everything else is
//! element-wise arithmetic on `ndarray` arrays.

use ndarray::Array2;
use num_complex::Complex64;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Out of memory: requested {requested} bytes, available {available}")]
    OutOfMemory { requested: usize, available: usize },

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub memory_bytes: Option<usize>,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
}

/// Direction of a 2D discrete Fourier transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftDirection {
    /// Unnormalised forward transform.
    Forward,
    /// Inverse transform, scaled by $1/(H \cdot W)$.
    Inverse,
}

/// Abstraction over compute backends.
///
/// Implementations must be shareable across threads: independent retrieval
/// runs may execute concurrently against the same backend instance.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// In-place 2D FFT over both axes of `data`.
    ///
    /// The forward transform is unnormalised; the inverse is scaled by
    /// $1/(H \cdot W)$ so that `Inverse ∘ Forward` is the identity.
    fn fft2(&self, data: &mut Array2<Complex64>, direction: FftDirection)
        -> Result<(), ComputeError>;

    /// Upper bound on scratch memory a single run may hold, in bytes.
    ///
    /// `None` means unlimited.
    fn memory_budget(&self) -> Option<usize> {
        None
    }
}
