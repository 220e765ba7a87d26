//! Per-run scratch buffer pool.
//!
//! A retrieval run needs a handful of complex and real buffers of the
//! target's shape for every iteration. The [`ScratchArena`] hands them out,
//! takes them back for reuse, and frees the pooled ones in one go when the
//! run ends. Release is tied to `Drop`, so pooled buffers are freed on every
//! exit path of the run, including early returns through `?`.
//!
//! Every buffer counts against the backend's memory budget from the moment
//! it is taken until it is released or [detached](ScratchArena::detach) as
//! a run output. Each run owns its own arena; arenas are never shared
//! between runs.

use ndarray::Array2;
use num_complex::Complex64;

use crate::backend::{ComputeBackend, ComputeError};

/// Pool of equally-shaped complex and real buffers owned by a single run.
pub struct ScratchArena {
    shape: (usize, usize),
    budget: Option<usize>,
    complex: Vec<Array2<Complex64>>,
    real: Vec<Array2<f64>>,
    /// Bytes of every buffer taken from this arena and neither released nor
    /// detached, whether currently lent out or sitting in a pool.
    allocated_bytes: usize,
    peak_bytes: usize,
}

impl ScratchArena {
    /// Create an arena for buffers of `shape`, honouring the backend's
    /// memory budget.
    pub fn new(shape: (usize, usize), backend: &dyn ComputeBackend) -> Self {
        Self::with_budget(shape, backend.memory_budget())
    }

    /// Create an arena with an explicit budget (`None` = unlimited).
    pub fn with_budget(shape: (usize, usize), budget: Option<usize>) -> Self {
        Self {
            shape,
            budget,
            complex: Vec::new(),
            real: Vec::new(),
            allocated_bytes: 0,
            peak_bytes: 0,
        }
    }

    /// Shape of the buffers handed out by this arena.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    fn bytes_of<T>(&self) -> usize {
        self.shape.0 * self.shape.1 * std::mem::size_of::<T>()
    }

    fn reserve(&mut self, requested: usize) -> Result<(), ComputeError> {
        if let Some(budget) = self.budget {
            let available = budget.saturating_sub(self.allocated_bytes);
            if requested > available {
                return Err(ComputeError::OutOfMemory { requested, available });
            }
        }
        self.allocated_bytes += requested;
        self.peak_bytes = self.peak_bytes.max(self.allocated_bytes);
        Ok(())
    }

    fn check_shape(&self, found: (usize, usize)) -> Result<(), ComputeError> {
        if found != self.shape {
            return Err(ComputeError::ShapeMismatch {
                expected: self.shape,
                found,
            });
        }
        Ok(())
    }

    /// Take a zero-initialised complex buffer, reusing a returned one when
    /// possible.
    pub fn take(&mut self) -> Result<Array2<Complex64>, ComputeError> {
        if let Some(mut buf) = self.complex.pop() {
            buf.fill(Complex64::new(0.0, 0.0));
            return Ok(buf);
        }
        self.reserve(self.bytes_of::<Complex64>())?;
        Ok(Array2::zeros(self.shape))
    }

    /// Take a zero-initialised real buffer, reusing a returned one when
    /// possible.
    pub fn take_real(&mut self) -> Result<Array2<f64>, ComputeError> {
        if let Some(mut buf) = self.real.pop() {
            buf.fill(0.0);
            return Ok(buf);
        }
        self.reserve(self.bytes_of::<f64>())?;
        Ok(Array2::zeros(self.shape))
    }

    /// Return a complex buffer to the pool for reuse.
    pub fn give(&mut self, buf: Array2<Complex64>) -> Result<(), ComputeError> {
        self.check_shape(buf.dim())?;
        self.complex.push(buf);
        Ok(())
    }

    /// Return a real buffer to the pool for reuse.
    pub fn give_real(&mut self, buf: Array2<f64>) -> Result<(), ComputeError> {
        self.check_shape(buf.dim())?;
        self.real.push(buf);
        Ok(())
    }

    /// Hand a taken buffer out of the run for good (e.g. as a result).
    ///
    /// Its bytes stop counting against the budget; the caller now owns it.
    pub fn detach<T>(&mut self, buf: Array2<T>) -> Array2<T> {
        let bytes = buf.len() * std::mem::size_of::<T>();
        self.allocated_bytes = self.allocated_bytes.saturating_sub(bytes);
        buf
    }

    /// Bytes currently accounted to this arena.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Highest value `allocated_bytes` reached over the arena's lifetime.
    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }

    /// Number of buffers waiting in the pools.
    pub fn pooled(&self) -> usize {
        self.complex.len() + self.real.len()
    }

    /// Free every pooled buffer.
    ///
    /// Returns the number of bytes actually freed. Buffers still lent out
    /// are not touched and stay in the accounting.
    pub fn release(&mut self) -> usize {
        let freed = self.complex.len() * self.bytes_of::<Complex64>()
            + self.real.len() * self.bytes_of::<f64>();
        self.complex = Vec::new();
        self.real = Vec::new();
        self.allocated_bytes = self.allocated_bytes.saturating_sub(freed);
        freed
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        let freed = self.release();
        if freed > 0 || self.allocated_bytes > 0 {
            log::debug!(
                "scratch arena {:?}: freed {} bytes, {} bytes still lent out (peak {})",
                self.shape,
                freed,
                self.allocated_bytes,
                self.peak_bytes
            );
        }
    }
}
