//! CPU compute backend using rustfft for transforms and Rayon for
//! row-level parallelism.

use std::sync::{Arc, Mutex};

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, FftDirection};

/// CPU backend that parallelises FFT rows across threads via Rayon.
///
/// FFT plans are cached by the shared planner, so repeated transforms of the
/// same shape (every iteration of a run) reuse the same twiddle tables.
pub struct CpuBackend {
    num_threads: usize,
    memory_budget: Option<usize>,
    planner: Mutex<FftPlanner<f64>>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self::with_threads(rayon::current_num_threads())
    }

    /// Create a CPU backend with a specified thread count (reported only;
    /// the global Rayon pool performs the work).
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            memory_budget: None,
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Limit the scratch memory a single run may allocate.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    fn plan(&self, len: usize, direction: FftDirection) -> Result<Arc<dyn Fft<f64>>, ComputeError> {
        let mut planner = self
            .planner
            .lock()
            .map_err(|_| ComputeError::DeviceError("FFT planner lock poisoned".into()))?;
        Ok(match direction {
            FftDirection::Forward => planner.plan_fft_forward(len),
            FftDirection::Inverse => planner.plan_fft_inverse(len),
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Transform every contiguous row of a standard-layout array.
fn process_rows(data: &mut Array2<Complex64>, fft: &Arc<dyn Fft<f64>>) -> Result<(), ComputeError> {
    let ncols = data.ncols();
    let slice = data
        .as_slice_mut()
        .ok_or_else(|| ComputeError::DeviceError("array is not in standard layout".into()))?;
    slice.par_chunks_mut(ncols).for_each(|row| fft.process(row));
    Ok(())
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            memory_bytes: self.memory_budget,
            compute_units: Some(self.num_threads),
        }
    }

    fn fft2(
        &self,
        data: &mut Array2<Complex64>,
        direction: FftDirection,
    ) -> Result<(), ComputeError> {
        let (nrows, ncols) = data.dim();
        if nrows == 0 || ncols == 0 {
            return Ok(());
        }

        if !data.is_standard_layout() {
            *data = data.as_standard_layout().into_owned();
        }

        // Rows (axis 1)
        let row_fft = self.plan(ncols, direction)?;
        process_rows(data, &row_fft)?;

        // Columns (axis 0): transpose, transform rows, transpose back
        let col_fft = self.plan(nrows, direction)?;
        let mut transposed = data.t().as_standard_layout().into_owned();
        process_rows(&mut transposed, &col_fft)?;
        data.assign(&transposed.t());

        if direction == FftDirection::Inverse {
            let norm = 1.0 / (nrows * ncols) as f64;
            data.mapv_inplace(|c| c * norm);
        }

        Ok(())
    }

    fn memory_budget(&self) -> Option<usize> {
        self.memory_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::ShapeBuilder;

    #[test]
    fn test_fft2_roundtrip() {
        let backend = CpuBackend::new();
        let original = Array2::from_shape_fn((6, 10), |(i, j)| {
            Complex64::new((i * 10 + j) as f64, (i as f64 - j as f64) * 0.5)
        });
        let mut data = original.clone();
        backend.fft2(&mut data, FftDirection::Forward).unwrap();
        backend.fft2(&mut data, FftDirection::Inverse).unwrap();

        for (a, b) in original.iter().zip(data.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-9);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fft2_dc_component() {
        // A constant field concentrates all energy in bin (0, 0) = H*W*value
        let backend = CpuBackend::new();
        let mut data = Array2::from_elem((8, 4), Complex64::new(3.0, 0.0));
        backend.fft2(&mut data, FftDirection::Forward).unwrap();

        assert_abs_diff_eq!(data[[0, 0]].re, 96.0, epsilon = 1e-10);
        for ((i, j), v) in data.indexed_iter() {
            if (i, j) != (0, 0) {
                assert!(v.norm() < 1e-10, "bin ({}, {}) should be empty", i, j);
            }
        }
    }

    #[test]
    fn test_fft2_non_standard_layout() {
        let backend = CpuBackend::new();
        let base = Array2::from_shape_fn((4, 5), |(i, j)| Complex64::new(i as f64, j as f64));
        let mut fortran = Array2::from_shape_fn((4, 5).f(), |(i, j)| base[[i, j]]);
        assert!(!fortran.is_standard_layout());
        let mut standard = base.clone();

        backend.fft2(&mut fortran, FftDirection::Forward).unwrap();
        backend.fft2(&mut standard, FftDirection::Forward).unwrap();

        for (a, b) in fortran.iter().zip(standard.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-10);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_device_info_reports_budget() {
        let backend = CpuBackend::with_threads(2).with_memory_budget(1024);
        let info = backend.device_info();
        assert_eq!(info.backend_type, BackendType::Cpu);
        assert_eq!(info.memory_bytes, Some(1024));
        assert_eq!(backend.memory_budget(), Some(1024));
    }
}
