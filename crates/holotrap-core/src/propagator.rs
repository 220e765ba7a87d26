//! Centred Fourier propagation between the hologram and image planes.
//!
//! An ideal lens maps the hologram (LCOS) plane onto its back focal plane by a
//! Fourier transform. With the optical axis at the array centre, the discrete
//! model is
//!
//! $$
//! \mathcal{P}_{\text{fwd}} = \text{shift} \circ \mathcal{F} \circ \text{shift}, \qquad
//! \mathcal{P}_{\text{bwd}} = \text{shift}^{-1} \circ \mathcal{F}^{-1} \circ \text{shift}^{-1}
//! $$
//!
//! so that `backward(forward(x)) == x` up to rounding, for any shape.

use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use holotrap_compute::{ComputeBackend, ComputeError, FftDirection};

use crate::types::ComplexField;

/// Move the zero-frequency sample to the centre of the array.
///
/// Element `(i, j)` lands at `((i + H/2) mod H, (j + W/2) mod W)`.
pub fn fft_shift<T: Clone + Default>(src: &Array2<T>) -> Array2<T> {
    let mut dst = Array2::default(src.dim());
    fft_shift_into(src.view(), &mut dst);
    dst
}

/// Exact inverse of [`fft_shift`] (differs from it for odd dimensions).
pub fn ifft_shift<T: Clone + Default>(src: &Array2<T>) -> Array2<T> {
    let mut dst = Array2::default(src.dim());
    ifft_shift_into(src.view(), &mut dst);
    dst
}

/// [`fft_shift`] writing into an existing buffer of the same shape.
pub fn fft_shift_into<T: Clone>(src: ArrayView2<T>, dst: &mut Array2<T>) {
    let (h, w) = src.dim();
    debug_assert_eq!(dst.dim(), (h, w));
    let (sh, sw) = (h / 2, w / 2);
    for ((i, j), v) in src.indexed_iter() {
        dst[[(i + sh) % h, (j + sw) % w]] = v.clone();
    }
}

/// [`ifft_shift`] writing into an existing buffer of the same shape.
pub fn ifft_shift_into<T: Clone>(src: ArrayView2<T>, dst: &mut Array2<T>) {
    let (h, w) = src.dim();
    debug_assert_eq!(dst.dim(), (h, w));
    let (sh, sw) = (h / 2, w / 2);
    for ((i, j), v) in dst.indexed_iter_mut() {
        *v = src[[(i + sh) % h, (j + sw) % w]].clone();
    }
}

/// Stateless propagator backed by a shared compute backend.
#[derive(Clone)]
pub struct Propagator {
    backend: Arc<dyn ComputeBackend>,
}

impl Propagator {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    /// Hologram plane → image plane.
    pub fn forward(&self, field: &ComplexField) -> Result<ComplexField, ComputeError> {
        let mut dst = Array2::zeros(field.dim());
        let mut scratch = Array2::zeros(field.dim());
        self.forward_into(field, &mut dst, &mut scratch)?;
        Ok(dst)
    }

    /// Image plane → hologram plane.
    pub fn backward(&self, field: &ComplexField) -> Result<ComplexField, ComputeError> {
        let mut dst = Array2::zeros(field.dim());
        let mut scratch = Array2::zeros(field.dim());
        self.backward_into(field, &mut dst, &mut scratch)?;
        Ok(dst)
    }

    /// [`forward`](Self::forward) into caller-owned buffers. `scratch` is
    /// overwritten.
    pub fn forward_into(
        &self,
        src: &ComplexField,
        dst: &mut ComplexField,
        scratch: &mut ComplexField,
    ) -> Result<(), ComputeError> {
        check_shapes(src, dst, scratch)?;
        fft_shift_into(src.view(), scratch);
        self.backend.fft2(scratch, FftDirection::Forward)?;
        fft_shift_into(scratch.view(), dst);
        Ok(())
    }

    /// [`backward`](Self::backward) into caller-owned buffers. `scratch` is
    /// overwritten.
    pub fn backward_into(
        &self,
        src: &ComplexField,
        dst: &mut ComplexField,
        scratch: &mut ComplexField,
    ) -> Result<(), ComputeError> {
        check_shapes(src, dst, scratch)?;
        ifft_shift_into(src.view(), scratch);
        self.backend.fft2(scratch, FftDirection::Inverse)?;
        ifft_shift_into(scratch.view(), dst);
        Ok(())
    }
}

fn check_shapes(
    src: &Array2<Complex64>,
    dst: &Array2<Complex64>,
    scratch: &Array2<Complex64>,
) -> Result<(), ComputeError> {
    for other in [dst.dim(), scratch.dim()] {
        if other != src.dim() {
            return Err(ComputeError::ShapeMismatch {
                expected: src.dim(),
                found: other,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use holotrap_compute::CpuBackend;
    use ndarray::array;

    fn propagator() -> Propagator {
        Propagator::new(Arc::new(CpuBackend::new()))
    }

    #[test]
    fn test_fft_shift_even_matches_half_roll() {
        let a = array![[0, 1, 2, 3], [4, 5, 6, 7]];
        assert_eq!(fft_shift(&a), array![[6, 7, 4, 5], [2, 3, 0, 1]]);
    }

    #[test]
    fn test_fft_shift_odd_is_inverted_by_ifft_shift() {
        let a = Array2::from_shape_fn((3, 5), |(i, j)| i * 5 + j);
        let shifted = fft_shift(&a);
        assert_eq!(shifted[[1, 2]], 0, "origin must move to the centre");
        assert_ne!(fft_shift(&shifted), a);
        assert_eq!(ifft_shift(&shifted), a);
    }

    #[test]
    fn test_forward_of_centred_impulse_is_flat() {
        // A delta on the optical axis spreads evenly over the image plane
        let mut field = Array2::zeros((4, 4));
        field[[2, 2]] = Complex64::new(1.0, 0.0);
        let image = propagator().forward(&field).unwrap();
        for v in image.iter() {
            assert_abs_diff_eq!(v.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(v.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_backward_inverts_forward_odd_shape() {
        let p = propagator();
        let x = Array2::from_shape_fn((5, 7), |(i, j)| {
            Complex64::new((i as f64 * 0.3).sin(), (j as f64 * 0.7).cos())
        });
        let y = p.backward(&p.forward(&x).unwrap()).unwrap();
        for (a, b) in x.iter().zip(y.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_into_variants_reject_mismatched_buffers() {
        let p = propagator();
        let src = Array2::zeros((4, 4));
        let mut dst = Array2::zeros((4, 3));
        let mut scratch = Array2::zeros((4, 4));
        let err = p.forward_into(&src, &mut dst, &mut scratch).unwrap_err();
        assert!(matches!(err, ComputeError::ShapeMismatch { .. }));
    }
}
