//! Reconstruction simulator.
//!
//! A single-step far-field approximation used to sanity-check a hologram:
//! the field is carried to the image plane with one centred forward
//! transform and scaled by the scalar transfer factor
//!
//! $$ H = \exp\!\left(i \, \frac{2\pi}{\lambda} \, \frac{d}{\lambda}\right). $$
//!
//! $H$ has unit modulus, so it never changes the reconstructed intensity.
//! Distance and wavelength must share a unit (millimetres in the job files).

use ndarray::Array2;
use num_complex::Complex64;

use holotrap_compute::ComputeError;

use crate::metrics::normalize;
use crate::propagator::Propagator;
use crate::types::ComplexField;

/// Scalar transfer multiplier for `distance` and `wavelength`.
pub fn transfer_factor(distance: f64, wavelength: f64) -> Complex64 {
    let k = std::f64::consts::TAU / wavelength;
    Complex64::new(0.0, k * distance / wavelength).exp()
}

/// Simulate the image-plane field produced by `field`.
pub fn reconstruct(
    propagator: &Propagator,
    field: &ComplexField,
    distance: f64,
    wavelength: f64,
) -> Result<ComplexField, ComputeError> {
    let h = transfer_factor(distance, wavelength);
    let mut out = propagator.forward(field)?;
    out.mapv_inplace(|c| h * c);
    Ok(out)
}

/// 8-bit preview of the reconstructed amplitude.
pub fn preview(
    propagator: &Propagator,
    field: &ComplexField,
    distance: f64,
    wavelength: f64,
) -> Result<Array2<u8>, ComputeError> {
    let reconstructed = reconstruct(propagator, field, distance, wavelength)?;
    let amplitude = normalize(&reconstructed.mapv(|c| c.norm()));
    Ok(amplitude.mapv(|v| (v * 255.0) as u8))
}
