//! Gerchberg–Saxton constraints.
//!
//! The baseline: a hard phase-only constraint with unit amplitude on the
//! hologram plane, and the target amplitude imposed on the signal region of
//! the image plane. The dark field is left at zero.

use ndarray::{Array2, Zip};
use num_complex::Complex64;

use super::ConstraintOperator;
use crate::types::{ComplexField, SignalMask, TargetField};

/// Replace the amplitude of every sample with 1, keeping its phase.
pub(crate) fn unit_amplitude(field: &mut ComplexField) {
    field.mapv_inplace(|c| Complex64::from_polar(1.0, c.arg()));
}

/// Stateless GS operator.
#[derive(Debug, Clone, Default)]
pub struct GsConstraint;

impl GsConstraint {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintOperator for GsConstraint {
    fn constrain_hologram(&mut self, field: &mut ComplexField) {
        unit_amplitude(field);
    }

    fn constrain_image(
        &mut self,
        image: &mut ComplexField,
        reconstructed: &ComplexField,
        _normalized_amplitude: &Array2<f64>,
        target: &TargetField,
    ) {
        Zip::from(image)
            .and(reconstructed)
            .and(target.amplitude())
            .for_each(|a, r, &t| {
                *a = if SignalMask::Positive.contains(t) {
                    Complex64::from_polar(t, r.arg())
                } else {
                    Complex64::new(0.0, 0.0)
                };
            });
    }

    fn method_name(&self) -> &str {
        "Gerchberg-Saxton (GS)"
    }
}
