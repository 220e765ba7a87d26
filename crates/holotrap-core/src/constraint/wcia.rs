//! Weighted constraint iterative algorithm (WCIA).
//!
//! Reference: *Appl. Sci.* **10**, 3652 (2020).
//!
//! The hologram plane is constrained to the energy-normalised constant
//! amplitude $A_{\text{holo}} = \sqrt{1/(HW)}$. On the image plane the
//! amplitude is pulled toward the target with an adaptive exponent:
//!
//! $$
//! A_{\text{con}} =
//! \begin{cases}
//!   |A_k| \left( |A_{\text{target}}| / |A'_k| \right)^{\beta_k} & \text{signal} \\
//!   |A_k| & \text{otherwise}
//! \end{cases}
//! \qquad A_{k+1} = A_{\text{con}} \, \frac{A'_k}{|A'_k|}
//! $$
//!
//! and $\beta_{k+1} = \sqrt{\beta_k}$ after each use, starting from
//! $\beta_0 = 10^{-8}$. Early iterations are therefore almost unconstrained
//! and the constraint hardens toward $\beta \to 1$.

use ndarray::{Array2, Zip};

use super::ConstraintOperator;
use crate::types::{ComplexField, SignalMask, TargetField};

/// Starting value of the adaptive constraint parameter.
pub const INITIAL_BETA: f64 = 1e-8;

/// WCIA operator carrying the β schedule.
#[derive(Debug, Clone)]
pub struct WciaConstraint {
    beta: f64,
    hologram_amplitude: f64,
}

impl WciaConstraint {
    /// Operator for a target of the given shape (unit total hologram energy).
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            beta: INITIAL_BETA,
            hologram_amplitude: (1.0 / (shape.0 * shape.1) as f64).sqrt(),
        }
    }

    /// β to be used by the next image-plane step.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Constant hologram-plane amplitude $\sqrt{1/(HW)}$.
    pub fn hologram_amplitude(&self) -> f64 {
        self.hologram_amplitude
    }
}

impl ConstraintOperator for WciaConstraint {
    fn constrain_hologram(&mut self, field: &mut ComplexField) {
        let amp = self.hologram_amplitude;
        // Zero samples have no phase; c / |c| is NaN there and stays NaN.
        field.mapv_inplace(|c| amp * (c / c.norm()));
    }

    fn constrain_image(
        &mut self,
        image: &mut ComplexField,
        reconstructed: &ComplexField,
        _normalized_amplitude: &Array2<f64>,
        target: &TargetField,
    ) {
        let beta = self.beta;
        Zip::from(image)
            .and(reconstructed)
            .and(target.amplitude())
            .for_each(|a, rec, &t| {
                let current = a.norm();
                let achieved = rec.norm();
                let constrained = if SignalMask::Positive.contains(t) {
                    current * (t / achieved).powf(beta)
                } else {
                    current
                };
                *a = constrained * (*rec / achieved);
            });
        self.beta = beta.sqrt();
    }

    fn adaptive_parameter(&self) -> Option<f64> {
        Some(self.beta)
    }

    fn method_name(&self) -> &str {
        "Weighted Constraint Iterative Algorithm (WCIA)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_hologram_amplitude_preserves_unit_energy() {
        let mut op = WciaConstraint::new((4, 8));
        let mut field = Array2::from_shape_fn((4, 8), |(i, j)| {
            Complex64::new(1.0 + i as f64, -(j as f64) - 0.5)
        });
        op.constrain_hologram(&mut field);
        let energy: f64 = field.iter().map(|c| c.norm_sqr()).sum();
        assert_abs_diff_eq!(energy, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(field[[0, 0]].arg(), Complex64::new(1.0, -0.5).arg(), epsilon = 1e-12);
    }

    #[test]
    fn test_beta_schedule() {
        let target = TargetField::new(array![[1.0, 0.0], [0.0, 0.0]]).unwrap();
        let mut op = WciaConstraint::new(target.shape());
        let reconstructed = Array2::from_elem((2, 2), Complex64::new(0.5, 0.5));
        let normalized = Array2::zeros((2, 2));
        let mut image = Array2::from_elem((2, 2), Complex64::new(1.0, 0.0));

        let mut previous = op.beta();
        for k in 1..=6 {
            op.constrain_image(&mut image, &reconstructed, &normalized, &target);
            let expected = INITIAL_BETA.powf(1.0 / 2f64.powi(k));
            assert_relative_eq!(op.beta(), expected, max_relative = 1e-12);
            assert!(op.beta() > previous && op.beta() < 1.0);
            previous = op.beta();
        }
    }

    #[test]
    fn test_image_constraint_signal_and_dark_field() {
        let target = TargetField::new(array![[1.0, 0.0]]).unwrap();
        let mut op = WciaConstraint::new(target.shape());
        // Burn through the schedule so β is close to one
        let dummy_rec = Array2::from_elem((1, 2), Complex64::new(1.0, 0.0));
        let mut dummy = Array2::from_elem((1, 2), Complex64::new(1.0, 0.0));
        let normalized = Array2::zeros((1, 2));
        for _ in 0..40 {
            op.constrain_image(&mut dummy, &dummy_rec, &normalized, &target);
        }
        assert_relative_eq!(op.beta(), 1.0, max_relative = 1e-9);

        let mut image = array![[Complex64::new(2.0, 0.0), Complex64::new(0.0, 3.0)]];
        let reconstructed = array![[Complex64::new(0.0, 4.0), Complex64::new(-1.0, 0.0)]];
        op.constrain_image(&mut image, &reconstructed, &normalized, &target);

        // Signal: |A_k| * (1 / 4)^1 = 0.5 with the reconstructed phase
        assert_relative_eq!(image[[0, 0]].norm(), 0.5, max_relative = 1e-8);
        assert_abs_diff_eq!(image[[0, 0]].arg(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        // Dark field keeps its own amplitude, takes the reconstructed phase
        assert_abs_diff_eq!(image[[0, 1]].norm(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(image[[0, 1]].arg(), std::f64::consts::PI, epsilon = 1e-12);
    }
}
