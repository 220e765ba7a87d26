//! Plane-specific constraint operators.
//!
//! Every algorithm variant alternates two projections: a hologram-plane
//! constraint that makes the field phase-only, and an image-plane constraint
//! that pulls the reconstructed amplitude toward the target. The
//! [`ConstraintOperator`] trait captures exactly those two steps so that the
//! engine can drive any variant without knowing which one it is.
//!
//! | Variant | Hologram plane | Image plane |
//! |---------|----------------|-------------|
//! | [`GsConstraint`] | amplitude = 1 | amplitude = target |
//! | [`GswConstraint`] | amplitude = 1 | amplitude = feedback weight |
//! | [`WciaConstraint`] | amplitude = √(1/HW) | soft constraint, exponent β |

pub mod gs;
pub mod gsw;
pub mod wcia;

use ndarray::Array2;

use crate::types::{Algorithm, ComplexField, TargetField};

pub use gs::GsConstraint;
pub use gsw::GswConstraint;
pub use wcia::WciaConstraint;

/// The two projections of one iteration.
///
/// Operators may carry state across iterations (GSW weights, the WCIA β
/// schedule); one operator instance belongs to exactly one run.
pub trait ConstraintOperator: Send {
    /// Project the hologram-plane field onto the phase-only set, in place.
    fn constrain_hologram(&mut self, field: &mut ComplexField);

    /// Build the next image-plane field.
    ///
    /// # Arguments
    /// * `image` - Image-plane field of the current iteration; overwritten
    ///   with the field for the next iteration.
    /// * `reconstructed` - Image-plane field obtained by propagating the
    ///   constrained hologram forward.
    /// * `normalized_amplitude` - Min–max normalised `|reconstructed|`.
    /// * `target` - The run's target.
    fn constrain_image(
        &mut self,
        image: &mut ComplexField,
        reconstructed: &ComplexField,
        normalized_amplitude: &Array2<f64>,
        target: &TargetField,
    );

    /// Current value of the adaptive constraint parameter, if the variant
    /// has one.
    fn adaptive_parameter(&self) -> Option<f64> {
        None
    }

    /// Human-readable name of the algorithm.
    fn method_name(&self) -> &str;
}

impl Algorithm {
    /// Fresh operator for a run against `target`.
    pub fn operator(self, target: &TargetField) -> Box<dyn ConstraintOperator> {
        match self {
            Algorithm::Gs => Box::new(GsConstraint::new()),
            Algorithm::Gsw => Box::new(GswConstraint::new(target)),
            Algorithm::Wcia => Box::new(WciaConstraint::new(target.shape())),
        }
    }
}
