//! Weighted Gerchberg–Saxton constraints.
//!
//! GSW adds a per-spot feedback weight to the GS image-plane step
//! (Di Leonardo et al., *Opt. Express* **15**, 1913, 2007). After every
//! iteration the weight of each signal pixel is rescaled by the square root
//! of its desired-to-achieved amplitude ratio:
//!
//! $$
//! \tilde{w}_k = \sqrt{t}\,\sqrt{t / \hat{a}_k}\; w_{k-1}, \qquad
//! w_k = \tilde{w}_k / \max_{\text{signal}} \tilde{w}_k, \qquad w_0 = t
//! $$
//!
//! where $\hat{a}_k$ is the normalised reconstructed amplitude. Spots that
//! came out too dim gain weight on the next pass; spots that came out too
//! bright lose it. The rescale only divides by the peak, so every lit spot
//! keeps a positive weight. The weighted field $w_k$ replaces the target as
//! the amplitude reference of iteration $k+1$.

use ndarray::{Array2, Zip};
use num_complex::Complex64;

use super::gs::unit_amplitude;
use super::ConstraintOperator;
use crate::metrics::scale_to_peak;
use crate::types::{ComplexField, SignalMask, TargetField};

/// GSW operator holding the feedback weights of the previous iteration.
#[derive(Debug, Clone)]
pub struct GswConstraint {
    weights: Array2<f64>,
    signal: Array2<bool>,
}

impl GswConstraint {
    pub fn new(target: &TargetField) -> Self {
        Self {
            weights: target.amplitude().clone(),
            signal: target.mask(SignalMask::Positive),
        }
    }

    /// Weights produced by the most recent image-plane step.
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }
}

impl ConstraintOperator for GswConstraint {
    fn constrain_hologram(&mut self, field: &mut ComplexField) {
        unit_amplitude(field);
    }

    fn constrain_image(
        &mut self,
        image: &mut ComplexField,
        reconstructed: &ComplexField,
        normalized_amplitude: &Array2<f64>,
        target: &TargetField,
    ) {
        Zip::from(&mut self.weights)
            .and(target.amplitude())
            .and(normalized_amplitude)
            .and(&self.signal)
            .for_each(|w, &t, &a, &s| {
                *w = if s { t.sqrt() * (t / a).sqrt() * *w } else { 0.0 };
            });
        scale_to_peak(&mut self.weights, &self.signal);

        Zip::from(image)
            .and(reconstructed)
            .and(&self.weights)
            .for_each(|out, rec, &w| {
                *out = Complex64::from_polar(w, rec.arg());
            });
    }

    fn method_name(&self) -> &str {
        "Weighted Gerchberg-Saxton (GSW)"
    }
}
