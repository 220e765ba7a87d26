//! Initial phase strategies.

use ndarray::{Array2, Zip};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use holotrap_compute::FftDirection;

use crate::engine::HoloError;
use crate::propagator::{ifft_shift_into, Propagator};
use crate::types::{ComplexField, PhaseInit, PhaseMap, TargetField};

/// Resolve `strategy` into a phase map of the target's shape.
pub fn initial_phase(
    strategy: &PhaseInit,
    target: &TargetField,
    propagator: &Propagator,
) -> Result<PhaseMap, HoloError> {
    let shape = target.shape();
    let mut phase = Array2::zeros(shape);
    let mut work = Array2::zeros(shape);
    let mut shifted = Array2::zeros(shape);
    initial_phase_into(strategy, target, propagator, &mut phase, &mut work, &mut shifted)?;
    Ok(phase)
}

/// [`initial_phase`] into caller-owned buffers. `work` and `shifted` are
/// overwritten.
pub fn initial_phase_into(
    strategy: &PhaseInit,
    target: &TargetField,
    propagator: &Propagator,
    phase: &mut PhaseMap,
    work: &mut ComplexField,
    shifted: &mut ComplexField,
) -> Result<(), HoloError> {
    let shape = target.shape();
    for found in [phase.dim(), work.dim(), shifted.dim()] {
        if found != shape {
            return Err(HoloError::ShapeMismatch { expected: shape, found });
        }
    }

    match strategy {
        PhaseInit::Random { seed } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(*seed),
                None => StdRng::from_entropy(),
            };
            phase.mapv_inplace(|_| rng.gen::<f64>());
        }
        PhaseInit::InverseFft => {
            // Uncentred inverse transform, then centred: the target's own
            // spectrum phase as a starting guess.
            Zip::from(&mut *work)
                .and(target.amplitude())
                .for_each(|w, &t| *w = Complex64::new(t, 0.0));
            propagator.backend().fft2(work, FftDirection::Inverse)?;
            ifft_shift_into(work.view(), shifted);
            Zip::from(phase).and(&*shifted).for_each(|p, c| *p = c.arg());
        }
        PhaseInit::Custom(custom) => {
            if custom.dim() != shape {
                return Err(HoloError::ShapeMismatch {
                    expected: shape,
                    found: custom.dim(),
                });
            }
            phase.assign(custom);
        }
    }
    Ok(())
}

/// Starting image-plane field: target amplitude carrying `phase`.
pub fn initial_field(target: &TargetField, phase: &PhaseMap) -> ComplexField {
    let mut field = Array2::zeros(target.shape());
    initial_field_into(target, phase, &mut field);
    field
}

/// [`initial_field`] into a caller-owned buffer of the target's shape.
pub fn initial_field_into(target: &TargetField, phase: &PhaseMap, field: &mut ComplexField) {
    Zip::from(field)
        .and(target.amplitude())
        .and(phase)
        .for_each(|f, &t, &p| *f = Complex64::from_polar(t, p));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use holotrap_compute::CpuBackend;
    use ndarray::array;
    use std::sync::Arc;

    fn setup() -> (TargetField, Propagator) {
        let target = TargetField::new(array![
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.5],
            [1.0, 0.0, 0.0, 0.0]
        ])
        .unwrap();
        (target, Propagator::new(Arc::new(CpuBackend::new())))
    }

    #[test]
    fn test_random_phase_seeded_and_bounded() {
        let (target, p) = setup();
        let a = initial_phase(&PhaseInit::Random { seed: Some(7) }, &target, &p).unwrap();
        let b = initial_phase(&PhaseInit::Random { seed: Some(7) }, &target, &p).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), (3, 4));
        assert!(a.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_inverse_fft_phase_in_range() {
        let (target, p) = setup();
        let phase = initial_phase(&PhaseInit::InverseFft, &target, &p).unwrap();
        assert_eq!(phase.dim(), target.shape());
        let pi = std::f64::consts::PI;
        assert!(phase.iter().all(|&v| v > -pi - 1e-12 && v <= pi + 1e-12));
    }

    #[test]
    fn test_inverse_fft_of_centred_target_is_flat() {
        // A single spot at the origin has a flat (zero) spectrum phase
        let target = TargetField::new(array![[1.0, 0.0], [0.0, 0.0]]).unwrap();
        let p = Propagator::new(Arc::new(CpuBackend::new()));
        let phase = initial_phase(&PhaseInit::InverseFft, &target, &p).unwrap();
        for &v in phase.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_custom_phase_shape_checked() {
        let (target, p) = setup();
        let err = initial_phase(&PhaseInit::Custom(Array2::zeros((4, 3))), &target, &p).unwrap_err();
        assert!(matches!(err, HoloError::ShapeMismatch { expected: (3, 4), found: (4, 3) }));

        let ok = initial_phase(&PhaseInit::Custom(Array2::from_elem((3, 4), 0.3)), &target, &p).unwrap();
        assert_eq!(ok[[2, 3]], 0.3);
    }

    #[test]
    fn test_initial_field_carries_target_amplitude() {
        let (target, _) = setup();
        let phase = Array2::from_elem(target.shape(), std::f64::consts::FRAC_PI_2);
        let field = initial_field(&target, &phase);
        assert_abs_diff_eq!(field[[0, 1]].im, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(field[[1, 3]].norm(), 0.5, epsilon = 1e-12);
        assert_eq!(field[[0, 0]].norm(), 0.0);
    }
}
