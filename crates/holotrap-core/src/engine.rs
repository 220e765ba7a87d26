//! The phase-retrieval engine.
//!
//! A run alternates between the two planes until the termination criterion
//! trips or the iteration cap is reached:
//!
//! ```text
//! Init ─► backward ─► constrain hologram ─► forward ─► evaluate ─► constrain image ─┐
//!              ▲                                                                  │
//!              └──────────────────── continue ◄───────────────────────────────────┘
//! ```
//!
//! The initial field $A_0 = t \, e^{i\phi_0}$ is the image-plane estimate.
//! Iterations are strictly sequential. All working buffers come from a
//! per-run [`ScratchArena`] and go back to it when the run ends; the two
//! output arrays are detached from it. The pool is freed when the run
//! returns, on both the success and the error path.

use std::sync::Arc;

use ndarray::Zip;

use thiserror::Error;

use holotrap_compute::{ComputeBackend, ComputeError, ScratchArena};

use crate::constraint::ConstraintOperator;
use crate::init::{initial_field_into, initial_phase_into};
use crate::metrics::{evaluate, normalize_in_place};
use crate::propagator::Propagator;
use crate::types::{MetricsSeries, PhaseInit, RunOutcome, RunParams, TargetField, Termination};

/// Errors that abort a retrieval run.
///
/// Numerical degeneracy (NaN/Inf from flat or all-zero targets) is not an
/// error: it propagates into the outputs. Reaching `max_iterations` is not an
/// error either; see [`Termination::MaxIterations`].
#[derive(Debug, Error)]
pub enum HoloError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Computation failed: {0}")]
    Compute(#[from] ComputeError),
}

/// Runs phase retrieval against a shared compute backend.
///
/// The engine itself holds no per-run state, so one instance can serve many
/// concurrent runs.
#[derive(Clone)]
pub struct PhaseRetrievalEngine {
    propagator: Propagator,
}

impl PhaseRetrievalEngine {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            propagator: Propagator::new(backend),
        }
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// Run the algorithm selected in `params`.
    ///
    /// One metric entry per completed iteration is appended to `metrics`.
    pub fn run(
        &self,
        target: &TargetField,
        params: &RunParams,
        init: &PhaseInit,
        metrics: &mut MetricsSeries,
    ) -> Result<RunOutcome, HoloError> {
        let mut operator = params.algorithm.operator(target);
        self.run_with(operator.as_mut(), target, params, init, metrics)
    }

    /// Run with a caller-owned operator, which stays inspectable afterwards
    /// (e.g. the WCIA β reached).
    pub fn run_with(
        &self,
        operator: &mut dyn ConstraintOperator,
        target: &TargetField,
        params: &RunParams,
        init: &PhaseInit,
        metrics: &mut MetricsSeries,
    ) -> Result<RunOutcome, HoloError> {
        let shape = target.shape();
        let mut arena = ScratchArena::new(shape, self.propagator.backend());

        let mut image = arena.take()?;
        let mut hologram = arena.take()?;
        let mut reconstructed = arena.take()?;
        let mut scratch = arena.take()?;
        // Holds the initial phase, then the normalised image amplitude
        let mut amplitude = arena.take_real()?;

        initial_phase_into(
            init,
            target,
            &self.propagator,
            &mut amplitude,
            &mut hologram,
            &mut scratch,
        )?;
        initial_field_into(target, &amplitude, &mut image);

        log::debug!(
            "{}: {}x{} target, max_iterations={}, criterion={:?}",
            operator.method_name(),
            shape.0,
            shape.1,
            params.max_iterations,
            params.criterion
        );

        let mut iterations = 0;
        let mut termination = Termination::MaxIterations;

        while iterations < params.max_iterations {
            self.propagator
                .backward_into(&image, &mut hologram, &mut scratch)?;
            operator.constrain_hologram(&mut hologram);

            self.propagator
                .forward_into(&hologram, &mut reconstructed, &mut scratch)?;
            Zip::from(&mut amplitude)
                .and(&reconstructed)
                .for_each(|a, c| *a = c.norm());
            normalize_in_place(&mut amplitude);

            let step = evaluate(&amplitude, target);
            metrics.push(&step);

            let beta = operator.adaptive_parameter();
            operator.constrain_image(&mut image, &reconstructed, &amplitude, target);
            iterations += 1;

            log::debug!(
                "iter {:>4}: uniformity={:.4} efficiency={:.4} rmse={:.4e} ssim={:.4} beta={:?}",
                iterations,
                step.uniformity,
                step.efficiency,
                step.rmse,
                step.ssim,
                beta
            );

            if params.criterion.is_satisfied(&step) {
                termination = Termination::Converged { iteration: iterations };
                break;
            }
        }

        if iterations == 0 {
            // No iteration ran; still hand back a phase-only hologram of the
            // initial field so the output has the target's shape.
            self.propagator
                .backward_into(&image, &mut hologram, &mut scratch)?;
            operator.constrain_hologram(&mut hologram);
        }

        // The phase map reuses the amplitude buffer
        Zip::from(&mut amplitude)
            .and(&hologram)
            .for_each(|p, c| *p = c.arg());

        match metrics.last() {
            Some(last) => log::info!(
                "{} finished after {} iterations ({:?}): uniformity={:.4} efficiency={:.4} rmse={:.4e} ssim={:.4}",
                operator.method_name(),
                iterations,
                termination,
                last.uniformity,
                last.efficiency,
                last.rmse,
                last.ssim
            ),
            None => log::info!(
                "{} finished after {} iterations ({:?})",
                operator.method_name(),
                iterations,
                termination
            ),
        }

        arena.give(image)?;
        arena.give(reconstructed)?;
        arena.give(scratch)?;
        let field = arena.detach(hologram);
        let phase = arena.detach(amplitude);
        let freed = arena.release();
        log::debug!("run released {} scratch bytes (peak {})", freed, arena.peak_bytes());

        Ok(RunOutcome {
            field,
            phase,
            iterations,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::WciaConstraint;
    use crate::types::{Algorithm, ConvergenceCriterion};
    use holotrap_compute::CpuBackend;
    use ndarray::Array2;

    fn engine() -> PhaseRetrievalEngine {
        PhaseRetrievalEngine::new(Arc::new(CpuBackend::new()))
    }

    fn spots(n: usize) -> TargetField {
        let mut t = Array2::zeros((n, n));
        for k in [n / 4, n / 2, 3 * n / 4] {
            t[[k, n / 4]] = 1.0;
            t[[k, 3 * n / 4]] = 1.0;
        }
        TargetField::new(t).unwrap()
    }

    #[test]
    fn test_runs_to_cap_when_criterion_unreachable() {
        let target = spots(16);
        let params = RunParams {
            max_iterations: 7,
            criterion: ConvergenceCriterion::Rmse { threshold: -1.0 },
            algorithm: Algorithm::Wcia,
        };
        let mut series = MetricsSeries::new();
        let out = engine()
            .run(&target, &params, &PhaseInit::Random { seed: Some(1) }, &mut series)
            .unwrap();

        assert_eq!(out.iterations, 7);
        assert_eq!(out.termination, Termination::MaxIterations);
        assert_eq!(series.len(), 7);
        assert_eq!(out.field.dim(), (16, 16));
        assert_eq!(out.phase.dim(), (16, 16));
    }

    #[test]
    fn test_trivially_satisfied_criterion_stops_after_one() {
        let target = spots(8);
        let params = RunParams {
            max_iterations: 20,
            criterion: ConvergenceCriterion::Rmse { threshold: f64::INFINITY },
            algorithm: Algorithm::Gs,
        };
        let mut series = MetricsSeries::new();
        let out = engine()
            .run(&target, &params, &PhaseInit::InverseFft, &mut series)
            .unwrap();
        assert_eq!(out.termination, Termination::Converged { iteration: 1 });
        assert!(out.converged());
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_zero_iterations_still_shaped() {
        let target = spots(8);
        let params = RunParams { max_iterations: 0, ..Default::default() };
        let mut series = MetricsSeries::new();
        let out = engine()
            .run(&target, &params, &PhaseInit::Random { seed: Some(3) }, &mut series)
            .unwrap();
        assert_eq!(out.iterations, 0);
        assert!(series.is_empty());
        assert_eq!(out.phase.dim(), (8, 8));
    }

    #[test]
    fn test_sink_appends_across_runs() {
        let target = spots(8);
        let params = RunParams {
            max_iterations: 3,
            criterion: ConvergenceCriterion::Ssim { threshold: 2.0 },
            algorithm: Algorithm::Gsw,
        };
        let mut series = MetricsSeries::new();
        let e = engine();
        e.run(&target, &params, &PhaseInit::Random { seed: Some(5) }, &mut series).unwrap();
        e.run(&target, &params, &PhaseInit::Random { seed: Some(6) }, &mut series).unwrap();
        assert_eq!(series.len(), 6);
    }

    #[test]
    fn test_wcia_phase_only_output() {
        let target = spots(16);
        let params = RunParams {
            max_iterations: 5,
            criterion: ConvergenceCriterion::Uniformity { threshold: 2.0 },
            algorithm: Algorithm::Wcia,
        };
        let mut op = WciaConstraint::new(target.shape());
        let mut series = MetricsSeries::new();
        let out = engine()
            .run_with(&mut op, &target, &params, &PhaseInit::Random { seed: Some(11) }, &mut series)
            .unwrap();

        let amp = op.hologram_amplitude();
        for c in out.field.iter() {
            assert!((c.norm() - amp).abs() < 1e-12);
        }
        for (c, &p) in out.field.iter().zip(out.phase.iter()) {
            assert_eq!(c.arg(), p);
        }
    }

    #[test]
    fn test_out_of_memory_aborts_run() {
        let backend = CpuBackend::new().with_memory_budget(64);
        let e = PhaseRetrievalEngine::new(Arc::new(backend));
        let mut series = MetricsSeries::new();
        let err = e
            .run(&spots(8), &RunParams::default(), &PhaseInit::default(), &mut series)
            .unwrap_err();
        assert!(matches!(err, HoloError::Compute(ComputeError::OutOfMemory { .. })));
        assert!(series.is_empty());
    }

    /// Four complex buffers and one real buffer are all a run ever holds,
    /// whatever the iteration count or initialisation.
    #[test]
    fn test_run_fits_in_its_working_set() {
        let working_set = 4 * 64 * 16 + 64 * 8;
        let params = RunParams {
            max_iterations: 6,
            criterion: ConvergenceCriterion::Uniformity { threshold: 2.0 },
            algorithm: Algorithm::Gsw,
        };
        for init in [PhaseInit::InverseFft, PhaseInit::Random { seed: Some(2) }] {
            let fits = PhaseRetrievalEngine::new(Arc::new(
                CpuBackend::new().with_memory_budget(working_set),
            ));
            let mut series = MetricsSeries::new();
            let out = fits.run(&spots(8), &params, &init, &mut series).unwrap();
            assert_eq!(out.iterations, 6);

            let short = PhaseRetrievalEngine::new(Arc::new(
                CpuBackend::new().with_memory_budget(working_set - 1),
            ));
            let err = short
                .run(&spots(8), &params, &init, &mut MetricsSeries::new())
                .unwrap_err();
            assert!(matches!(err, HoloError::Compute(ComputeError::OutOfMemory { .. })));
        }
    }

    #[test]
    fn test_repeated_runs_share_one_budget() {
        let backend = CpuBackend::new().with_memory_budget(4 * 64 * 16 + 64 * 8);
        let e = PhaseRetrievalEngine::new(Arc::new(backend));
        let params = RunParams { max_iterations: 2, ..Default::default() };
        for seed in 0..3 {
            let mut series = MetricsSeries::new();
            e.run(&spots(8), &params, &PhaseInit::Random { seed: Some(seed) }, &mut series)
                .unwrap();
        }
    }
}
