//! # HoloTrap Core
//!
//! Phase-only hologram computation for spatial light modulators. This crate
//! implements iterative Fourier-transform phase retrieval: given a target
//! intensity pattern (for example an array of optical-trap spots) it finds a
//! hologram-plane phase whose far field reproduces the target.
//!
//! ## Architecture
//!
//! The [`engine::PhaseRetrievalEngine`] owns the iteration loop. Each
//! algorithm only supplies its plane constraints through the
//! [`constraint::ConstraintOperator`] trait; propagation, metrics and
//! encoding are shared, stateless services. FFTs are dispatched to a
//! [`holotrap_compute::ComputeBackend`].
//!
//! ## Modules
//!
//! - [`types`]: target fields, run parameters, metrics and outcomes.
//! - [`propagator`]: centred FFT between hologram and image planes.
//! - [`metrics`]: normalisation, uniformity, efficiency, RMSE and SSIM.
//! - [`constraint`]: GS, GSW and WCIA plane constraints.
//! - [`init`]: initial phase strategies.
//! - [`engine`]: the retrieval loop and [`engine::HoloError`].
//! - [`encoder`]: phase map to 8-bit SLM bitmap.
//! - [`reconstruct`]: far-field reconstruction preview.
//! - [`storage`]: hologram bitmap and raw field files.

pub mod constraint;
pub mod encoder;
pub mod engine;
pub mod init;
pub mod metrics;
pub mod propagator;
pub mod reconstruct;
pub mod storage;
pub mod types;

pub use engine::{HoloError, PhaseRetrievalEngine};
pub use types::{
    Algorithm, ComplexField, ConvergenceCriterion, Metrics, MetricsSeries, PhaseInit, PhaseMap,
    RunOutcome, RunParams, SignalMask, TargetField, Termination,
};
