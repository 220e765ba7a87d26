//! # Holotrap Compute
//!
//! Compute backend abstraction for holotrap. This crate provides a
//! [`ComputeBackend`](backend::ComputeBackend) trait that isolates the
//! phase-retrieval code from device-specific execution details, and the
//! [`ScratchArena`](arena::ScratchArena) that bounds per-run buffer memory.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (rustfft + Rayon) | `cpu` (default) | Implemented |

pub mod arena;
pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use arena::ScratchArena;
pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, FftDirection};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
