//! Normalisation and convergence metrics.
//!
//! All functions here are pure. Degenerate inputs (constant arrays, empty
//! signal regions, zero sums) are not special-cased: they yield NaN or Inf,
//! which then propagates into the run's outputs and metric history.

use ndarray::{Array2, Zip};

use crate::types::{Metrics, SignalMask, TargetField};

/// Stabilising constants of the SSIM luminance and contrast terms.
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;
/// Side length of the uniform SSIM window (clamped to the image size).
const SSIM_WINDOW: usize = 7;

/// Linear rescale to [0, 1]: `(x − min) / (max − min)`.
///
/// A constant array divides by zero and yields NaN everywhere.
pub fn normalize(values: &Array2<f64>) -> Array2<f64> {
    let mut out = values.clone();
    normalize_in_place(&mut out);
    out
}

/// [`normalize`] without allocating.
pub fn normalize_in_place(values: &mut Array2<f64>) {
    let (min, max) = min_max(values.iter().copied());
    let range = max - min;
    values.mapv_inplace(|v| (v - min) / range);
}

/// Divide the entries selected by `mask` by their maximum, in place, so the
/// peak becomes 1 and ratios between entries are kept. Unselected entries
/// are set to zero.
///
/// No offset is subtracted: a positive entry never maps to zero.
pub fn scale_to_peak(values: &mut Array2<f64>, mask: &Array2<bool>) {
    let (_, peak) = min_max(
        values
            .iter()
            .zip(mask.iter())
            .filter(|&(_, &m)| m)
            .map(|(&v, _)| v),
    );
    Zip::from(values).and(mask).for_each(|v, &m| {
        *v = if m { *v / peak } else { 0.0 };
    });
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn selected<'a>(
    values: &'a Array2<f64>,
    target: &'a TargetField,
    mask: SignalMask,
) -> impl Iterator<Item = (f64, f64)> + 'a {
    values
        .iter()
        .zip(target.amplitude().iter())
        .filter(move |&(_, &t)| mask.contains(t))
        .map(|(&v, &t)| (v, t))
}

/// Spot uniformity over the signal region: `1 − (max − min) / (max + min)`.
///
/// 1.0 means every spot is equally bright. An empty signal region yields NaN.
pub fn uniformity(values: &Array2<f64>, target: &TargetField, mask: SignalMask) -> f64 {
    let mut any = false;
    let (min, max) = min_max(selected(values, target, mask).map(|(v, _)| {
        any = true;
        v
    }));
    if !any {
        return f64::NAN;
    }
    1.0 - (max - min) / (max + min)
}

/// Fraction of the target mass delivered to the signal region:
/// `Σ value[signal] / Σ target[signal]`.
pub fn efficiency(values: &Array2<f64>, target: &TargetField, mask: SignalMask) -> f64 {
    let (delivered, wanted) = selected(values, target, mask)
        .fold((0.0, 0.0), |(d, w), (v, t)| (d + v, w + t));
    delivered / wanted
}

/// Global-sum RMSE between intensities:
/// `sqrt( (Σ(retrieved − target))² / (Σ target)² )`.
///
/// The sums are taken over the whole array before squaring, so pixel errors
/// of opposite sign cancel. Callers pass intensities (squared amplitudes).
pub fn rmse(retrieved: &Array2<f64>, target: &Array2<f64>) -> f64 {
    let diff_sum: f64 = Zip::from(retrieved)
        .and(target)
        .fold(0.0, |acc, &r, &t| acc + (r - t));
    global_rmse(diff_sum, target.sum())
}

fn global_rmse(diff_sum: f64, target_sum: f64) -> f64 {
    (diff_sum.powi(2) / target_sum.powi(2)).sqrt()
}

/// Mean structural similarity between `achieved` and `reference`.
///
/// Uses a uniform square window (7×7, shrunk to the largest odd size that
/// fits small images), sample covariance, and the usual stabilising
/// constants scaled by the reference's dynamic range. Only fully-contained
/// windows contribute to the mean.
pub fn ssim(achieved: &Array2<f64>, reference: &Array2<f64>) -> f64 {
    let (h, w) = reference.dim();
    let mut win = SSIM_WINDOW.min(h).min(w);
    if win % 2 == 0 {
        win -= 1;
    }
    if win == 0 {
        return f64::NAN;
    }

    let (ref_min, ref_max) = min_max(reference.iter().copied());
    let data_range = ref_max - ref_min;
    let c1 = (SSIM_K1 * data_range).powi(2);
    let c2 = (SSIM_K2 * data_range).powi(2);

    let np = (win * win) as f64;
    let cov_norm = if np > 1.0 { np / (np - 1.0) } else { 1.0 };

    let mut total = 0.0;
    let mut count = 0usize;
    for (wx, wy) in achieved
        .windows((win, win))
        .into_iter()
        .zip(reference.windows((win, win)))
    {
        let ux = wx.mean().unwrap_or(f64::NAN);
        let uy = wy.mean().unwrap_or(f64::NAN);
        let (mut vx, mut vy, mut vxy) = (0.0, 0.0, 0.0);
        Zip::from(&wx).and(&wy).for_each(|&x, &y| {
            vx += (x - ux) * (x - ux);
            vy += (y - uy) * (y - uy);
            vxy += (x - ux) * (y - uy);
        });
        let vx = vx / np * cov_norm;
        let vy = vy / np * cov_norm;
        let vxy = vxy / np * cov_norm;

        let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
        let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
        total += num / den;
        count += 1;
    }

    total / count as f64
}

/// Evaluate all four metrics for one iteration.
///
/// `normalized_amplitude` is the min–max normalised image-plane amplitude.
/// Uniformity uses the binary spot mask, efficiency the positive mask.
pub fn evaluate(normalized_amplitude: &Array2<f64>, target: &TargetField) -> Metrics {
    // RMSE on intensities, squared on the fly
    let (diff_sum, target_sum) = Zip::from(normalized_amplitude)
        .and(target.amplitude())
        .fold((0.0, 0.0), |(d, s), &a, &t| (d + (a * a - t * t), s + t * t));
    Metrics {
        uniformity: uniformity(normalized_amplitude, target, SignalMask::Binary),
        efficiency: efficiency(normalized_amplitude, target, SignalMask::Positive),
        rmse: global_rmse(diff_sum, target_sum),
        ssim: ssim(normalized_amplitude, target.amplitude()),
    }
}
