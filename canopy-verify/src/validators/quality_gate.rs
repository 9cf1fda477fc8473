//! Quality gate: cheap deterministic pre-filters
//!
//! Rejects undersized images and images whose frequency spectrum carries
//! too little high-frequency energy (blur). The blur score itself is
//! computed here and recorded in the per-image signals; the gate only
//! compares it against the threshold.

use image::DynamicImage;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::models::{ImageSignals, RejectReason, Thresholds};

/// Minimum accepted edge length in pixels
pub const MIN_DIMENSION: u32 = 160;

/// Fixed resample edge for the blur spectrum
const SPECTRUM_SIZE: usize = 256;

/// Size and blur pre-filter.
pub struct QualityGate;

impl QualityGate {
    /// First violated condition, or `None` when the image passes.
    pub fn check(signals: &ImageSignals, thresholds: &Thresholds) -> Option<RejectReason> {
        if signals.width < MIN_DIMENSION || signals.height < MIN_DIMENSION {
            return Some(RejectReason::TooSmall);
        }
        if signals.blur_score < thresholds.min_blur {
            return Some(RejectReason::BlurLow);
        }
        None
    }
}

/// High-frequency energy ratio of the image spectrum, in [0, 1].
///
/// **Algorithm:**
/// 1. Grayscale bicubic resample to 256x256
/// 2. 2-D FFT, magnitude spectrum
/// 3. ratio = (total - low-frequency window) / (total + 1e-6), where the
///    window is the centered square of the given half-width after shift
///
/// Sharp images keep substantial energy outside the low-frequency window;
/// blurred images concentrate near DC. Any internal failure yields 0.0 —
/// fail closed, never a silent pass.
pub fn blur_score(image: &DynamicImage, low_freq_half_width: u32) -> f32 {
    match blur_score_spectrum(image, low_freq_half_width) {
        Some(score) => score,
        None => {
            tracing::warn!("Blur spectrum computation failed; failing closed with score 0");
            0.0
        }
    }
}

fn blur_score_spectrum(image: &DynamicImage, low_freq_half_width: u32) -> Option<f32> {
    let n = SPECTRUM_SIZE;
    let gray = image.to_luma8();
    let resized = image::imageops::resize(
        &gray,
        n as u32,
        n as u32,
        image::imageops::FilterType::CatmullRom,
    );

    let mut rows: Vec<Complex<f32>> = resized
        .pixels()
        .map(|p| Complex::new(p[0] as f32, 0.0))
        .collect();
    if rows.len() != n * n {
        return None;
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);

    // Row pass
    for row in rows.chunks_exact_mut(n) {
        fft.process(row);
    }

    // Column pass on the transpose
    let mut cols = vec![Complex::new(0.0f32, 0.0); n * n];
    for y in 0..n {
        for x in 0..n {
            cols[x * n + y] = rows[y * n + x];
        }
    }
    for col in cols.chunks_exact_mut(n) {
        fft.process(col);
    }

    // Low-frequency energy sits in the centered square once the spectrum
    // is shifted (DC at n/2). Work on unshifted indices directly.
    let half = (n / 2) as i64;
    let hw = i64::from(low_freq_half_width).min(half);
    let mut total = 0.0f64;
    let mut center = 0.0f64;

    for u in 0..n {
        let su = ((u as i64) + half) % n as i64;
        let u_in_window = su >= half - hw && su < half + hw;
        for v in 0..n {
            let magnitude = f64::from(cols[u * n + v].norm());
            total += magnitude;
            if u_in_window {
                let sv = ((v as i64) + half) % n as i64;
                if sv >= half - hw && sv < half + hw {
                    center += magnitude;
                }
            }
        }
    }

    let high = total - center;
    let ratio = (high / (total + 1e-6)) as f32;
    ratio.is_finite().then(|| ratio.clamp(0.0, 1.0))
}
