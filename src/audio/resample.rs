//! Sample-rate conversion to the 16 kHz target.
//!
//! The rubato sinc path is preferred when the `high-quality-audio` feature is
//! enabled; a FIR-filtered linear interpolator covers the fallback so capture
//! still works if rubato rejects an unusual device rate.

use super::TARGET_RATE;
use crate::log_debug;
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
use std::f32::consts::PI;
#[cfg(feature = "high-quality-audio")]
use std::sync::atomic::{AtomicBool, Ordering};

// Practical device-rate bounds: ratio stays within ~0.01x .. 8x of 16 kHz.
pub(super) const MIN_DEVICE_RATE: u32 = 2_000;
pub(super) const MAX_DEVICE_RATE: u32 = 1_600_000;
const MAX_DOWNSAMPLING_TAPS: usize = 129;

#[cfg(feature = "high-quality-audio")]
static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// Convert mono samples at `device_rate` to the target rate. Returns the input
/// unchanged when the rates already match or the rate is degenerate.
pub(super) fn to_target_rate(input: &[f32], device_rate: u32) -> Vec<f32> {
    if device_rate == 0 || input.is_empty() || device_rate == TARGET_RATE {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match sinc_resample(input, device_rate) {
            Ok(output) => output,
            Err(err) => {
                if !FALLBACK_WARNED.swap(true, Ordering::AcqRel) {
                    log_debug(&format!(
                        "sinc resampler failed ({err}); falling back to linear path"
                    ));
                }
                filtered_linear_resample(input, device_rate)
            }
        }
    }

    #[cfg(not(feature = "high-quality-audio"))]
    {
        filtered_linear_resample(input, device_rate)
    }
}

#[cfg(feature = "high-quality-audio")]
fn sinc_resample(input: &[f32], device_rate: u32) -> Result<Vec<f32>> {
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
        return Err(anyhow!(
            "unsupported device sample rate {device_rate}Hz for resampling"
        ));
    }
    let ratio = f64::from(TARGET_RATE) / f64::from(device_rate);

    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expect = (((input.len() as f64) * ratio).round() as usize).max(1).saturating_add(8);
    let mut out = Vec::with_capacity(expect);
    let mut seg = vec![0.0f32; chunk];
    let mut idx = 0usize;
    while idx < input.len() {
        let end = (idx + chunk).min(input.len());
        let len = end - idx;
        // Pad the trailing partial chunk with its last sample so the filter
        // does not ring against a step to zero.
        let pad = input[end - 1];
        seg.fill(pad);
        seg[..len].copy_from_slice(&input[idx..end]);
        let produced = resampler
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        out.extend_from_slice(&produced[0]);
        idx = end;
    }

    match out.len().cmp(&expect) {
        CmpOrdering::Greater => out.truncate(expect),
        CmpOrdering::Less => {
            let pad = out.last().copied().unwrap_or(0.0);
            out.resize(expect, pad);
        }
        CmpOrdering::Equal => {}
    }
    Ok(out)
}

pub(super) fn filtered_linear_resample(input: &[f32], device_rate: u32) -> Vec<f32> {
    if device_rate == 0 || input.is_empty() {
        return input.to_vec();
    }
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
        return input.to_vec();
    }

    let ratio = TARGET_RATE as f32 / device_rate as f32;
    let filtered = if device_rate > TARGET_RATE {
        // Decimation needs a low-pass first or high frequencies alias down
        // into the speech band.
        let taps = downsampling_tap_count(device_rate);
        low_pass_fir(input, device_rate, taps)
    } else {
        input.to_vec()
    };
    linear_resample(&filtered, ratio)
}

pub(super) fn linear_resample(input: &[f32], ratio: f32) -> Vec<f32> {
    let output_len = (input.len() as f32 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = i as f32 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx - idx as f32;
        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input.last().copied().unwrap_or(0.0));
        }
    }
    output
}

/// Short FIR for near-equal rates, longer when collapsing 48 kHz into 16 kHz.
pub(super) fn downsampling_tap_count(device_rate: u32) -> usize {
    let decimation_ratio = device_rate as f32 / TARGET_RATE as f32;
    let mut taps = (decimation_ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

pub(super) fn low_pass_fir(input: &[f32], device_rate: u32, taps: usize) -> Vec<f32> {
    if input.is_empty() || taps <= 1 {
        return input.to_vec();
    }

    let normalized_cutoff = (TARGET_RATE as f32 * 0.5 / device_rate as f32).min(0.499);
    let coeffs = design_low_pass(normalized_cutoff, taps);
    let half = taps / 2;
    let mut output = Vec::with_capacity(input.len());

    for n in 0..input.len() {
        let mut acc = 0.0;
        for (k, coeff) in coeffs.iter().enumerate() {
            if let Some(idx) = n.checked_add(k).and_then(|sum| sum.checked_sub(half)) {
                if let Some(sample) = input.get(idx) {
                    acc += *sample * coeff;
                }
            }
        }
        output.push(acc);
    }

    output
}

/// Hamming-windowed sinc taps, normalized to unit gain.
pub(super) fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mut coeffs = Vec::with_capacity(taps);
    let m = (taps - 1) as f32;

    for n in 0..taps {
        let centered = n as f32 - m / 2.0;
        let x = 2.0 * PI * normalized_cutoff * centered;
        let sinc = if centered == 0.0 {
            2.0 * normalized_cutoff
        } else {
            (2.0 * normalized_cutoff * x.sin()) / x
        };
        let window = if taps <= 1 {
            1.0
        } else {
            0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos()
        };
        coeffs.push(sinc * window);
    }

    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        for coeff in coeffs.iter_mut() {
            *coeff /= sum;
        }
    }

    coeffs
}
