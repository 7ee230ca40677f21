//! Sample rate and channel conversion using rubato
//!
//! Used when the output device cannot run at the speech sample rate.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use tracing::debug;

use super::AudioError;

/// Resample a mono signal from `input_rate` to `output_rate`.
///
/// Returns a copy when the rates already match.
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, AudioError> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    debug!(
        "Resampling {} frames from {}Hz to {}Hz",
        input.len(),
        input_rate,
        output_rate
    );

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input.len(),
        1,
    )
    .map_err(|e| AudioError::Resample(format!("Failed to create resampler: {}", e)))?;

    let mut planar = resampler
        .process(&[input], None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    Ok(planar.pop().unwrap_or_default())
}

/// Copy a mono signal into every channel of an interleaved buffer
pub fn expand_channels(mono: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return mono.to_vec();
    }

    let mut interleaved = Vec::with_capacity(mono.len() * channels);
    for &sample in mono {
        interleaved.extend(std::iter::repeat(sample).take(channels));
    }
    interleaved
}
