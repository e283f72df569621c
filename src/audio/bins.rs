use super::error::SpectrumError;
use super::{FrequencyBand, SpectrumParams};

/// Inclusive range of frequency-bin indices.
///
/// Derived from a [`FrequencyBand`] by [`bin_range`] and recomputed per call;
/// never cached, since the pipeline's [`SpectrumParams`] may change between
/// calls. Indices are signed so a malformed band produces a negative index
/// that [`average_magnitude`] can reject instead of a silently wrapped one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRange {
    pub start: i64,
    pub end: i64,
}

/// Frequency width of one bin in Hz: `sample_rate / bin_count`.
pub fn hz_per_bin(params: SpectrumParams) -> Result<f32, SpectrumError> {
    if params.bin_count == 0 {
        return Err(SpectrumError::InvalidParameters(
            "bin count must be positive".into(),
        ));
    }
    if !params.sample_rate.is_finite() || params.sample_rate <= 0.0 {
        return Err(SpectrumError::InvalidParameters(format!(
            "sample rate must be a positive finite value, got {}",
            params.sample_rate
        )));
    }
    Ok(params.sample_rate / params.bin_count as f32)
}

/// Map a band to the inclusive bin-index range covering it.
///
/// Each edge divides by its own freshly computed resolution. The range is not
/// clamped to the buffer; indices outside the valid range are detected when
/// the range is reduced by [`average_magnitude`].
pub fn bin_range(band: FrequencyBand, params: SpectrumParams) -> Result<BinRange, SpectrumError> {
    if !band.low_hz.is_finite() || !band.high_hz.is_finite() {
        return Err(SpectrumError::InvalidParameters(format!(
            "band edges must be finite, got {}..{} Hz",
            band.low_hz, band.high_hz
        )));
    }
    let start = (band.low_hz / hz_per_bin(params)?).floor() as i64;
    let end = (band.high_hz / hz_per_bin(params)?).floor() as i64;
    Ok(BinRange { start, end })
}

/// Arithmetic mean of the magnitudes in `buffer[range.start..=range.end]`.
///
/// Magnitudes are summed into a u64 accumulator so that even a buffer of
/// thousands of max-value bins cannot overflow, and the mean is returned as
/// f64 without rounding.
pub fn average_magnitude(range: BinRange, buffer: &[u8]) -> Result<f64, SpectrumError> {
    if range.start < 0 || range.end >= buffer.len() as i64 {
        return Err(SpectrumError::IndexOutOfRange {
            start: range.start,
            end: range.end,
            bins: buffer.len(),
        });
    }
    let count = range.end - range.start + 1;
    if count <= 0 {
        return Err(SpectrumError::EmptyRange);
    }

    let total: u64 = buffer[range.start as usize..=range.end as usize]
        .iter()
        .map(|&m| u64::from(m))
        .sum();

    Ok(total as f64 / count as f64)
}
