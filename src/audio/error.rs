use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for band-energy analysis.
///
/// The mapping and averaging functions in [`crate::audio::bins`] fail fast and
/// synchronously on malformed input; nothing is silently clamped. The sweeper
/// surfaces the first error from any iteration and aborts the remainder of the
/// sweep. Adapter internals use `anyhow` and cross into this taxonomy at the
/// sweep boundary via [`SpectrumError::ExternalCapability`].
#[derive(Error, Debug)]
pub enum SpectrumError {
    /// Sample rate, bin count, band edge or duration outside its valid range.
    #[error("invalid analysis parameters: {0}")]
    InvalidParameters(String),

    /// Computed bin range falls outside the magnitude buffer.
    #[error("bin range {start}..={end} out of bounds for {bins} bins")]
    IndexOutOfRange { start: i64, end: i64, bins: usize },

    /// Inverted bin range; averaging it would divide by a non-positive count.
    #[error("bin range is empty")]
    EmptyRange,

    /// A sweep over a track shorter than one whole time step has no samples
    /// to average.
    #[error("sweep over {0}s of audio covers no whole-second steps")]
    EmptySweep(f32),

    /// The seek collaborator never settled.
    #[error("seek to {seconds}s did not settle within {timeout:?}")]
    SeekTimeout { seconds: f32, timeout: Duration },

    /// The sweep was cancelled before reaching the given step.
    #[error("sweep cancelled at step {0}")]
    Cancelled(u32),

    /// The seek or snapshot collaborator failed. Not retried here; retry
    /// policy belongs to the adapter.
    #[error("audio capability failed: {0:#}")]
    ExternalCapability(anyhow::Error),
}

impl From<anyhow::Error> for SpectrumError {
    fn from(error: anyhow::Error) -> Self {
        Self::ExternalCapability(error)
    }
}
