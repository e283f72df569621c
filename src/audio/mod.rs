pub mod analyzer;
pub mod bins;
pub mod error;
pub mod playback;
pub mod report;
pub mod sweep;

pub use analyzer::SpectrumAnalyzer;
pub use bins::{average_magnitude, bin_range, hz_per_bin, BinRange};
pub use error::SpectrumError;
pub use playback::{PlayerEvent, PlayerState, TrackPlayer, TrackSeeker};
pub use report::SweepReport;
pub use sweep::{
    band_level, BandSweeper, SpectrumSnapshotSource, SweepCancel, SweepOutcome, SweepStep,
    TimePositioner,
};

use serde::{Deserialize, Serialize};

/// A frequency interval in Hz, inclusive on both edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl FrequencyBand {
    pub fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }
}

/// Sampling parameters of an analysis pipeline: the source sample rate and
/// the number of frequency bins per magnitude snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumParams {
    pub sample_rate: f32,
    pub bin_count: usize,
}

impl SpectrumParams {
    pub fn new(sample_rate: f32, bin_count: usize) -> Self {
        Self {
            sample_rate,
            bin_count,
        }
    }
}
