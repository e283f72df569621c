//! Band-energy analysis for audio tracks.
//!
//! Loads a track, maps a frequency band in Hz onto discrete FFT bins, averages
//! the byte magnitudes in that bin range, and can sweep that average across
//! the whole track one second at a time.

pub mod audio;

pub use audio::{
    band_level, BandSweeper, FrequencyBand, PlayerEvent, PlayerState, SpectrumAnalyzer,
    SpectrumError, SpectrumParams, SpectrumSnapshotSource, SweepCancel, SweepOutcome, SweepReport,
    SweepStep, TimePositioner, TrackPlayer, TrackSeeker,
};
