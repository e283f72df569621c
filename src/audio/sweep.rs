use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::bins::{average_magnitude, bin_range};
use super::error::SpectrumError;
use super::{FrequencyBand, SpectrumParams};

const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Seekable playback position of a shared media resource.
///
/// Seeking is a side-effecting operation on that shared state, so a seek must
/// settle before the next snapshot is taken.
#[async_trait]
pub trait TimePositioner {
    /// Move the playback position to `seconds`, resolving once the seek has
    /// settled. After resolution, the next snapshot reflects audio at or
    /// near `seconds`.
    async fn seek_to(&mut self, seconds: f32) -> Result<()>;
}

/// Source of frequency-domain magnitude snapshots.
#[async_trait]
pub trait SpectrumSnapshotSource {
    /// Capture a fresh snapshot at the current playback position. The
    /// returned buffer is the pipeline's reusable scratch storage,
    /// overwritten on every call; it is only valid until the next snapshot.
    async fn current_snapshot(&mut self) -> Result<&[u8]>;

    /// Sample rate the pipeline was set up with, in Hz.
    fn sample_rate(&self) -> f32;

    /// Number of bins in every snapshot this source returns.
    fn bin_count(&self) -> usize;
}

/// Cooperative cancellation flag for a running sweep, checked once per step.
#[derive(Debug, Clone, Default)]
pub struct SweepCancel(Arc<AtomicBool>);

impl SweepCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One sampled step of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepStep {
    /// Playback position the step was sampled at, in whole seconds.
    pub seconds: u32,
    /// Band-averaged magnitude at that position.
    pub level: f64,
}

/// Result of a completed sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub steps: Vec<SweepStep>,
    /// Mean of all step levels.
    pub average: f64,
}

/// Sweeps a playback position across a track, sampling the average magnitude
/// of one frequency band once per whole second of media time.
pub struct BandSweeper {
    seek_timeout: Duration,
    cancel: SweepCancel,
}

impl Default for BandSweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl BandSweeper {
    pub fn new() -> Self {
        Self {
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            cancel: SweepCancel::default(),
        }
    }

    /// Replace the default 5s limit on how long one seek may take to settle.
    pub fn with_seek_timeout(mut self, seek_timeout: Duration) -> Self {
        self.seek_timeout = seek_timeout;
        self
    }

    /// Handle that aborts the sweep between steps, leaving the playback
    /// position at the last completed step.
    pub fn cancel_handle(&self) -> SweepCancel {
        self.cancel.clone()
    }

    /// Sweep `band` across `duration_seconds` of media time and return every
    /// step plus the overall mean. `on_step` observes each step as it
    /// completes; it is the only way to capture partial progress, since any
    /// error aborts the sweep without a partial result.
    pub async fn sweep<S, A>(
        &self,
        band: FrequencyBand,
        duration_seconds: f32,
        seeker: &mut S,
        source: &mut A,
        mut on_step: impl FnMut(&SweepStep),
    ) -> Result<SweepOutcome, SpectrumError>
    where
        S: TimePositioner + ?Sized,
        A: SpectrumSnapshotSource + ?Sized,
    {
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            return Err(SpectrumError::InvalidParameters(format!(
                "duration must be finite and non-negative, got {}",
                duration_seconds
            )));
        }

        let mut steps = Vec::new();
        let mut total = 0.0f64;
        let mut count = 0u32;
        let mut t = 0u32;

        // One step per fully elapsed whole second, visited strictly in
        // order: each seek mutates the shared playback position, and a
        // snapshot is only valid once its seek has settled.
        let whole_seconds = duration_seconds.floor();
        while (t as f32) < whole_seconds {
            if self.cancel.is_cancelled() {
                return Err(SpectrumError::Cancelled(t));
            }

            timeout(self.seek_timeout, seeker.seek_to(t as f32))
                .await
                .map_err(|_| SpectrumError::SeekTimeout {
                    seconds: t as f32,
                    timeout: self.seek_timeout,
                })??;

            // Params are re-read and the range recomputed on every step; the
            // pipeline configuration may change under us.
            let params = SpectrumParams::new(source.sample_rate(), source.bin_count());
            let range = bin_range(band, params)?;
            let buffer = source.current_snapshot().await?;
            let level = average_magnitude(range, buffer)?;

            total += level;
            count += 1;
            let step = SweepStep { seconds: t, level };
            debug!("sweep step {}s: level {:.2}", step.seconds, step.level);
            on_step(&step);
            steps.push(step);
            t += 1;
        }

        if count == 0 {
            return Err(SpectrumError::EmptySweep(duration_seconds));
        }

        Ok(SweepOutcome {
            steps,
            average: total / count as f64,
        })
    }

    /// Like [`BandSweeper::sweep`], returning only the overall mean.
    pub async fn sweep_average<S, A>(
        &self,
        band: FrequencyBand,
        duration_seconds: f32,
        seeker: &mut S,
        source: &mut A,
    ) -> Result<f64, SpectrumError>
    where
        S: TimePositioner + ?Sized,
        A: SpectrumSnapshotSource + ?Sized,
    {
        self.sweep(band, duration_seconds, seeker, source, |_| {})
            .await
            .map(|outcome| outcome.average)
    }
}

/// Average magnitude of `band` in one fresh snapshot, at whatever position
/// the pipeline is currently at.
pub async fn band_level<A>(band: FrequencyBand, source: &mut A) -> Result<f64, SpectrumError>
where
    A: SpectrumSnapshotSource + ?Sized,
{
    let params = SpectrumParams::new(source.sample_rate(), source.bin_count());
    let range = bin_range(band, params)?;
    let buffer = source.current_snapshot().await?;
    average_magnitude(range, buffer)
}
