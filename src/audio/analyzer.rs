use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::error::SpectrumError;
use super::sweep::SpectrumSnapshotSource;

// dB full-scale range mapped onto the 0-255 byte magnitude encoding.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Frequency-analysis pipeline over a decoded track.
///
/// Reads `fft_size` mono samples at the shared playback cursor, applies a
/// Hann window, runs a forward FFT and scales the lower half-spectrum into a
/// reusable buffer of byte magnitudes. Built by
/// [`TrackPlayer::analysis`](super::playback::TrackPlayer::analysis), which
/// hands it the same cursor its seeker writes to.
pub struct SpectrumAnalyzer {
    samples: Arc<Vec<f32>>,
    cursor: Arc<Mutex<usize>>,
    sample_rate: f32,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<u8>,
}

impl SpectrumAnalyzer {
    pub(crate) fn new(
        samples: Arc<Vec<f32>>,
        cursor: Arc<Mutex<usize>>,
        sample_rate: f32,
        fft_size: usize,
    ) -> Result<Self, SpectrumError> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(SpectrumError::InvalidParameters(format!(
                "fft size must be a power of two >= 2, got {}",
                fft_size
            )));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(SpectrumError::InvalidParameters(format!(
                "sample rate must be a positive finite value, got {}",
                sample_rate
            )));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Ok(Self {
            samples,
            cursor,
            sample_rate,
            fft_size,
            fft,
            window: Self::hann_window(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0; fft_size / 2],
        })
    }

    fn hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    /// Overwrite the magnitude buffer from the samples at the cursor.
    /// Windows past the end of the track are zero-padded.
    fn refresh(&mut self) {
        let pos = *self.cursor.lock().unwrap();

        for i in 0..self.fft_size {
            let sample = self.samples.get(pos + i).copied().unwrap_or(0.0);
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.scratch);

        for (bin, out) in self.magnitudes.iter_mut().enumerate() {
            let amplitude = self.scratch[bin].norm() * 2.0 / self.fft_size as f32;
            *out = Self::byte_level(amplitude);
        }
    }

    fn byte_level(amplitude: f32) -> u8 {
        let db = 20.0 * amplitude.max(1e-10).log10();
        let scaled = (db - MIN_DB) / (MAX_DB - MIN_DB) * 255.0;
        scaled.clamp(0.0, 255.0) as u8
    }
}

#[async_trait]
impl SpectrumSnapshotSource for SpectrumAnalyzer {
    async fn current_snapshot(&mut self) -> Result<&[u8]> {
        self.refresh();
        Ok(&self.magnitudes)
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44100.0;
    const FFT_SIZE: usize = 2048;

    fn sine(frequency: f32, seconds: f32) -> Arc<Vec<f32>> {
        let total = (SAMPLE_RATE * seconds) as usize;
        Arc::new(
            (0..total)
                .map(|i| {
                    let phase = 2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE;
                    0.5 * phase.sin()
                })
                .collect(),
        )
    }

    fn analyzer(samples: Arc<Vec<f32>>) -> SpectrumAnalyzer {
        let cursor = Arc::new(Mutex::new(0));
        SpectrumAnalyzer::new(samples, cursor, SAMPLE_RATE, FFT_SIZE).unwrap()
    }

    #[test]
    fn rejects_bad_fft_sizes() {
        let samples = Arc::new(vec![0.0; 64]);
        let cursor = Arc::new(Mutex::new(0));
        for size in [0, 1, 3, 1000] {
            let result =
                SpectrumAnalyzer::new(Arc::clone(&samples), Arc::clone(&cursor), SAMPLE_RATE, size);
            assert!(result.is_err(), "fft size {} accepted", size);
        }
    }

    #[tokio::test]
    async fn snapshot_has_one_byte_per_bin() {
        let mut analyzer = analyzer(sine(440.0, 1.0));
        let bins = analyzer.bin_count();
        let snapshot = analyzer.current_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), bins);
        assert_eq!(bins, FFT_SIZE / 2);
    }

    #[tokio::test]
    async fn sine_peaks_at_its_own_bin() {
        // Tone centered on FFT bin 100.
        let frequency = 100.0 * SAMPLE_RATE / FFT_SIZE as f32;
        let mut analyzer = analyzer(sine(frequency, 1.0));

        let snapshot = analyzer.current_snapshot().await.unwrap();
        let peak = snapshot
            .iter()
            .enumerate()
            .max_by_key(|(_, &m)| m)
            .map(|(bin, _)| bin)
            .unwrap();

        // Hann leakage spreads the peak by at most a bin.
        assert!((99..=101).contains(&peak), "peak at bin {}", peak);
        assert!(snapshot[peak] > snapshot[peak + 200]);
    }

    #[tokio::test]
    async fn silence_is_all_zero_magnitudes() {
        let mut analyzer = analyzer(Arc::new(vec![0.0; FFT_SIZE * 4]));
        let snapshot = analyzer.current_snapshot().await.unwrap();
        assert!(snapshot.iter().all(|&m| m == 0));
    }

    #[tokio::test]
    async fn window_past_track_end_is_zero_padded() {
        let samples = sine(440.0, 1.0);
        let cursor = Arc::new(Mutex::new(samples.len() - 16));
        let mut analyzer =
            SpectrumAnalyzer::new(samples, cursor, SAMPLE_RATE, FFT_SIZE).unwrap();

        // Only 16 real samples remain; this must not panic.
        let snapshot = analyzer.current_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), FFT_SIZE / 2);
    }
}
