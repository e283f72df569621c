use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::info;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::analyzer::SpectrumAnalyzer;
use super::sweep::TimePositioner;

/// Playback lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unloaded,
    Loading,
    Ready,
    Playing,
    Ended,
}

/// Lifecycle events, delivered on the channel returned by
/// [`TrackPlayer::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Fires once per load, after decoding completes. Duration and sample
    /// rate are known from here on; analysis setup is gated on this event.
    MetadataReady {
        duration_seconds: f32,
        sample_rate: u32,
    },
    /// Fires repeatedly while a track is decoding.
    Progress { seconds_buffered: f32 },
    /// Fires repeatedly during audible playback, from [`TrackPlayer::update`].
    TimeUpdate { position_seconds: f32 },
    /// Fires once when audible playback reaches the end of the track.
    Ended,
}

struct LoadedTrack {
    path: PathBuf,
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    duration_seconds: f32,
}

/// Loads a track, owns the shared playback cursor, and wires the lifecycle.
///
/// Decoding happens fully up front into a mono f32 buffer; audible output is
/// optional and no audio device is opened until [`TrackPlayer::play`], so the
/// decode and analysis paths work on headless machines.
pub struct TrackPlayer {
    state: PlayerState,
    track: Option<LoadedTrack>,
    cursor: Arc<Mutex<usize>>,
    events: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
    output: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
    last_tick: Option<Instant>,
}

impl TrackPlayer {
    pub fn new() -> Self {
        let (events, event_rx) = unbounded();
        Self {
            state: PlayerState::Unloaded,
            track: None,
            cursor: Arc::new(Mutex::new(0)),
            events,
            event_rx,
            output: None,
            sink: None,
            last_tick: None,
        }
    }

    /// Receiver for lifecycle events. May be called any number of times;
    /// every receiver sees every event from the moment it was created.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.event_rx.clone()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Track duration in seconds, known once the track is loaded.
    pub fn duration_seconds(&self) -> Option<f32> {
        self.track.as_ref().map(|t| t.duration_seconds)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.track.as_ref().map(|t| t.sample_rate)
    }

    /// Current playback position in seconds.
    pub fn position_seconds(&self) -> f32 {
        let track = match &self.track {
            Some(track) => track,
            None => return 0.0,
        };
        *self.cursor.lock().unwrap() as f32 / track.sample_rate as f32
    }

    /// Decode `path` fully and transition to Ready. Emits `Progress` once per
    /// decoded second and `MetadataReady` on completion.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if matches!(self.state, PlayerState::Loading | PlayerState::Playing) {
            bail!("cannot load a track while {:?}", self.state);
        }

        self.state = PlayerState::Loading;
        self.sink = None;
        *self.cursor.lock().unwrap() = 0;

        match self.decode(path.as_ref()) {
            Ok(track) => {
                info!(
                    "loaded {:?}: {:.2}s at {}Hz ({} samples)",
                    track.path,
                    track.duration_seconds,
                    track.sample_rate,
                    track.samples.len()
                );
                let _ = self.events.send(PlayerEvent::MetadataReady {
                    duration_seconds: track.duration_seconds,
                    sample_rate: track.sample_rate,
                });
                self.track = Some(track);
                self.state = PlayerState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = PlayerState::Unloaded;
                self.track = None;
                Err(e)
            }
        }
    }

    fn decode(&self, path: &Path) -> Result<LoadedTrack> {
        let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
        let source =
            Decoder::new(BufReader::new(file)).with_context(|| format!("decoding {:?}", path))?;

        let sample_rate = source.sample_rate();
        let channels = source.channels() as usize;
        let raw: Vec<i16> = source.convert_samples().collect();

        // Mix to mono; one Progress event per whole second decoded.
        let mut samples = Vec::with_capacity(raw.len() / channels);
        let mut next_progress = sample_rate as usize;
        for frame in raw.chunks_exact(channels) {
            let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
            samples.push(sum / channels as f32);
            if samples.len() >= next_progress {
                let _ = self.events.send(PlayerEvent::Progress {
                    seconds_buffered: samples.len() as f32 / sample_rate as f32,
                });
                next_progress += sample_rate as usize;
            }
        }

        if samples.is_empty() {
            bail!("{:?} contains no audio", path);
        }

        Ok(LoadedTrack {
            path: path.to_path_buf(),
            duration_seconds: samples.len() as f32 / sample_rate as f32,
            samples: Arc::new(samples),
            sample_rate,
        })
    }

    /// Build the analysis handles for the loaded track: a seeker and a
    /// spectrum pipeline sharing this player's sample buffer and cursor. The
    /// pipeline is an owned resource, not ambient state; a second player has
    /// fully independent handles.
    pub fn analysis(&self, fft_size: usize) -> Result<(TrackSeeker, SpectrumAnalyzer)> {
        let track = self
            .track
            .as_ref()
            .ok_or_else(|| anyhow!("no track loaded"))?;

        let seeker = TrackSeeker {
            cursor: Arc::clone(&self.cursor),
            sample_rate: track.sample_rate as f32,
            total_samples: track.samples.len(),
        };
        let analyzer = SpectrumAnalyzer::new(
            Arc::clone(&track.samples),
            Arc::clone(&self.cursor),
            track.sample_rate as f32,
            fft_size,
        )?;

        Ok((seeker, analyzer))
    }

    /// Start (or resume) audible playback from the current position. Opens
    /// the default output device on first use.
    pub fn play(&mut self) -> Result<()> {
        let track = match (&self.state, &self.track) {
            (PlayerState::Ready | PlayerState::Ended, Some(track)) => track,
            (PlayerState::Playing, _) => return Ok(()),
            _ => bail!("no track loaded"),
        };

        if self.state == PlayerState::Ended {
            *self.cursor.lock().unwrap() = 0;
            self.sink = None;
        }

        if self.output.is_none() {
            self.output = Some(OutputStream::try_default().context("opening audio output")?);
        }
        let (_, handle) = self.output.as_ref().unwrap();

        if self.sink.is_none() {
            let position = *self.cursor.lock().unwrap() as f32 / track.sample_rate as f32;
            self.sink = Some(Self::make_sink(handle, track, position)?);
        }

        self.sink.as_ref().unwrap().play();
        self.last_tick = Some(Instant::now());
        self.state = PlayerState::Playing;
        info!("playback started");
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        self.update();
        // update() may have observed the end of the track.
        if self.state != PlayerState::Playing {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.last_tick = None;
        self.state = PlayerState::Ready;
        info!("playback paused");
    }

    /// Stop playback and rewind to the start.
    pub fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        *self.cursor.lock().unwrap() = 0;
        self.last_tick = None;
        if self.track.is_some() {
            self.state = PlayerState::Ready;
        }
        info!("playback stopped");
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume.clamp(0.0, 1.0));
        }
    }

    /// Move the shared cursor and, when audible playback is running, restart
    /// the sink from the new position.
    pub fn seek(&mut self, seconds: f32) -> Result<()> {
        let track = self.track.as_ref().ok_or_else(|| anyhow!("no track loaded"))?;
        if !seconds.is_finite() || seconds < 0.0 {
            bail!("seek target must be finite and non-negative, got {}", seconds);
        }

        let sample = ((seconds * track.sample_rate as f32) as usize).min(track.samples.len());
        *self.cursor.lock().unwrap() = sample;
        let position = sample as f32 / track.sample_rate as f32;

        if self.state == PlayerState::Playing {
            if let Some((_, handle)) = &self.output {
                if let Some(old) = self.sink.take() {
                    old.stop();
                }
                let sink = Self::make_sink(handle, track, position)?;
                sink.play();
                self.sink = Some(sink);
                self.last_tick = Some(Instant::now());
            }
        } else {
            // Rebuilt from the new position on the next play().
            self.sink = None;
        }
        Ok(())
    }

    fn make_sink(handle: &OutputStreamHandle, track: &LoadedTrack, position_seconds: f32) -> Result<Sink> {
        let file = BufReader::new(File::open(&track.path)?);
        let source = Decoder::new(file)?;
        let sink = Sink::try_new(handle)?;
        sink.pause();
        if position_seconds > 0.0 {
            sink.append(source.skip_duration(Duration::from_secs_f32(position_seconds)));
        } else {
            sink.append(source);
        }
        Ok(sink)
    }

    /// Poll-style tick for audible playback: advances the cursor by wall
    /// time, emits `TimeUpdate`, and transitions to Ended (emitting `Ended`
    /// once) when the sink drains.
    pub fn update(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        let track = match &self.track {
            Some(track) => track,
            None => return,
        };

        if let Some(last) = self.last_tick.replace(Instant::now()) {
            let advanced = (last.elapsed().as_secs_f32() * track.sample_rate as f32) as usize;
            let mut cursor = self.cursor.lock().unwrap();
            *cursor = (*cursor + advanced).min(track.samples.len());
        }

        let position = self.position_seconds();
        let finished = self.sink.as_ref().map_or(true, |sink| sink.empty());

        if finished {
            self.state = PlayerState::Ended;
            self.last_tick = None;
            let _ = self.events.send(PlayerEvent::Ended);
            info!("playback ended");
        } else {
            let _ = self.events.send(PlayerEvent::TimeUpdate {
                position_seconds: position,
            });
        }
    }
}

impl Default for TrackPlayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Seek handle over a player's shared cursor.
pub struct TrackSeeker {
    cursor: Arc<Mutex<usize>>,
    sample_rate: f32,
    total_samples: usize,
}

#[async_trait]
impl TimePositioner for TrackSeeker {
    async fn seek_to(&mut self, seconds: f32) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            bail!("seek target must be finite and non-negative, got {}", seconds);
        }
        let sample = ((seconds * self.sample_rate) as usize).min(self.total_samples);
        // The decoded buffer settles immediately; the await point is the
        // contract, not a wait.
        *self.cursor.lock().unwrap() = sample;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sweep::BandSweeper;
    use crate::audio::FrequencyBand;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 44100;

    fn write_sine_wav(path: &Path, frequency: f32, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (seconds * SAMPLE_RATE as f32) as usize;
        for i in 0..total {
            let phase = 2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32;
            writer
                .write_sample((phase.sin() * 0.5 * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn load_reports_metadata_and_reaches_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 440.0, 2.0);

        let mut player = TrackPlayer::new();
        let events = player.events();
        assert_eq!(player.state(), PlayerState::Unloaded);

        player.load(&path).unwrap();
        assert_eq!(player.state(), PlayerState::Ready);
        assert_eq!(player.sample_rate(), Some(SAMPLE_RATE));
        let duration = player.duration_seconds().unwrap();
        assert!((duration - 2.0).abs() < 0.01, "duration {}", duration);

        let received: Vec<_> = events.try_iter().collect();
        assert!(received
            .iter()
            .any(|e| matches!(e, PlayerEvent::Progress { .. })));
        match received.last() {
            Some(PlayerEvent::MetadataReady {
                duration_seconds,
                sample_rate,
            }) => {
                assert!((duration_seconds - 2.0).abs() < 0.01);
                assert_eq!(*sample_rate, SAMPLE_RATE);
            }
            other => panic!("expected MetadataReady last, got {:?}", other),
        }
    }

    #[test]
    fn failed_load_returns_to_unloaded() {
        let mut player = TrackPlayer::new();
        assert!(player.load("/definitely/not/here.wav").is_err());
        assert_eq!(player.state(), PlayerState::Unloaded);
        assert!(player.duration_seconds().is_none());
    }

    #[tokio::test]
    async fn seeker_positions_and_clamps_the_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 440.0, 1.0);

        let mut player = TrackPlayer::new();
        player.load(&path).unwrap();
        let (mut seeker, _analyzer) = player.analysis(2048).unwrap();

        seeker.seek_to(0.5).await.unwrap();
        assert!((player.position_seconds() - 0.5).abs() < 0.001);

        // Past the end clamps to the track length.
        seeker.seek_to(1000.0).await.unwrap();
        assert!((player.position_seconds() - 1.0).abs() < 0.01);

        assert!(seeker.seek_to(f32::NAN).await.is_err());
        assert!(seeker.seek_to(-1.0).await.is_err());
    }

    #[tokio::test]
    async fn sweep_separates_occupied_band_from_quiet_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1000.0, 3.0);

        let mut player = TrackPlayer::new();
        player.load(&path).unwrap();
        let duration = player.duration_seconds().unwrap();
        let (mut seeker, mut analyzer) = player.analysis(2048).unwrap();

        let sweeper = BandSweeper::new();
        let low_end = sweeper
            .sweep_average(
                FrequencyBand::new(0.0, 4000.0),
                duration,
                &mut seeker,
                &mut analyzer,
            )
            .await
            .unwrap();
        let high_end = sweeper
            .sweep_average(
                FrequencyBand::new(10000.0, 20000.0),
                duration,
                &mut seeker,
                &mut analyzer,
            )
            .await
            .unwrap();

        assert!(
            low_end > high_end * 3.0 + 1.0,
            "tone band {:.2} vs quiet band {:.2}",
            low_end,
            high_end
        );
    }
}
