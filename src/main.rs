use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use log::info;

use bandsweep::audio::{BandSweeper, FrequencyBand, PlayerEvent, SweepReport, TrackPlayer};

#[derive(Parser)]
#[command(name = "bandsweep")]
#[command(about = "Measure the average spectral energy of a frequency band across an audio track")]
struct Args {
    /// Audio file to analyze (MP3, WAV, M4A, OGG, etc.)
    #[arg()]
    input_file: String,

    /// Lower band edge in Hz
    #[arg(long, default_value = "20")]
    low: f32,

    /// Upper band edge in Hz
    #[arg(long, default_value = "250")]
    high: f32,

    /// FFT size of the analysis pipeline (power of two; the snapshot carries
    /// half as many bins)
    #[arg(long, default_value = "2048")]
    fft_size: usize,

    /// Seconds to wait for a seek to settle before giving up
    #[arg(long, default_value = "5")]
    seek_timeout: u64,

    /// Save a JSON sweep report to this path
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Bandsweep");
    info!("Input file: {}", args.input_file);
    info!("Band: {} - {} Hz", args.low, args.high);
    info!("FFT size: {}", args.fft_size);

    let mut player = TrackPlayer::new();
    let events = player.events();
    player.load(&args.input_file)?;

    // Analysis setup is gated on the metadata-ready event.
    let metadata = events.try_iter().find_map(|event| match event {
        PlayerEvent::MetadataReady {
            duration_seconds,
            sample_rate,
        } => Some((duration_seconds, sample_rate)),
        _ => None,
    });
    let Some((duration_seconds, sample_rate)) = metadata else {
        bail!("track metadata never became ready");
    };

    info!("Duration: {:.2}s at {}Hz", duration_seconds, sample_rate);

    let band = FrequencyBand::new(args.low, args.high);
    let (mut seeker, mut analyzer) = player.analysis(args.fft_size)?;

    let sweeper = BandSweeper::new().with_seek_timeout(Duration::from_secs(args.seek_timeout));
    let outcome = sweeper
        .sweep(band, duration_seconds, &mut seeker, &mut analyzer, |step| {
            if step.seconds % 30 == 0 {
                info!(
                    "swept {}s of {:.0}s (level {:.2})",
                    step.seconds,
                    duration_seconds.ceil(),
                    step.level
                );
            }
        })
        .await?;

    info!("=== SWEEP RESULT ===");
    info!("Steps sampled: {}", outcome.steps.len());
    info!(
        "Average level for {} - {} Hz: {:.2} / 255",
        args.low, args.high, outcome.average
    );
    println!("{:.2}", outcome.average);

    if let Some(output) = &args.output {
        let report = SweepReport::from_outcome(
            args.input_file.clone(),
            band,
            sample_rate as f32,
            args.fft_size / 2,
            duration_seconds,
            &outcome,
        );
        report.save_json(output)?;
        info!("Report saved to {}", output);
    }

    Ok(())
}
