use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::sweep::{SweepOutcome, SweepStep};
use super::FrequencyBand;

/// Serializable summary of one completed sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    /// Path of the analyzed track.
    pub source: String,
    pub band: FrequencyBand,
    pub sample_rate: f32,
    pub bin_count: usize,
    pub duration_seconds: f32,
    pub steps: Vec<SweepStep>,
    pub average: f64,
}

impl SweepReport {
    pub fn from_outcome(
        source: impl Into<String>,
        band: FrequencyBand,
        sample_rate: f32,
        bin_count: usize,
        duration_seconds: f32,
        outcome: &SweepOutcome,
    ) -> Self {
        Self {
            source: source.into(),
            band,
            sample_rate,
            bin_count,
            duration_seconds,
            steps: outcome.steps.clone(),
            average: outcome.average,
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_through_json() {
        let outcome = SweepOutcome {
            steps: vec![
                SweepStep {
                    seconds: 0,
                    level: 12.5,
                },
                SweepStep {
                    seconds: 1,
                    level: 14.0,
                },
            ],
            average: 13.25,
        };
        let report = SweepReport::from_outcome(
            "tone.wav",
            FrequencyBand::new(20.0, 250.0),
            44100.0,
            1024,
            2.0,
            &outcome,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        report.save_json(&path).unwrap();

        let loaded = SweepReport::load_json(&path).unwrap();
        assert_eq!(loaded.source, "tone.wav");
        assert_eq!(loaded.steps, report.steps);
        assert_eq!(loaded.average, 13.25);
        assert_eq!(loaded.bin_count, 1024);
    }
}
