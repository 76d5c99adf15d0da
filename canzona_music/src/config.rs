// Pipeline configuration.
//
// Every tunable of the train-and-generate pipeline, with defaults that
// reproduce the stock run: order-2 models trained on data/raw_midis, a
// 128-note melody in [48, 84] written to output/. A JSON config file only
// needs the fields it changes (`#[serde(default)]`); command-line flags in
// main.rs override both.
//
// Also home to the JSON read/write helpers shared by model persistence.

use crate::error::MusicError;
use crate::generator::GenerationParams;
use crate::midi::EncoderConfig;
use crate::mode::PitchClassSet;
use crate::rhythm::DEFAULT_UNIT_SCALE;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scanned (non-recursively) for .mid / .midi files.
    pub midi_dir: PathBuf,
    /// Per-file pitch text, `<stem>.txt`.
    pub melody_dir: PathBuf,
    /// Per-file duration text, `<stem>_dur.txt`.
    pub duration_dir: PathBuf,
    pub output_dir: PathBuf,

    pub markov_order: usize,
    pub history_max: usize,
    pub rhythm_unit_scale: f64,

    pub length: usize,
    pub start_pitch: i32,
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub melody_temperature: f64,
    pub rhythm_temperature: f64,
    pub enforce_scale: bool,
    /// Mode name (`c-ionian`) or pitch-class list (`0,2,4,5,7,9,11`).
    pub scale: String,

    pub ticks_per_quarter: u16,
    pub microseconds_per_quarter: u32,
    pub channel: u8,
    pub velocity: u8,

    /// `None` seeds the models from entropy.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let encoder = EncoderConfig::default();
        let generation = GenerationParams::default();
        PipelineConfig {
            midi_dir: PathBuf::from("data/raw_midis"),
            melody_dir: PathBuf::from("data/melodies"),
            duration_dir: PathBuf::from("data/durations"),
            output_dir: PathBuf::from("output"),
            markov_order: 2,
            history_max: 8,
            rhythm_unit_scale: DEFAULT_UNIT_SCALE,
            length: generation.length,
            start_pitch: generation.start_pitch,
            min_pitch: generation.min_pitch,
            max_pitch: generation.max_pitch,
            melody_temperature: generation.melody_temperature,
            rhythm_temperature: generation.rhythm_temperature,
            enforce_scale: false,
            scale: "c-ionian".to_string(),
            ticks_per_quarter: encoder.ticks_per_quarter,
            microseconds_per_quarter: encoder.microseconds_per_quarter,
            channel: encoder.channel,
            velocity: encoder.velocity,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, MusicError> {
        read_json(path)
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            ticks_per_quarter: self.ticks_per_quarter,
            microseconds_per_quarter: self.microseconds_per_quarter,
            channel: self.channel,
            velocity: self.velocity,
        }
    }

    /// Fails only if scale enforcement is on and the scale does not parse.
    pub fn generation_params(&self) -> Result<GenerationParams, MusicError> {
        let scale = if self.enforce_scale {
            Some(self.scale.parse::<PitchClassSet>()?)
        } else {
            None
        };
        Ok(GenerationParams {
            length: self.length,
            start_pitch: self.start_pitch,
            min_pitch: self.min_pitch,
            max_pitch: self.max_pitch,
            melody_temperature: self.melody_temperature,
            rhythm_temperature: self.rhythm_temperature,
            scale,
        })
    }

    /// Seed for the rhythm model, offset from the pitch model's so the two
    /// streams differ.
    pub fn rhythm_seed(&self) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(1))
    }

    pub fn generated_text_path(&self) -> PathBuf {
        self.output_dir.join("generated_seq.txt")
    }

    pub fn generated_midi_path(&self) -> PathBuf {
        self.output_dir.join("generated.mid")
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, MusicError> {
    let contents = std::fs::read_to_string(path).map_err(|e| MusicError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|e| MusicError::json(path, e))
}

pub(crate) fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), MusicError> {
    let contents = serde_json::to_string_pretty(value).map_err(|e| MusicError::json(path, e))?;
    std::fs::write(path, contents).map_err(|e| MusicError::io(path, e))
}
