// Rhythm model: durations quantized to a grid, then modelled as tokens.
//
// The grid unit is inferred once, from the first training sequence that
// yields one: durations are scaled by `unit_scale` (1000 by default) and
// rounded, the GCD of the positive results is divided back by the scale,
// and the unit is floored at MIN_UNIT. Later training reuses the frozen
// unit. A duration's token is round(d / unit); a token's duration is
// token * unit.
//
// Non-positive durations are dropped before tokenizing, both in training
// and in sampling histories. Without a unit the model produces 0.0, which
// callers treat as "no opinion".

use crate::config::{read_json, write_json};
use crate::error::MusicError;
use crate::markov::{SequenceModel, Token};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_UNIT_SCALE: f64 = 1000.0;

/// Smallest grid unit, in seconds.
pub const MIN_UNIT: f64 = 1e-4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhythmModel {
    unit: Option<f64>,
    unit_scale: f64,
    tokens: SequenceModel,
}

impl RhythmModel {
    pub fn new(order: usize, unit_scale: f64) -> Self {
        Self::from_tokens(SequenceModel::new(order), unit_scale)
    }

    pub fn with_seed(order: usize, unit_scale: f64, seed: u64) -> Self {
        Self::from_tokens(SequenceModel::with_seed(order, seed), unit_scale)
    }

    fn from_tokens(tokens: SequenceModel, unit_scale: f64) -> Self {
        RhythmModel {
            unit: None,
            unit_scale: sanitize_scale(unit_scale),
            tokens,
        }
    }

    pub fn reseed(&mut self, seed: Option<u64>) {
        self.tokens.reseed(seed);
    }

    /// The quantization unit in seconds, once inferred.
    pub fn unit(&self) -> Option<f64> {
        self.unit
    }

    /// The underlying token model.
    pub fn tokens(&self) -> &SequenceModel {
        &self.tokens
    }

    /// Nearest grid step count for `duration`; 0 without a unit.
    pub fn duration_to_token(&self, duration: f64) -> Token {
        match self.unit {
            Some(unit) => (duration / unit).round().max(0.0) as Token,
            None => 0,
        }
    }

    pub fn token_to_duration(&self, token: Token) -> f64 {
        self.unit.map_or(0.0, |unit| f64::from(token) * unit)
    }

    /// Token sequence for the finite positive durations in `durations`.
    pub fn tokenize(&self, durations: &[f64]) -> Vec<Token> {
        durations
            .iter()
            .filter(|&&d| d > 0.0 && d.is_finite())
            .map(|&d| self.duration_to_token(d))
            .collect()
    }

    /// Add one duration sequence, inferring the unit first if needed.
    pub fn train(&mut self, durations: &[f64]) {
        if durations.is_empty() {
            return;
        }
        if self.unit.is_none() {
            self.unit = infer_unit(durations, self.unit_scale);
            match self.unit {
                Some(unit) => log::debug!("rhythm unit inferred: {unit} s"),
                None => {
                    log::warn!(
                        "no quantization unit in a sequence of {} durations; skipped",
                        durations.len()
                    );
                    return;
                }
            }
        }
        let tokens = self.tokenize(durations);
        self.tokens.train(&tokens);
    }

    pub fn train_many<I>(&mut self, sequences: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        for durations in sequences {
            self.train(durations.as_ref());
        }
    }

    /// Next duration in seconds given the durations so far.
    pub fn sample_next(&mut self, history: &[f64], temperature: f64) -> f64 {
        if self.unit.is_none() {
            log::warn!("sampling rhythm without a quantization unit");
            return 0.0;
        }
        let history = self.tokenize(history);
        let token = self.tokens.sample_next(&history, temperature);
        self.token_to_duration(token)
    }

    pub fn save(&self, path: &Path) -> Result<(), MusicError> {
        write_json(self, path)
    }

    pub fn load(path: &Path, seed: Option<u64>) -> Result<Self, MusicError> {
        let mut model: RhythmModel = read_json(path)?;
        model.unit_scale = sanitize_scale(model.unit_scale);
        model.reseed(seed);
        Ok(model)
    }
}

fn sanitize_scale(unit_scale: f64) -> f64 {
    if unit_scale.is_finite() && unit_scale >= 1.0 {
        unit_scale
    } else {
        DEFAULT_UNIT_SCALE
    }
}

/// GCD of the scaled, rounded positive durations, back in seconds.
fn infer_unit(durations: &[f64], unit_scale: f64) -> Option<f64> {
    let divisor = durations
        .iter()
        .map(|&d| (d * unit_scale).round())
        .filter(|&scaled| scaled >= 1.0 && scaled.is_finite())
        .map(|scaled| scaled as u64)
        .reduce(gcd)?;
    Some((divisor as f64 / unit_scale).max(MIN_UNIT))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
