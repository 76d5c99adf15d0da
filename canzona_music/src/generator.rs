// Melody generation from a trained pitch model and rhythm model.
//
// Each step samples a pitch from the last `order` pitches, optionally snaps
// it into the allowed scale, clamps it into the pitch range, then samples a
// duration from the recent durations. Notes are laid end to end from time
// 0, so start times never decrease.
//
// The pitch window starts with the caller's start pitch; the duration
// window starts empty. Both keep at most `history_max` entries, and
// `history_max` is never below the pitch model's order.
//
// The generator borrows the models and draws from their RNGs, so a seeded
// pair of models gives a reproducible melody.

use crate::markov::{SequenceModel, Token};
use crate::mode::PitchClassSet;
use crate::note::{MAX_PITCH, NoteEvent};
use crate::rhythm::RhythmModel;

/// Duration used when the rhythm model has nothing positive to offer.
pub const FALLBACK_DURATION: f64 = 0.25;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub length: usize,
    pub start_pitch: Token,
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub melody_temperature: f64,
    pub rhythm_temperature: f64,
    /// Allowed pitch classes; `None` disables scale enforcement.
    pub scale: Option<PitchClassSet>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            length: 128,
            start_pitch: 60,
            min_pitch: 48,
            max_pitch: 84,
            melody_temperature: 1.0,
            rhythm_temperature: 1.0,
            scale: None,
        }
    }
}

impl GenerationParams {
    /// The pitch range forced into [0, 127] with min <= max.
    fn pitch_range(&self) -> (Token, Token) {
        let low = self.min_pitch.min(MAX_PITCH);
        let high = self.max_pitch.min(MAX_PITCH);
        (Token::from(low.min(high)), Token::from(low.max(high)))
    }
}

pub struct MelodyGenerator<'a> {
    pitch_model: &'a mut SequenceModel,
    rhythm_model: &'a mut RhythmModel,
    history_max: usize,
}

impl<'a> MelodyGenerator<'a> {
    pub fn new(
        pitch_model: &'a mut SequenceModel,
        rhythm_model: &'a mut RhythmModel,
        history_max: usize,
    ) -> Self {
        let history_max = history_max.max(pitch_model.order());
        MelodyGenerator {
            pitch_model,
            rhythm_model,
            history_max,
        }
    }

    pub fn history_max(&self) -> usize {
        self.history_max
    }

    pub fn generate(&mut self, params: &GenerationParams) -> Vec<NoteEvent> {
        if params.length == 0 {
            return Vec::new();
        }

        let (min_pitch, max_pitch) = params.pitch_range();
        let order = self.pitch_model.order();
        let mut pitches: Vec<Token> = vec![params.start_pitch];
        let mut durations: Vec<f64> = Vec::with_capacity(self.history_max + 1);
        let mut notes = Vec::with_capacity(params.length);
        let mut cursor = 0.0;

        for _ in 0..params.length {
            let context = &pitches[pitches.len() - pitches.len().min(order)..];
            let mut pitch = self
                .pitch_model
                .sample_next(context, params.melody_temperature);
            if let Some(scale) = params.scale.as_ref().filter(|s| !s.allows(pitch)) {
                pitch = scale.nearest_allowed_pitch(pitch, min_pitch, max_pitch);
            }
            let pitch = pitch.clamp(min_pitch, max_pitch);

            let mut duration = self
                .rhythm_model
                .sample_next(&durations, params.rhythm_temperature);
            if duration.is_nan() || duration <= 0.0 {
                duration = FALLBACK_DURATION;
            }

            // In range after the clamp above.
            notes.push(NoteEvent::new(pitch as u8, cursor, duration));
            cursor += duration;

            push_bounded(&mut pitches, pitch, self.history_max);
            push_bounded(&mut durations, duration, self.history_max);
        }

        notes
    }
}

fn push_bounded<T>(window: &mut Vec<T>, value: T, max_len: usize) {
    window.push(value);
    if window.len() > max_len {
        let excess = window.len() - max_len;
        window.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{Mode, ModeInstance};
    use crate::rhythm::DEFAULT_UNIT_SCALE;

    fn models(order: usize, seed: u64) -> (SequenceModel, RhythmModel) {
        (
            SequenceModel::with_seed(order, seed),
            RhythmModel::with_seed(order, DEFAULT_UNIT_SCALE, seed + 1),
        )
    }

    #[test]
    fn test_zero_length_is_empty() {
        let (mut pitch, mut rhythm) = models(2, 1);
        let params = GenerationParams {
            length: 0,
            ..GenerationParams::default()
        };
        assert!(MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params).is_empty());
    }

    #[test]
    fn test_history_max_at_least_order() {
        let (mut pitch, mut rhythm) = models(4, 1);
        assert_eq!(MelodyGenerator::new(&mut pitch, &mut rhythm, 2).history_max(), 4);
    }

    #[test]
    fn test_untrained_models_give_clamped_default_and_fallback_duration() {
        let (mut pitch, mut rhythm) = models(2, 1);
        let params = GenerationParams {
            length: 4,
            ..GenerationParams::default()
        };
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        assert_eq!(notes.len(), 4);
        for (i, note) in notes.iter().enumerate() {
            // Token 0 clamped up to the range floor.
            assert_eq!(note.pitch, 48);
            assert_eq!(note.duration, FALLBACK_DURATION);
            assert_eq!(note.start_time, i as f64 * FALLBACK_DURATION);
        }
    }

    #[test]
    fn test_deterministic_cycle_at_zero_temperature() {
        let (mut pitch, mut rhythm) = models(2, 3);
        pitch.train(&[60, 62, 64, 60, 62, 64, 60, 62, 64]);
        rhythm.train(&[0.5, 0.25, 0.25, 0.5, 0.25, 0.25]);
        let params = GenerationParams {
            length: 6,
            melody_temperature: 0.0,
            rhythm_temperature: 0.0,
            ..GenerationParams::default()
        };
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![62, 64, 60, 62, 64, 60]);
        // Empty history: unigram argmax is 0.25; then [0.25] -> 0.25 (2 of 3).
        assert!(notes.iter().all(|n| n.duration == 0.25 || n.duration == 0.5));
        assert_eq!(notes[0].duration, 0.25);
    }

    #[test]
    fn test_start_times_accumulate_and_pitches_stay_in_range() {
        let (mut pitch, mut rhythm) = models(2, 11);
        pitch.train(&[40, 55, 70, 90, 100, 55, 70, 40, 90]);
        rhythm.train(&[0.5, 0.25, 1.0, 0.75, 0.25, 0.5]);
        let params = GenerationParams {
            length: 200,
            melody_temperature: 1.5,
            rhythm_temperature: 1.5,
            ..GenerationParams::default()
        };
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        assert_eq!(notes.len(), 200);
        let mut expected_start = 0.0;
        for note in &notes {
            assert!((48..=84).contains(&note.pitch));
            assert!(note.duration > 0.0);
            assert!((note.start_time - expected_start).abs() < 1e-9);
            expected_start += note.duration;
        }
    }

    #[test]
    fn test_scale_enforcement_snaps_pitches() {
        let (mut pitch, mut rhythm) = models(1, 5);
        pitch.train(&[61, 61, 61]);
        rhythm.train(&[0.5]);
        let c_major = ModeInstance::new(Mode::Ionian, 0).pitch_classes();
        let mut params = GenerationParams {
            length: 5,
            scale: Some(c_major),
            ..GenerationParams::default()
        };
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        assert!(notes.iter().all(|n| n.pitch == 62));

        params.max_pitch = 61;
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        assert!(notes.iter().all(|n| n.pitch == 60));
    }

    #[test]
    fn test_scale_enforcement_with_extreme_tokens() {
        let (mut pitch, mut rhythm) = models(1, 5);
        pitch.train(&[i32::MAX, i32::MAX, i32::MAX]);
        let params = GenerationParams {
            length: 3,
            scale: Some(PitchClassSet::from_classes(&[0])),
            ..GenerationParams::default()
        };
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|n| n.pitch == 84));
    }

    #[test]
    fn test_inverted_range_is_normalized() {
        let (mut pitch, mut rhythm) = models(1, 5);
        pitch.train(&[100, 100]);
        let params = GenerationParams {
            length: 3,
            min_pitch: 72,
            max_pitch: 60,
            ..GenerationParams::default()
        };
        let notes = MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&params);
        assert!(notes.iter().all(|n| n.pitch == 72));
    }

    #[test]
    fn test_same_seeds_same_melody() {
        let run = || {
            let (mut pitch, mut rhythm) = models(2, 77);
            pitch.train(&[60, 62, 64, 65, 67, 65, 64, 62, 60, 67, 64]);
            rhythm.train(&[0.5, 0.25, 0.25, 1.0, 0.5, 0.5, 0.25]);
            MelodyGenerator::new(&mut pitch, &mut rhythm, 8).generate(&GenerationParams {
                length: 64,
                ..GenerationParams::default()
            })
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_push_bounded_evicts_oldest() {
        let mut window = vec![1, 2, 3];
        push_bounded(&mut window, 4, 3);
        assert_eq!(window, vec![2, 3, 4]);
        push_bounded(&mut window, 5, 1);
        assert_eq!(window, vec![5]);
    }
}
