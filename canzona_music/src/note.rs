// The note event shared by the decoder, the generator, and the encoder.
//
// Times are real-valued seconds. The decoder produces events sorted by
// start time; the generator produces them in generation order, which is
// also non-decreasing in start time.

use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

/// One sounding note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch number (0-127).
    pub pitch: u8,
    /// Onset in seconds from the start of the piece.
    pub start_time: f64,
    /// Length in seconds.
    pub duration: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, start_time: f64, duration: f64) -> Self {
        NoteEvent {
            pitch: pitch.min(MAX_PITCH),
            start_time,
            duration,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Pitch tokens of a note sequence, in order.
pub fn pitch_tokens(notes: &[NoteEvent]) -> Vec<i32> {
    notes.iter().map(|n| i32::from(n.pitch)).collect()
}

/// Durations of a note sequence, in order.
pub fn durations(notes: &[NoteEvent]) -> Vec<f64> {
    notes.iter().map(|n| n.duration).collect()
}

const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Scientific pitch name, with middle C (60) as C4.
pub fn pitch_name(pitch: i32) -> String {
    let class = PITCH_CLASS_NAMES[pitch.rem_euclid(12) as usize];
    format!("{class}{}", pitch.div_euclid(12) - 1)
}

/// A pitch given as a MIDI number (`60`) or a note name (`C4`, `f#3`, `Bb-1`).
pub fn parse_pitch(text: &str) -> Option<i32> {
    let text = text.trim();
    if let Ok(number) = text.parse::<i32>() {
        return Some(number);
    }
    let mut chars = text.chars();
    let class = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (shift, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };
    let octave: i32 = octave.parse().ok()?;
    Some((octave + 1) * 12 + class + shift)
}
