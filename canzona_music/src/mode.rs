// Scale enforcement for generated melodies.
//
// A PitchClassSet is the set of pitch classes (0 = C .. 11 = B) a melody
// may use. It is built from a named mode on a tonic ("d-dorian", "a-minor")
// or from an explicit list of classes ("0,2,4,5,7,9,11"). An empty set
// places no restriction.
//
// `nearest_allowed_pitch` first clamps the pitch into the pitch range, then
// moves it to the closest allowed pitch inside the range, searching distance
// 0..=12 and trying the upward candidate before the downward one at each
// distance. If nothing within an octave qualifies the clamped pitch is kept.
//
// Used by generator.rs after each pitch is sampled.

use crate::error::MusicError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Furthest distance, in semitones, searched for an allowed pitch.
const SEARCH_SEMITONES: i32 = 12;

/// The diatonic modes, each defined by its interval pattern from the tonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Major scale.
    Ionian,
    Dorian,
    Phrygian,
    /// Raised 4th.
    Lydian,
    /// Major with lowered 7th.
    Mixolydian,
    /// Natural minor.
    Aeolian,
    Locrian,
}

impl Mode {
    /// Semitone intervals from the tonic to each scale degree.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            Mode::Ionian => [0, 2, 4, 5, 7, 9, 11],
            Mode::Dorian => [0, 2, 3, 5, 7, 9, 10],
            Mode::Phrygian => [0, 1, 3, 5, 7, 8, 10],
            Mode::Lydian => [0, 2, 4, 6, 7, 9, 11],
            Mode::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
            Mode::Aeolian => [0, 2, 3, 5, 7, 8, 10],
            Mode::Locrian => [0, 1, 3, 5, 6, 8, 10],
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let mode = match name {
            "ionian" | "major" => Mode::Ionian,
            "dorian" => Mode::Dorian,
            "phrygian" => Mode::Phrygian,
            "lydian" => Mode::Lydian,
            "mixolydian" => Mode::Mixolydian,
            "aeolian" | "minor" => Mode::Aeolian,
            "locrian" => Mode::Locrian,
            _ => return None,
        };
        Some(mode)
    }
}

/// A mode on a specific tonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInstance {
    pub mode: Mode,
    /// Pitch class of the tonic (0 = C, 2 = D, 4 = E, etc.)
    pub tonic_pc: u8,
}

impl ModeInstance {
    pub fn new(mode: Mode, tonic_pc: u8) -> Self {
        ModeInstance {
            mode,
            tonic_pc: tonic_pc % 12,
        }
    }

    pub fn pitch_classes(&self) -> PitchClassSet {
        let mut set = PitchClassSet::default();
        for interval in self.mode.intervals() {
            set.insert(i32::from(self.tonic_pc + interval));
        }
        set
    }
}

impl FromStr for ModeInstance {
    type Err = MusicError;

    /// `<tonic>-<mode>`, e.g. `c-ionian`, `f#-lydian`, `bb-major`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (tonic, mode) = lower
            .split_once('-')
            .ok_or_else(|| MusicError::Config(format!("scale '{s}' is not <tonic>-<mode>")))?;
        let tonic_pc = tonic_pitch_class(tonic)
            .ok_or_else(|| MusicError::Config(format!("unknown tonic '{tonic}' in scale '{s}'")))?;
        let mode = Mode::from_name(mode)
            .ok_or_else(|| MusicError::Config(format!("unknown mode '{mode}' in scale '{s}'")))?;
        Ok(ModeInstance::new(mode, tonic_pc))
    }
}

fn tonic_pitch_class(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let base = match chars.next()? {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };
    let shift: i32 = match chars.as_str() {
        "" => 0,
        "#" | "s" | "sharp" => 1,
        "b" | "flat" => -1,
        _ => return None,
    };
    Some((base + shift).rem_euclid(12) as u8)
}

/// Allowed pitch classes, indexed 0..12.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchClassSet([bool; 12]);

impl PitchClassSet {
    /// Classes given as any integers; each is reduced mod 12.
    pub fn from_classes(classes: &[i32]) -> Self {
        let mut set = PitchClassSet::default();
        for &pc in classes {
            set.insert(pc);
        }
        set
    }

    pub fn insert(&mut self, pitch: i32) {
        self.0[pitch.rem_euclid(12) as usize] = true;
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|&allowed| allowed)
    }

    /// Whether `pitch` may be used. Everything is allowed by an empty set.
    pub fn allows(&self, pitch: i32) -> bool {
        self.is_empty() || self.0[pitch.rem_euclid(12) as usize]
    }

    /// The allowed pitch nearest `pitch` within `[min_pitch, max_pitch]`.
    /// At equal distance the higher pitch wins. Falls back to the clamped
    /// pitch when no allowed pitch lies within an octave of it.
    pub fn nearest_allowed_pitch(&self, pitch: i32, min_pitch: i32, max_pitch: i32) -> i32 {
        let pitch = pitch.max(min_pitch).min(max_pitch);
        if self.is_empty() {
            return pitch;
        }
        for distance in 0..=SEARCH_SEMITONES {
            let up = pitch.saturating_add(distance);
            if up <= max_pitch && self.allows(up) {
                return up;
            }
            let down = pitch.saturating_sub(distance);
            if down >= min_pitch && self.allows(down) {
                return down;
            }
        }
        pitch
    }
}

impl FromStr for PitchClassSet {
    type Err = MusicError;

    /// A mode name (`d-dorian`) or a comma-separated class list (`0,2,4,7,9`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
            let classes = s
                .split(',')
                .map(|part| part.trim().parse::<i32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MusicError::Config(format!("bad pitch class list '{s}': {e}")))?;
            Ok(PitchClassSet::from_classes(&classes))
        } else {
            Ok(s.parse::<ModeInstance>()?.pitch_classes())
        }
    }
}
