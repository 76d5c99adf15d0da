// MIDI output from note sequences.
//
// Converts a list of NoteEvents (seconds) into a Standard MIDI File:
// format 0, one track, one set-tempo meta event at tick 0, then a note-on /
// note-off pair per note, closed by an end-of-track meta event. Seconds map
// to ticks at the configured tempo with round-half-away-from-zero.
//
// Out-of-range settings are clamped, never rejected. The only failure is
// the destination not being writable.
//
// Uses the `midly` crate for MIDI writing.

use crate::error::MusicError;
use crate::note::{MAX_PITCH, NoteEvent};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Largest tick an event can land on (28-bit delta times).
const MAX_TICK: u32 = 0x0FFF_FFFF;

/// Output settings. Any value is accepted; see `clamped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub ticks_per_quarter: u16,
    pub microseconds_per_quarter: u32,
    pub channel: u8,
    pub velocity: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            ticks_per_quarter: 480,
            microseconds_per_quarter: 500_000,
            channel: 0,
            velocity: 90,
        }
    }
}

impl EncoderConfig {
    /// The config with every field forced into its encodable range.
    /// A zero division falls back to 480 ticks per quarter.
    pub fn clamped(&self) -> Self {
        EncoderConfig {
            ticks_per_quarter: match self.ticks_per_quarter {
                0 => 480,
                ppq => ppq.min(0x7FFF),
            },
            microseconds_per_quarter: self.microseconds_per_quarter.clamp(1, 0xFF_FFFF),
            channel: self.channel.min(15),
            velocity: self.velocity.min(127),
        }
    }

    /// Absolute tick for a time in seconds.
    pub fn seconds_to_tick(&self, seconds: f64) -> u32 {
        let ticks = (seconds * 1_000_000.0 * f64::from(self.ticks_per_quarter)
            / f64::from(self.microseconds_per_quarter))
        .round();
        if ticks.is_nan() || ticks <= 0.0 {
            0
        } else {
            ticks.min(f64::from(MAX_TICK)) as u32
        }
    }

    /// Length of one tick in seconds.
    pub fn seconds_per_tick(&self) -> f64 {
        f64::from(self.microseconds_per_quarter) / (1_000_000.0 * f64::from(self.ticks_per_quarter))
    }
}

/// Ordering class of an event sharing a tick with others: meta events go
/// first, ordered among themselves by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventClass {
    Meta { priority: u8 },
    Channel,
}

struct TimedEvent {
    tick: u32,
    class: EventClass,
    kind: TrackEventKind<'static>,
}

/// Encode notes and write them to `path`.
pub fn write_midi(notes: &[NoteEvent], config: &EncoderConfig, path: &Path) -> Result<(), MusicError> {
    let bytes = encode(notes, config)?;
    std::fs::write(path, &bytes).map_err(|e| MusicError::io(path, e))?;
    log::debug!("wrote {} notes ({} bytes) to {}", notes.len(), bytes.len(), path.display());
    Ok(())
}

/// Encode notes into SMF bytes.
pub fn encode(notes: &[NoteEvent], config: &EncoderConfig) -> Result<Vec<u8>, MusicError> {
    let smf = notes_to_smf(notes, config);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)
        .map_err(|e| MusicError::Midi(e.to_string()))?;
    Ok(buf)
}

/// Convert notes to an in-memory single-track SMF.
fn notes_to_smf(notes: &[NoteEvent], config: &EncoderConfig) -> Smf<'static> {
    let config = config.clamped();
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(config.ticks_per_quarter)),
    ));

    let channel = u4::new(config.channel);
    let velocity = u7::new(config.velocity);

    let mut events = Vec::with_capacity(notes.len() * 2 + 1);
    events.push(TimedEvent {
        tick: 0,
        class: EventClass::Meta { priority: 0 },
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(config.microseconds_per_quarter))),
    });

    for note in notes {
        let key = u7::new(note.pitch.min(MAX_PITCH));
        let on_tick = config.seconds_to_tick(note.start_time);
        // Never negative: a note that ends before it starts becomes zero-length.
        let off_tick = config.seconds_to_tick(note.end_time()).max(on_tick);

        events.push(TimedEvent {
            tick: on_tick,
            class: EventClass::Channel,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel: velocity },
            },
        });
        events.push(TimedEvent {
            tick: off_tick,
            class: EventClass::Channel,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff { key, vel: u7::new(0) },
            },
        });
    }

    // Stable, so a note's off stays ahead of a later note's on at the same tick.
    events.sort_by_key(|e| (e.tick, e.class));

    let mut track: Track<'static> = Vec::with_capacity(events.len() + 1);
    let mut last_tick = 0;
    for event in events {
        track.push(TrackEvent {
            delta: u28::new(event.tick - last_tick),
            kind: event.kind,
        });
        last_tick = event.tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi_parse::decode;

    #[test]
    fn test_empty_sequence_layout() {
        let bytes = encode(&[], &EncoderConfig::default()).unwrap();
        assert!(bytes.starts_with(b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x01\xE0MTrk"));
        // Tempo meta at tick 0: 500000 us per quarter.
        assert_eq!(&bytes[22..29], &[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
        assert!(bytes.ends_with(&[0x00, 0xFF, 0x2F, 0x00]));
    }

    #[test]
    fn test_roundtrip_within_one_tick() {
        let config = EncoderConfig::default();
        let notes = vec![
            NoteEvent::new(60, 0.0, 0.5),
            NoteEvent::new(64, 0.5, 0.25),
            NoteEvent::new(67, 0.75, 0.3333),
            NoteEvent::new(72, 1.0833, 1.0),
        ];
        let decoded = decode(&encode(&notes, &config).unwrap());
        assert!(decoded.diagnostics.is_empty());
        assert_eq!(decoded.notes.len(), notes.len());
        let tolerance = config.seconds_per_tick();
        for (original, recovered) in notes.iter().zip(&decoded.notes) {
            assert_eq!(original.pitch, recovered.pitch);
            assert!((original.start_time - recovered.start_time).abs() <= tolerance);
            assert!((original.duration - recovered.duration).abs() <= tolerance);
        }
    }

    #[test]
    fn test_seconds_to_tick_rounds_half_away_from_zero() {
        let config = EncoderConfig::default();
        assert_eq!(config.seconds_to_tick(0.5), 480);
        // One tick per second.
        let coarse = EncoderConfig {
            ticks_per_quarter: 1,
            microseconds_per_quarter: 1_000_000,
            ..EncoderConfig::default()
        };
        assert_eq!(coarse.seconds_to_tick(2.5), 3);
        assert_eq!(coarse.seconds_to_tick(0.5), 1);
        assert_eq!(coarse.seconds_to_tick(2.49), 2);
        assert_eq!(config.seconds_to_tick(-1.0), 0);
        assert_eq!(config.seconds_to_tick(f64::NAN), 0);
        assert_eq!(config.seconds_to_tick(1e12), MAX_TICK);
    }

    #[test]
    fn test_reversed_note_becomes_zero_length() {
        let notes = [NoteEvent::new(60, 1.0, -0.5)];
        let decoded = decode(&encode(&notes, &EncoderConfig::default()).unwrap());
        assert_eq!(decoded.notes.len(), 1);
        assert_eq!(decoded.notes[0].duration, 0.0);
        assert!((decoded.notes[0].start_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_settings_are_clamped() {
        let config = EncoderConfig {
            ticks_per_quarter: 0,
            microseconds_per_quarter: 0x0200_0000,
            channel: 20,
            velocity: 200,
        };
        let clamped = config.clamped();
        assert_eq!(clamped.ticks_per_quarter, 480);
        assert_eq!(clamped.microseconds_per_quarter, 0xFF_FFFF);
        assert_eq!(clamped.channel, 15);
        assert_eq!(clamped.velocity, 127);

        let bytes = encode(&[NoteEvent::new(60, 0.0, 1.0)], &config).unwrap();
        assert!(bytes.windows(3).any(|w| w == [0x9F, 60, 127]));
    }

    #[test]
    fn test_same_pitch_back_to_back_notes_stay_separate() {
        let notes = [NoteEvent::new(62, 0.0, 0.5), NoteEvent::new(62, 0.5, 0.5)];
        let decoded = decode(&encode(&notes, &EncoderConfig::default()).unwrap());
        assert_eq!(decoded.notes.len(), 2);
        assert!((decoded.notes[0].duration - 0.5).abs() < 1e-9);
        assert!((decoded.notes[1].start_time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unwritable_destination_fails() {
        let path = Path::new("/nonexistent-canzona-dir/out.mid");
        let result = write_midi(&[NoteEvent::new(60, 0.0, 1.0)], &EncoderConfig::default(), path);
        assert!(matches!(result, Err(MusicError::Io { .. })));
    }
}
