// Standard MIDI File decoding into timed note events.
//
// Reads every track of an SMF, collects note-on/note-off occurrences and
// set-tempo meta events on a global tick axis, pairs ons with offs per
// pitch (FIFO, so overlapping same-pitch notes stack oldest-first), and
// converts ticks to seconds through a `TempoMap`.
//
// The decoder never fails. Malformed input degrades to a partial result:
// - bad magic or truncated header: no notes
// - SMPTE or zero division: fall back to 480 ticks per quarter
// - wrong chunk id: decoded as a track anyway
// - running status before any status byte, truncated events, overlong
//   variable-length quantities: the rest of that track is dropped
// - note-off without a sounding note: ignored
// - set-tempo of zero microseconds per quarter: ignored
// Each recovered condition is recorded as a `Diagnostic` on the result and
// logged at warn level.
//
// Running status follows the byte stream literally: every status byte,
// including meta (0xFF) and sysex (0xF0/0xF7), becomes the running status.

use crate::note::NoteEvent;
use crate::tempo::TempoMap;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use thiserror::Error;

/// Ticks per quarter used when the header's division is unusable.
pub const DEFAULT_TICKS_PER_QUARTER: u16 = 480;

const HEADER_MAGIC: &[u8] = b"MThd";
const TRACK_MAGIC: &[u8] = b"MTrk";
const META_STATUS: u8 = 0xFF;
const META_SET_TEMPO: u8 = 0x51;

/// A recovered problem in the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("could not read file: {0}")]
    Unreadable(String),

    #[error("not a MIDI file (MThd missing)")]
    NotMidi,

    #[error("truncated header")]
    TruncatedHeader,

    #[error("SMPTE time division is not supported; using {DEFAULT_TICKS_PER_QUARTER} ticks per quarter")]
    SmpteDivision,

    #[error("division is zero; using {DEFAULT_TICKS_PER_QUARTER} ticks per quarter")]
    ZeroDivision,

    #[error("track {track}: expected MTrk chunk, got {id:?}")]
    UnexpectedChunk { track: usize, id: String },

    #[error("track {track}: unexpected end of file before chunk header")]
    MissingTrack { track: usize },

    #[error("track {track}: declared length {declared} exceeds the {available} bytes left")]
    TrackLengthOverrun {
        track: usize,
        declared: u32,
        available: usize,
    },

    #[error("track {track}: running status used before any status byte; skipping rest of track")]
    RunningStatusWithoutStatus { track: usize },

    #[error("track {track}: event truncated at byte {offset}; skipping rest of track")]
    TruncatedEvent { track: usize, offset: usize },

    #[error("track {track}: variable-length quantity longer than 4 bytes at byte {offset}; skipping rest of track")]
    OverlongQuantity { track: usize, offset: usize },

    #[error("track {track}: zero tempo at tick {tick} ignored")]
    ZeroTempo { track: usize, tick: u64 },
}

/// Result of decoding one file.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    /// Notes sorted by start time.
    pub notes: Vec<NoteEvent>,
    /// Ticks per quarter actually used for time conversion.
    pub ticks_per_quarter: u16,
    pub diagnostics: Vec<Diagnostic>,
}

impl Decoded {
    fn report(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }
}

/// Why a variable-length quantity could not be read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    #[error("input ended inside a variable-length quantity")]
    Truncated,
    #[error("variable-length quantity longer than 4 bytes")]
    Overlong,
}

/// Decode a big-endian base-128 quantity (at most 4 bytes, 28 bits).
/// Returns the value and the number of bytes consumed.
pub fn decode_quantity(bytes: &[u8]) -> Result<(u32, usize), QuantityError> {
    let mut value = 0u32;
    for i in 0..4 {
        let byte = *bytes.get(i).ok_or(QuantityError::Truncated)?;
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(QuantityError::Overlong)
}

/// Read and decode a file. An unreadable file yields an empty result with
/// a `Diagnostic::Unreadable`.
pub fn decode_file(path: &Path) -> Decoded {
    match std::fs::read(path) {
        Ok(bytes) => decode(&bytes),
        Err(e) => {
            let mut out = Decoded {
                ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
                ..Decoded::default()
            };
            out.report(Diagnostic::Unreadable(format!("{}: {e}", path.display())));
            out
        }
    }
}

/// Decode an in-memory SMF.
pub fn decode(bytes: &[u8]) -> Decoded {
    let mut out = Decoded {
        ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
        ..Decoded::default()
    };
    let mut reader = ByteReader::new(bytes);

    if reader.take(4) != Some(HEADER_MAGIC) {
        out.report(Diagnostic::NotMidi);
        return out;
    }

    let Some((format, track_count, division)) = read_header(&mut reader) else {
        out.report(Diagnostic::TruncatedHeader);
        return out;
    };

    if division & 0x8000 != 0 {
        out.report(Diagnostic::SmpteDivision);
    } else if division == 0 {
        out.report(Diagnostic::ZeroDivision);
    } else {
        out.ticks_per_quarter = division;
    }
    log::debug!(
        "SMF format {format}, {track_count} tracks, {} ticks per quarter",
        out.ticks_per_quarter
    );

    let mut collector = EventCollector::default();
    for track in 0..usize::from(track_count) {
        let Some((id, declared)) = read_chunk_header(&mut reader) else {
            out.report(Diagnostic::MissingTrack { track });
            break;
        };
        if id != TRACK_MAGIC {
            out.report(Diagnostic::UnexpectedChunk {
                track,
                id: String::from_utf8_lossy(id).into_owned(),
            });
        }

        let available = reader.remaining();
        let length = if declared as usize > available {
            out.report(Diagnostic::TrackLengthOverrun {
                track,
                declared,
                available,
            });
            available
        } else {
            declared as usize
        };
        let payload = reader.take(length).unwrap_or_default();

        let result = collector.decode_track(track, payload);
        for warning in collector.warnings.drain(..) {
            out.report(warning);
        }
        if let Err(diagnostic) = result {
            out.report(diagnostic);
        }
    }

    out.notes = collector.into_notes(out.ticks_per_quarter);
    out
}

/// Header body: format, track count, division.
fn read_header(reader: &mut ByteReader) -> Option<(u16, u16, u16)> {
    let length = reader.be_u32()?;
    let format = reader.be_u16()?;
    let track_count = reader.be_u16()?;
    let division = reader.be_u16()?;
    // Longer headers carry fields we don't read.
    reader.skip(length.saturating_sub(6) as usize)?;
    Some((format, track_count, division))
}

/// Chunk id and declared payload length.
fn read_chunk_header<'a>(reader: &mut ByteReader<'a>) -> Option<(&'a [u8], u32)> {
    let id = reader.take(4)?;
    let length = reader.be_u32()?;
    Some((id, length))
}

/// Next data byte: the byte that arrived in place of a status byte, if
/// still unconsumed, else the next byte of the stream.
fn next_data(
    pending: &mut Option<u8>,
    reader: &mut ByteReader,
    track: usize,
) -> Result<u8, Diagnostic> {
    pending
        .take()
        .or_else(|| reader.u8())
        .ok_or(Diagnostic::TruncatedEvent {
            track,
            offset: reader.pos,
        })
}

fn quantity_diagnostic(error: QuantityError, track: usize, offset: usize) -> Diagnostic {
    match error {
        QuantityError::Truncated => Diagnostic::TruncatedEvent { track, offset },
        QuantityError::Overlong => Diagnostic::OverlongQuantity { track, offset },
    }
}

/// One note-on or note-off on the global tick axis.
#[derive(Debug, Clone, Copy)]
struct RawNote {
    tick: u64,
    track: usize,
    seq: u64,
    pitch: u8,
    on: bool,
}

/// Accumulates note and tempo events across all tracks of one file.
#[derive(Default)]
struct EventCollector {
    notes: Vec<RawNote>,
    tempos: Vec<(u64, u32)>,
    next_seq: u64,
    /// Recovered problems that did not end the current track.
    warnings: Vec<Diagnostic>,
}

impl EventCollector {
    /// Decode one track payload. On `Err` the events before the failure
    /// have already been kept.
    fn decode_track(&mut self, track: usize, payload: &[u8]) -> Result<(), Diagnostic> {
        let mut reader = ByteReader::new(payload);
        let mut tick = 0u64;
        let mut running_status: Option<u8> = None;

        let truncated = |offset: usize| Diagnostic::TruncatedEvent { track, offset };

        while reader.remaining() > 0 {
            let delta = reader.track_quantity(track)?;
            tick += u64::from(delta);

            let first = reader.u8().ok_or_else(|| truncated(reader.pos))?;
            let (status, mut pending) = if first & 0x80 != 0 {
                running_status = Some(first);
                (first, None)
            } else {
                let status =
                    running_status.ok_or(Diagnostic::RunningStatusWithoutStatus { track })?;
                (status, Some(first))
            };

            match status {
                META_STATUS => {
                    let meta_type = next_data(&mut pending, &mut reader, track)?;
                    let length = reader.track_quantity(track)?;
                    let body = reader
                        .take(length as usize)
                        .ok_or_else(|| truncated(reader.pos))?;
                    if meta_type == META_SET_TEMPO && body.len() == 3 {
                        let micros = u32::from(body[0]) << 16
                            | u32::from(body[1]) << 8
                            | u32::from(body[2]);
                        if micros == 0 {
                            self.warnings.push(Diagnostic::ZeroTempo { track, tick });
                        } else {
                            self.tempos.push((tick, micros));
                        }
                    }
                }
                0xF0 | 0xF7 => {
                    // A running-status data byte is a complete one-byte length.
                    let length = match pending.take() {
                        Some(byte) => u32::from(byte),
                        None => reader.track_quantity(track)?,
                    };
                    reader
                        .skip(length as usize)
                        .ok_or_else(|| truncated(reader.pos))?;
                }
                _ => match status & 0xF0 {
                    0x80 | 0x90 => {
                        let pitch = next_data(&mut pending, &mut reader, track)?;
                        let velocity = next_data(&mut pending, &mut reader, track)?;
                        self.notes.push(RawNote {
                            tick,
                            track,
                            seq: self.next_seq,
                            pitch,
                            on: status & 0xF0 == 0x90 && velocity > 0,
                        });
                        self.next_seq += 1;
                    }
                    nibble => {
                        let arity = if nibble == 0xC0 || nibble == 0xD0 { 1 } else { 2 };
                        for _ in 0..arity {
                            next_data(&mut pending, &mut reader, track)?;
                        }
                    }
                },
            }
        }
        Ok(())
    }

    /// Pair ons with offs and convert to seconds.
    fn into_notes(mut self, ticks_per_quarter: u16) -> Vec<NoteEvent> {
        self.notes.sort_by_key(|n| (n.tick, n.track, n.seq));
        let tempo_map = TempoMap::new(&self.tempos, ticks_per_quarter);

        let mut sounding: BTreeMap<u8, VecDeque<u64>> = BTreeMap::new();
        let mut notes = Vec::with_capacity(self.notes.len() / 2);
        for raw in &self.notes {
            let queue = sounding.entry(raw.pitch).or_default();
            if raw.on {
                queue.push_back(raw.tick);
            } else if let Some(start_tick) = queue.pop_front() {
                let start = tempo_map.tick_to_seconds(start_tick);
                let end = tempo_map.tick_to_seconds(raw.tick.max(start_tick));
                notes.push(NoteEvent::new(raw.pitch, start, end - start));
            }
        }

        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        notes
    }
}

/// Bounds-checked big-endian cursor over a byte slice.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn be_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn be_u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn quantity(&mut self) -> Result<u32, QuantityError> {
        let (value, used) = decode_quantity(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    /// `quantity`, with a failure reported against `track` at the
    /// quantity's first byte.
    fn track_quantity(&mut self, track: usize) -> Result<u32, Diagnostic> {
        let offset = self.pos;
        self.quantity().map_err(|e| quantity_diagnostic(e, track, offset))
    }
}
