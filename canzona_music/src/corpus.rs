// Training corpus: MIDI directory scanning and plain-text sequences.
//
// The pipeline decodes every .mid/.midi file in one directory into
// per-file text (`<stem>.txt` holding pitches, `<stem>_dur.txt` holding
// durations in seconds), then trains from those text directories, so a
// corpus can be edited or extended by hand between runs.
//
// Text files are whitespace-separated numbers, read the way formatted
// stream extraction reads them: each value is the longest numeric prefix at
// the cursor, so `62.5` yields the pitch 62 and the read then stops at
// `.5`. Reading stops at the first position holding no number, and at the
// first non-finite duration; everything before it is kept. Pitches outside
// 0..=127 are dropped.
//
// Directories are scanned non-recursively in file-name order, so training
// order (and therefore sampling with a fixed seed) is stable across runs.

use crate::error::MusicError;
use crate::markov::Token;
use crate::midi_parse::{Decoded, decode_file};
use crate::note::{MAX_PITCH, NoteEvent, durations, pitch_tokens};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const MELODY_EXTENSION: &str = "txt";
const DURATION_SUFFIX: &str = "_dur";

/// Training sequences, one entry per source piece.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub melodies: Vec<Vec<Token>>,
    pub durations: Vec<Vec<f64>>,
}

impl Corpus {
    /// Pitch and duration sequences taken directly from decoded notes.
    /// Empty pieces are left out.
    pub fn from_notes<'a, I>(pieces: I) -> Self
    where
        I: IntoIterator<Item = &'a [NoteEvent]>,
    {
        let mut corpus = Corpus::default();
        for notes in pieces {
            if !notes.is_empty() {
                corpus.melodies.push(pitch_tokens(notes));
                corpus.durations.push(durations(notes));
            }
        }
        corpus
    }

    pub fn is_empty(&self) -> bool {
        self.melodies.is_empty() && self.durations.is_empty()
    }

    pub fn melody_tokens(&self) -> usize {
        self.melodies.iter().map(Vec::len).sum()
    }
}

/// One decoded MIDI file.
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub path: PathBuf,
    pub stem: String,
    pub decoded: Decoded,
}

/// Regular files in `dir` with one of `extensions` (case-insensitive),
/// sorted by file name. A missing directory gives an empty list.
fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, MusicError> {
    if !dir.is_dir() {
        log::warn!("directory {} does not exist; nothing to read", dir.display());
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| MusicError::io(dir, e))? {
        let path = entry.map_err(|e| MusicError::io(dir, e))?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The MIDI files of a corpus directory, sorted by file name.
pub fn midi_files(dir: &Path) -> Result<Vec<PathBuf>, MusicError> {
    list_files(dir, &["mid", "midi"])
}

/// Decode every MIDI file in `dir`. Malformed files still appear, with
/// whatever notes could be recovered and their diagnostics.
pub fn decode_directory(dir: &Path) -> Result<Vec<DecodedFile>, MusicError> {
    let files = midi_files(dir)?;
    let mut out = Vec::with_capacity(files.len());
    for path in files {
        let decoded = decode_file(&path);
        log::debug!(
            "decoded {}: {} notes, {} diagnostics",
            path.display(),
            decoded.notes.len(),
            decoded.diagnostics.len()
        );
        out.push(DecodedFile {
            stem: file_stem(&path),
            path,
            decoded,
        });
    }
    Ok(out)
}

pub fn melody_text_path(melody_dir: &Path, stem: &str) -> PathBuf {
    melody_dir.join(format!("{stem}.{MELODY_EXTENSION}"))
}

pub fn duration_text_path(duration_dir: &Path, stem: &str) -> PathBuf {
    duration_dir.join(format!("{stem}{DURATION_SUFFIX}.{MELODY_EXTENSION}"))
}

fn join_values<T: std::fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    let mut text = String::new();
    for value in values {
        if !text.is_empty() {
            text.push(' ');
        }
        let _ = write!(text, "{value}");
    }
    text.push('\n');
    text
}

fn write_text(path: &Path, text: &str) -> Result<(), MusicError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MusicError::io(parent, e))?;
    }
    fs::write(path, text).map_err(|e| MusicError::io(path, e))
}

/// Write the notes' pitches as one line of text.
pub fn write_melody_text(notes: &[NoteEvent], path: &Path) -> Result<(), MusicError> {
    write_text(path, &join_values(notes.iter().map(|n| n.pitch)))
}

/// Write the notes' durations as one line of text.
pub fn write_duration_text(notes: &[NoteEvent], path: &Path) -> Result<(), MusicError> {
    write_text(path, &join_values(notes.iter().map(|n| n.duration)))
}

/// Export a decoded file as `<stem>.txt` and `<stem>_dur.txt`.
pub fn export_text(
    file: &DecodedFile,
    melody_dir: &Path,
    duration_dir: &Path,
) -> Result<(), MusicError> {
    write_melody_text(&file.decoded.notes, &melody_text_path(melody_dir, &file.stem))?;
    write_duration_text(&file.decoded.notes, &duration_text_path(duration_dir, &file.stem))
}

/// Length of the `[+-]digits` run at the start of `s`, 0 if none.
fn integer_prefix(s: &str) -> usize {
    let bytes = s.as_bytes();
    let sign = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let digits = leading_digits(&bytes[sign..]);
    if digits == 0 { 0 } else { sign + digits }
}

/// Length of the decimal number (optional sign, fraction and exponent) at
/// the start of `s`, 0 if none. `inf` and `nan` are not numbers here.
fn real_prefix(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let whole = leading_digits(&bytes[end..]);
    end += whole;
    let mut fraction = 0;
    if bytes.get(end) == Some(&b'.') {
        fraction = leading_digits(&bytes[end + 1..]);
        end += 1 + fraction;
    }
    if whole + fraction == 0 {
        return 0;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let digits = leading_digits(&bytes[exponent..]);
        if digits > 0 {
            end = exponent + digits;
        }
    }
    end
}

fn leading_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Values read one numeric prefix at a time until the text holds no more
/// numbers or a value does not fit `T`.
fn scan_values<T: std::str::FromStr>(text: &str, prefix_len: fn(&str) -> usize) -> Vec<T> {
    let mut values = Vec::new();
    let mut rest = text.trim_start();
    loop {
        let len = prefix_len(rest);
        if len == 0 {
            break;
        }
        let Ok(value) = rest[..len].parse() else {
            break;
        };
        values.push(value);
        rest = rest[len..].trim_start();
    }
    values
}

/// Pitches from melody text. Out-of-range pitches are skipped.
pub fn parse_melody_text(text: &str) -> Vec<Token> {
    let mut pitches: Vec<Token> = scan_values(text, integer_prefix);
    pitches.retain(|p| (0..=Token::from(MAX_PITCH)).contains(p));
    pitches
}

/// Durations from duration text, up to the first non-finite value.
pub fn parse_duration_text(text: &str) -> Vec<f64> {
    scan_values::<f64>(text, real_prefix)
        .into_iter()
        .take_while(|d| d.is_finite())
        .collect()
}

fn read_text(path: &Path) -> Result<String, MusicError> {
    fs::read_to_string(path).map_err(|e| MusicError::io(path, e))
}

/// Read melody files from `melody_dir` and their duration files from
/// `duration_dir`. Files whose stem contains `_dur` are not melodies.
/// Empty sequences are dropped.
pub fn load_text_corpus(melody_dir: &Path, duration_dir: &Path) -> Result<Corpus, MusicError> {
    let mut corpus = Corpus::default();
    for path in list_files(melody_dir, &[MELODY_EXTENSION])? {
        let stem = file_stem(&path);
        if stem.contains(DURATION_SUFFIX) {
            continue;
        }
        let melody = parse_melody_text(&read_text(&path)?);
        if !melody.is_empty() {
            corpus.melodies.push(melody);
        }

        let duration_path = duration_text_path(duration_dir, &stem);
        if duration_path.is_file() {
            let durations = parse_duration_text(&read_text(&duration_path)?);
            if !durations.is_empty() {
                corpus.durations.push(durations);
            }
        }
    }
    Ok(corpus)
}

/// Write a generated melody, one `pitch start duration` line per note.
pub fn write_generated_text(notes: &[NoteEvent], path: &Path) -> Result<(), MusicError> {
    let mut text = String::new();
    for note in notes {
        let _ = writeln!(text, "{} {} {}", note.pitch, note.start_time, note.duration);
    }
    write_text(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("canzona-corpus-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_stops_at_first_bad_token() {
        assert_eq!(parse_melody_text("60 62\n64 x 65"), vec![60, 62, 64]);
        assert_eq!(parse_duration_text(" 0.5 0.25\t1e-1 nan? 2"), vec![0.5, 0.25, 0.1]);
        assert!(parse_duration_text("").is_empty());
        assert!(parse_melody_text("  \n").is_empty());
    }

    #[test]
    fn test_parse_reads_numeric_prefixes() {
        // 62 is read, then the read stops at ".5".
        assert_eq!(parse_melody_text("60 62.5 64"), vec![60, 62]);
        // "-3" is its own value, then dropped as out of range.
        assert_eq!(parse_melody_text("+60 62-3 64"), vec![60, 62, 64]);
        assert_eq!(parse_duration_text("0.5 .25 1.e1 2e 3"), vec![0.5, 0.25, 10.0, 2.0]);
        assert_eq!(parse_duration_text("-0.5 1E+1"), vec![-0.5, 10.0]);
    }

    #[test]
    fn test_parse_rejects_non_finite_durations() {
        assert_eq!(parse_duration_text("0.5 inf 0.25"), vec![0.5]);
        assert_eq!(parse_duration_text("0.5 NaN 0.25"), vec![0.5]);
        assert_eq!(parse_duration_text("infinity"), Vec::<f64>::new());
        assert_eq!(parse_duration_text("0.5 1e999 0.25"), vec![0.5]);
    }

    #[test]
    fn test_parse_drops_out_of_range_pitches() {
        assert_eq!(parse_melody_text("60 128 -1 2147483647 0 127"), vec![60, 0, 127]);
        // Too large for a token: the read stops there.
        assert_eq!(parse_melody_text("60 99999999999 62"), vec![60]);
    }

    #[test]
    fn test_from_notes_skips_empty_pieces() {
        let piece = [NoteEvent::new(60, 0.0, 0.5), NoteEvent::new(64, 0.5, 0.25)];
        let corpus = Corpus::from_notes([&piece[..], &[][..]]);
        assert_eq!(corpus.melodies, vec![vec![60, 64]]);
        assert_eq!(corpus.durations, vec![vec![0.5, 0.25]]);
        assert_eq!(corpus.melody_tokens(), 2);
    }

    #[test]
    fn test_text_roundtrip_through_directories() {
        let root = scratch_dir("roundtrip");
        let melody_dir = root.join("melodies");
        let duration_dir = root.join("durations");
        let notes = [
            NoteEvent::new(60, 0.0, 0.5),
            NoteEvent::new(62, 0.5, 0.25),
            NoteEvent::new(64, 0.75, 0.125),
        ];
        write_melody_text(&notes, &melody_text_path(&melody_dir, "b_piece")).unwrap();
        write_duration_text(&notes, &duration_text_path(&duration_dir, "b_piece")).unwrap();
        // A melody without a duration file, sorted ahead of b_piece.
        write_melody_text(&notes[..1], &melody_text_path(&melody_dir, "a_piece")).unwrap();
        // Stray duration-looking file in the melody directory is ignored.
        fs::write(melody_dir.join("c_dur.txt"), "0.5 0.5").unwrap();

        assert_eq!(
            fs::read_to_string(melody_text_path(&melody_dir, "b_piece")).unwrap(),
            "60 62 64\n"
        );
        let corpus = load_text_corpus(&melody_dir, &duration_dir).unwrap();
        assert_eq!(corpus.melodies, vec![vec![60], vec![60, 62, 64]]);
        assert_eq!(corpus.durations, vec![vec![0.5, 0.25, 0.125]]);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let missing = Path::new("/nonexistent-canzona-dir/corpus");
        assert!(midi_files(missing).unwrap().is_empty());
        assert!(load_text_corpus(missing, missing).unwrap().is_empty());
    }

    #[test]
    fn test_midi_files_filtered_and_sorted() {
        let dir = scratch_dir("scan");
        for name in ["b.mid", "a.MIDI", "c.txt", "d.mid.bak"] {
            fs::write(dir.join(name), b"").unwrap();
        }
        fs::create_dir_all(dir.join("nested.mid")).unwrap();
        let names: Vec<String> = midi_files(&dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MIDI", "b.mid"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_generated_text_lines() {
        let dir = scratch_dir("generated");
        let path = dir.join("out").join("generated_seq.txt");
        let notes = [NoteEvent::new(60, 0.0, 0.5), NoteEvent::new(67, 0.5, 0.25)];
        write_generated_text(&notes, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "60 0 0.5\n67 0.5 0.25\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
