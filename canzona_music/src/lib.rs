// Canzona melody generator
//
// Learns melodic and rhythmic habits from a corpus of Standard MIDI Files
// and generates new single-voice melodies in the same style. Pitches are
// modelled by a variable-order Markov chain with backoff; durations are
// quantized to a grid inferred from the corpus and modelled by a second
// chain. Sampling temperature trades faithfulness for variety.
//
// Architecture:
// - note.rs: NoteEvent (pitch + start/duration in seconds), pitch names
// - tempo.rs: Tempo map for tick -> seconds conversion across tempo changes
// - midi_parse.rs: Tolerant SMF decoder (partial results + diagnostics)
// - midi.rs: SMF encoder for generated melodies (via midly)
// - markov.rs: Variable-order Markov model over integer tokens
// - rhythm.rs: Duration quantization wrapped around a Markov model
// - mode.rs: Scales as pitch-class sets, nearest-allowed-pitch snapping
// - generator.rs: Melody generation from a pitch model and a rhythm model
// - corpus.rs: MIDI directory scanning, text import/export of sequences
// - report.rs: Model statistics for the console summary
// - config.rs: Pipeline settings (JSON-loadable) and JSON helpers
// - error.rs: MusicError
//
// Generation is deterministic given a seed, supporting reproducible output.

pub mod config;
pub mod corpus;
pub mod error;
pub mod generator;
pub mod markov;
pub mod midi;
pub mod midi_parse;
pub mod mode;
pub mod note;
pub mod report;
pub mod rhythm;
pub mod tempo;
