// Canzona melody generator: CLI entry point.
//
// Trains a pitch model and a rhythm model on a directory of MIDI files and
// writes one generated melody as text and as MIDI. The pipeline:
// decode MIDI → export text → load text → train → report → generate → write.
// With --load-models the first four steps are replaced by loading saved
// model snapshots.
//
// Usage:
//   cargo run -p canzona_music -- [--config FILE] [--midi-dir DIR] [--out DIR]
//     [--length N] [--order N] [--seed N] [--temperature T] [--scale SCALE] ...
//
// See `print_usage` for the full flag list.

use canzona_music::config::PipelineConfig;
use canzona_music::corpus::{
    Corpus, decode_directory, export_text, load_text_corpus, write_generated_text,
};
use canzona_music::error::MusicError;
use canzona_music::generator::MelodyGenerator;
use canzona_music::markov::SequenceModel;
use canzona_music::midi::write_midi;
use canzona_music::note::{parse_pitch, pitch_name};
use canzona_music::report::ModelReport;
use canzona_music::rhythm::RhythmModel;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

const MELODY_MODEL_FILE: &str = "melody_model.json";
const RHYTHM_MODEL_FILE: &str = "rhythm_model.json";

struct Options {
    config: PipelineConfig,
    save_models: Option<PathBuf>,
    load_models: Option<PathBuf>,
    verbose: bool,
}

/// Minimal stderr backend for the `log` facade.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let options = parse_args();
    init_logging(options.verbose);

    if let Err(e) = run(&options) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), MusicError> {
    let config = &options.config;
    let params = config.generation_params()?;

    println!("=== Canzona Melody Generator ===");
    println!("Markov order: {} (history max {})", config.markov_order, config.history_max);
    println!(
        "Length: {} notes from {} in [{}, {}]",
        params.length,
        pitch_name(params.start_pitch),
        pitch_name(i32::from(params.min_pitch)),
        pitch_name(i32::from(params.max_pitch))
    );
    println!(
        "Temperature: melody {}, rhythm {}",
        params.melody_temperature, params.rhythm_temperature
    );
    if params.scale.is_some() {
        println!("Scale: {}", config.scale);
    }
    if let Some(s) = config.seed {
        println!("Seed: {s}");
    }
    println!();

    let (mut melody, mut rhythm, corpus, train_ms) = match &options.load_models {
        Some(dir) => {
            println!("[1/6] Loading models from {}...", dir.display());
            let melody = SequenceModel::load(&dir.join(MELODY_MODEL_FILE), config.seed)?;
            let rhythm = RhythmModel::load(&dir.join(RHYTHM_MODEL_FILE), config.rhythm_seed())?;
            println!("  Loaded. Skipping corpus decoding and training.");
            (melody, rhythm, Corpus::default(), 0)
        }
        None => {
            let corpus = build_corpus(config)?;
            let started = Instant::now();
            let (melody, rhythm) = train(config, &corpus);
            let train_ms = started.elapsed().as_millis();
            println!("  Training time: {train_ms} ms");
            if let Some(dir) = &options.save_models {
                std::fs::create_dir_all(dir).map_err(|e| MusicError::io(dir, e))?;
                melody.save(&dir.join(MELODY_MODEL_FILE))?;
                rhythm.save(&dir.join(RHYTHM_MODEL_FILE))?;
                println!("  Saved models to {}", dir.display());
            }
            (melody, rhythm, corpus, train_ms)
        }
    };

    println!("[4/6] Model metrics");
    println!("{}", ModelReport::compute(&melody, &rhythm, &corpus));

    println!("[5/6] Generating melody (length = {})...", params.length);
    let started = Instant::now();
    let notes = MelodyGenerator::new(&mut melody, &mut rhythm, config.history_max).generate(&params);
    let generate_ms = started.elapsed().as_millis();
    let total_seconds = notes.last().map_or(0.0, |n| n.end_time());
    println!("  Generated {} notes ({total_seconds:.1}s) in {generate_ms} ms", notes.len());

    println!("[6/6] Writing output to {}...", config.output_dir.display());
    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| MusicError::io(&config.output_dir, e))?;
    let text_path = config.generated_text_path();
    write_generated_text(&notes, &text_path)?;
    println!("  Wrote generated sequence -> {}", text_path.display());

    let midi_path = config.generated_midi_path();
    let started = Instant::now();
    write_midi(&notes, &config.encoder_config(), &midi_path)?;
    let write_ms = started.elapsed().as_millis();
    let size = std::fs::metadata(&midi_path).map(|m| m.len()).unwrap_or(0);
    println!("  Wrote MIDI -> {} ({size} bytes)", midi_path.display());

    println!();
    println!("Timings (ms): train={train_ms}, generate={generate_ms}, write_mid={write_ms}");
    println!("Play with: timidity {} (or any MIDI player)", midi_path.display());
    Ok(())
}

/// Decode the MIDI directory to text, then read the text corpus back.
fn build_corpus(config: &PipelineConfig) -> Result<Corpus, MusicError> {
    println!("[1/6] Decoding MIDI files in {}...", config.midi_dir.display());
    let started = Instant::now();
    let files = decode_directory(&config.midi_dir)?;
    let mut total_notes = 0;
    for file in &files {
        export_text(file, &config.melody_dir, &config.duration_dir)?;
        total_notes += file.decoded.notes.len();
        match file.decoded.diagnostics.len() {
            0 => println!("  Processed: {} ({} notes)", file.stem, file.decoded.notes.len()),
            n => println!(
                "  Processed: {} ({} notes, {n} problems recovered)",
                file.stem,
                file.decoded.notes.len()
            ),
        }
    }
    println!(
        "  {} files, {total_notes} notes in {} ms",
        files.len(),
        started.elapsed().as_millis()
    );

    println!("[2/6] Loading training sequences from text...");
    let corpus = load_text_corpus(&config.melody_dir, &config.duration_dir)?;
    println!("  Melody sequences: {}", corpus.melodies.len());
    println!("  Duration sequences: {}", corpus.durations.len());
    Ok(corpus)
}

fn train(config: &PipelineConfig, corpus: &Corpus) -> (SequenceModel, RhythmModel) {
    println!("[3/6] Training melody and rhythm models...");
    let (mut melody, mut rhythm) = match (config.seed, config.rhythm_seed()) {
        (Some(melody_seed), Some(rhythm_seed)) => (
            SequenceModel::with_seed(config.markov_order, melody_seed),
            RhythmModel::with_seed(config.markov_order, config.rhythm_unit_scale, rhythm_seed),
        ),
        _ => (
            SequenceModel::new(config.markov_order),
            RhythmModel::new(config.markov_order, config.rhythm_unit_scale),
        ),
    };
    melody.train_many(&corpus.melodies);
    if corpus.durations.is_empty() {
        println!("  No duration sequences; rhythm falls back to fixed durations.");
    } else {
        rhythm.train_many(&corpus.durations);
    }
    (melody, rhythm)
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
/// `--config` is applied first so that other flags override the file.
fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();

    let config = match parse_flag::<PathBuf>(&args, "--config") {
        Some(path) => PipelineConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }),
        None => PipelineConfig::default(),
    };
    let mut options = Options {
        config,
        save_models: None,
        load_models: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        let config = &mut options.config;
        match args[i].as_str() {
            "--config" => i += 1,
            "--midi-dir" => config.midi_dir = next_value(&args, &mut i),
            "--out" => config.output_dir = next_value(&args, &mut i),
            "--length" => config.length = next_value(&args, &mut i),
            "--order" => config.markov_order = next_value(&args, &mut i),
            "--seed" => config.seed = Some(next_value(&args, &mut i)),
            "--temperature" => config.melody_temperature = next_value(&args, &mut i),
            "--rhythm-temperature" => config.rhythm_temperature = next_value(&args, &mut i),
            "--scale" => {
                config.scale = next_value(&args, &mut i);
                config.enforce_scale = true;
            }
            "--min-pitch" => config.min_pitch = next_pitch(&args, &mut i),
            "--max-pitch" => config.max_pitch = next_pitch(&args, &mut i),
            "--start-pitch" => {
                let raw: String = next_value(&args, &mut i);
                config.start_pitch = parse_pitch(&raw).unwrap_or_else(|| {
                    eprintln!("--start-pitch requires a MIDI number or note name");
                    std::process::exit(1);
                });
            }
            "--save-models" => options.save_models = Some(next_value(&args, &mut i)),
            "--load-models" => options.load_models = Some(next_value(&args, &mut i)),
            "--verbose" | "-v" => options.verbose = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    options
}

/// The value following the flag at `args[*i]`; exits if missing or invalid.
fn next_value<T: FromStr>(args: &[String], i: &mut usize) -> T {
    let flag = &args[*i];
    *i += 1;
    args.get(*i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("{flag} requires a valid value");
        std::process::exit(1);
    })
}

/// A pitch flag value (number or note name) within 0-127.
fn next_pitch(args: &[String], i: &mut usize) -> u8 {
    let flag = args[*i].clone();
    let raw: String = next_value(args, i);
    parse_pitch(&raw)
        .and_then(|p| u8::try_from(p).ok())
        .filter(|&p| p <= 127)
        .unwrap_or_else(|| {
            eprintln!("{flag} requires a pitch between 0 and 127");
            std::process::exit(1);
        })
}

fn parse_flag<T: FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn print_usage() {
    let defaults = PipelineConfig::default();
    println!("Usage: canzona [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <FILE>              JSON settings file (flags override it)");
    println!("  --midi-dir <DIR>             MIDI corpus directory (default: {})", defaults.midi_dir.display());
    println!("  --out <DIR>                  Output directory (default: {})", defaults.output_dir.display());
    println!("  --length <N>                 Notes to generate (default: {})", defaults.length);
    println!("  --order <N>                  Markov order (default: {})", defaults.markov_order);
    println!("  --seed <N>                   Seed for reproducible output (default: random)");
    println!("  --temperature <T>            Melody sampling temperature (default: {})", defaults.melody_temperature);
    println!("  --rhythm-temperature <T>     Rhythm sampling temperature (default: {})", defaults.rhythm_temperature);
    println!("  --scale <SCALE>              Snap pitches to a scale, e.g. d-dorian or 0,2,4,7,9");
    println!("  --min-pitch <PITCH>          Lowest pitch, number or name (default: {})", defaults.min_pitch);
    println!("  --max-pitch <PITCH>          Highest pitch, number or name (default: {})", defaults.max_pitch);
    println!("  --start-pitch <PITCH>        Seed pitch for generation (default: {})", defaults.start_pitch);
    println!("  --save-models <DIR>          Save trained models as JSON");
    println!("  --load-models <DIR>          Load saved models instead of training");
    println!("  --verbose, -v                Debug logging on stderr");
    println!("  --help, -h                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flag() {
        let argv = args(&["canzona", "--config", "settings.json", "--seed", "x"]);
        assert_eq!(parse_flag::<PathBuf>(&argv, "--config"), Some(PathBuf::from("settings.json")));
        assert_eq!(parse_flag::<u64>(&argv, "--seed"), None);
        assert_eq!(parse_flag::<u64>(&argv, "--length"), None);
    }

    #[test]
    fn test_next_value_advances() {
        let argv = args(&["canzona", "--length", "32", "--verbose"]);
        let mut i = 1;
        let length: usize = next_value(&argv, &mut i);
        assert_eq!((length, i), (32, 2));
        let mut i = 1;
        assert_eq!(next_pitch(&args(&["canzona", "--min-pitch", "C3"]), &mut i), 48);
    }
}
