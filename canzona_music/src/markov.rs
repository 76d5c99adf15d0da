// Variable-order Markov model over integer tokens.
//
// Training counts, for every position of every training sequence, the
// token itself (unigram table) and the token following each of the 1..=k
// preceding contexts (context table). Contexts never span two training
// sequences.
//
// Sampling backs off from the longest available context (k tokens, or the
// whole history if shorter) down to a single token, then to the unigram
// table, then to token 0. The resolved distribution is sampled with a
// temperature: weight = count^(1/T), drawn by inverse CDF in ascending
// token order. T <= 0 picks the most frequent token.
//
// Tie-break: whenever the most frequent token is needed, the lowest token
// value wins among equal counts. Count tables are BTreeMaps, so every
// enumeration is in ascending token order and sampling is reproducible for
// a given seed.
//
// Used for pitch tokens directly and, through rhythm.rs, for quantized
// duration tokens. Snapshots serialize to JSON; the RNG is not saved.

use crate::config::{read_json, write_json};
use crate::error::MusicError;
use canzona_prng::SeqRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub type Token = i32;

/// Returned when there is nothing to sample from.
pub const DEFAULT_TOKEN: Token = 0;

/// Next token -> observed count.
pub type CountTable = BTreeMap<Token, u32>;

/// The trained statistics, separate from the RNG so a resolved
/// distribution can be borrowed while the RNG advances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CountTables {
    order: usize,
    /// Context (oldest token first) -> next-token counts.
    #[serde(with = "context_entries")]
    transitions: BTreeMap<Vec<Token>, CountTable>,
    unigram: CountTable,
}

impl CountTables {
    /// Backoff lookup. Stored contexts are never empty, so the first hit is
    /// the answer; with no hit this is the unigram table (empty if untrained).
    fn resolve(&self, history: &[Token]) -> &CountTable {
        let longest = self.order.min(history.len());
        (1..=longest)
            .rev()
            .find_map(|len| self.transitions.get(&history[history.len() - len..]))
            .unwrap_or(&self.unigram)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceModel {
    tables: CountTables,
    #[serde(skip, default = "SeqRng::from_entropy")]
    rng: SeqRng,
}

impl SequenceModel {
    /// An empty model of the given order (at least 1), seeded from entropy.
    pub fn new(order: usize) -> Self {
        Self::with_rng(order, SeqRng::from_entropy())
    }

    /// An empty model whose sampling stream is fixed by `seed`.
    pub fn with_seed(order: usize, seed: u64) -> Self {
        Self::with_rng(order, SeqRng::new(seed))
    }

    fn with_rng(order: usize, rng: SeqRng) -> Self {
        SequenceModel {
            tables: CountTables {
                order: order.max(1),
                ..CountTables::default()
            },
            rng,
        }
    }

    /// Replace the RNG: `Some(seed)` for a reproducible stream, `None` for entropy.
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.rng = seed.map_or_else(SeqRng::from_entropy, SeqRng::new);
    }

    pub fn order(&self) -> usize {
        self.tables.order
    }

    /// Add one sequence's counts.
    pub fn train(&mut self, sequence: &[Token]) {
        let tables = &mut self.tables;
        for (i, &next) in sequence.iter().enumerate() {
            increment(tables.unigram.entry(next).or_insert(0));
            for len in 1..=tables.order.min(i) {
                let counts = tables
                    .transitions
                    .entry(sequence[i - len..i].to_vec())
                    .or_default();
                increment(counts.entry(next).or_insert(0));
            }
        }
    }

    /// Train on independent sequences; no context crosses a sequence boundary.
    pub fn train_many<I>(&mut self, sequences: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[Token]>,
    {
        for sequence in sequences {
            self.train(sequence.as_ref());
        }
    }

    /// The distribution `sample_next` would draw from for `history`.
    pub fn counts_for_history(&self, history: &[Token]) -> &CountTable {
        self.tables.resolve(history)
    }

    /// Number of distinct tokens seen in training.
    pub fn vocabulary_size(&self) -> usize {
        self.tables.unigram.len()
    }

    /// Number of distinct contexts with recorded continuations.
    pub fn context_count(&self) -> usize {
        self.tables.transitions.len()
    }

    /// Draw the next token given the tokens so far (oldest first).
    pub fn sample_next(&mut self, history: &[Token], temperature: f64) -> Token {
        let counts = self.tables.resolve(history);
        if counts.is_empty() {
            log::warn!("sampling from an untrained model; returning token {DEFAULT_TOKEN}");
            return DEFAULT_TOKEN;
        }
        sample_counts(counts, temperature, &mut self.rng)
    }

    /// Write the trained tables as JSON.
    pub fn save(&self, path: &Path) -> Result<(), MusicError> {
        write_json(self, path)
    }

    /// Load tables written by `save` and reseed (see `reseed`).
    pub fn load(path: &Path, seed: Option<u64>) -> Result<Self, MusicError> {
        let mut model: SequenceModel = read_json(path)?;
        model.tables.order = model.tables.order.max(1);
        model.reseed(seed);
        Ok(model)
    }
}

fn increment(count: &mut u32) {
    *count = count.saturating_add(1);
}

/// Most frequent token; the lowest token wins ties.
fn argmax(counts: &CountTable) -> Token {
    let mut best: Option<(Token, u32)> = None;
    for (&token, &count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((token, count));
        }
    }
    best.map_or(DEFAULT_TOKEN, |(token, _)| token)
}

/// Temperature-weighted inverse-CDF draw from a non-empty table.
fn sample_counts(counts: &CountTable, temperature: f64, rng: &mut SeqRng) -> Token {
    if temperature <= 0.0 {
        return argmax(counts);
    }

    let exponent = 1.0 / temperature;
    let weights: Vec<(Token, f64)> = counts
        .iter()
        .map(|(&token, &count)| (token, f64::from(count).powf(exponent)))
        .collect();
    let total: f64 = weights.iter().map(|&(_, w)| w).sum();
    // Very low temperatures overflow to infinity; NaN comes from a NaN temperature.
    if !total.is_finite() || total <= 0.0 {
        return argmax(counts);
    }

    let target = rng.below_f64(total);
    let mut cumulative = 0.0;
    for &(token, weight) in &weights {
        cumulative += weight;
        if cumulative >= target {
            return token;
        }
    }
    weights.last().map_or(DEFAULT_TOKEN, |&(token, _)| token)
}

/// JSON object keys must be strings, so the context table is stored as a
/// list of `[context, counts]` pairs.
mod context_entries {
    use super::{CountTable, Token};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<Vec<Token>, CountTable>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Vec<Token>, CountTable>, D::Error> {
        let entries: Vec<(Vec<Token>, CountTable)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(Token, u32)]) -> CountTable {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_order_clamped_to_one() {
        assert_eq!(SequenceModel::with_seed(0, 1).order(), 1);
        assert_eq!(SequenceModel::with_seed(3, 1).order(), 3);
    }

    #[test]
    fn test_only_continuation_is_deterministic() {
        let mut model = SequenceModel::with_seed(2, 42);
        model.train(&[1, 2, 3, 1, 2, 3, 1, 2, 3]);
        assert_eq!(model.sample_next(&[1, 2], 0.0), 3);
        for _ in 0..50 {
            assert_eq!(model.sample_next(&[1, 2], 1.0), 3);
        }
    }

    #[test]
    fn test_counts_per_context_length() {
        let mut model = SequenceModel::with_seed(2, 42);
        model.train(&[1, 2, 3, 1, 2, 3, 1, 2, 3]);
        assert_eq!(model.counts_for_history(&[1, 2]), &table(&[(3, 3)]));
        assert_eq!(model.counts_for_history(&[3]), &table(&[(1, 2)]));
        assert_eq!(model.counts_for_history(&[]), &table(&[(1, 3), (2, 3), (3, 3)]));
        assert_eq!(model.vocabulary_size(), 3);
        // [1],[2],[3],[1,2],[2,3],[3,1]
        assert_eq!(model.context_count(), 6);
    }

    #[test]
    fn test_backoff_to_shorter_suffix_not_unigram() {
        let mut model = SequenceModel::with_seed(2, 42);
        model.train(&[5, 6, 7, 5, 5]);
        // [9, 6] was never seen; its suffix [6] was.
        assert_eq!(model.counts_for_history(&[9, 6]), &table(&[(7, 1)]));
        assert_eq!(model.sample_next(&[9, 6], 0.0), 7);
    }

    #[test]
    fn test_unknown_history_falls_back_to_unigram() {
        let mut model = SequenceModel::with_seed(2, 42);
        model.train(&[5, 6, 7, 5]);
        assert_eq!(model.counts_for_history(&[9, 8]), &table(&[(5, 2), (6, 1), (7, 1)]));
        assert_eq!(model.sample_next(&[9, 8], 0.0), 5);
    }

    #[test]
    fn test_history_longer_than_order_uses_trailing_tokens() {
        let mut model = SequenceModel::with_seed(1, 42);
        model.train(&[1, 2, 1, 3, 4, 1, 3]);
        assert_eq!(model.counts_for_history(&[9, 9, 9, 4]), &table(&[(1, 1)]));
    }

    #[test]
    fn test_untrained_model_returns_default() {
        let mut model = SequenceModel::with_seed(2, 42);
        assert!(model.counts_for_history(&[1, 2]).is_empty());
        assert_eq!(model.sample_next(&[1, 2], 1.0), DEFAULT_TOKEN);
        assert_eq!(model.sample_next(&[], 0.0), DEFAULT_TOKEN);
        assert_eq!(model.vocabulary_size(), 0);
    }

    #[test]
    fn test_argmax_tie_prefers_lowest_token() {
        let mut model = SequenceModel::with_seed(1, 42);
        model.train(&[1, 5, 1, 3]);
        assert_eq!(model.counts_for_history(&[1]), &table(&[(3, 1), (5, 1)]));
        assert_eq!(model.sample_next(&[1], 0.0), 3);
        assert_eq!(model.sample_next(&[1], -2.0), 3);
    }

    #[test]
    fn test_no_context_across_sequences() {
        let mut model = SequenceModel::with_seed(2, 42);
        model.train_many([vec![1, 2], vec![3, 4]]);
        // Nothing ever followed 2 inside one sequence.
        assert_eq!(model.counts_for_history(&[2]).len(), 4);
        assert_eq!(model.counts_for_history(&[3]), &table(&[(4, 1)]));
    }

    #[test]
    fn test_low_temperature_converges_to_argmax() {
        let mut model = SequenceModel::with_seed(1, 7);
        model.train(&[1, 2, 1, 2, 1, 2, 1, 4]);
        for _ in 0..500 {
            assert_eq!(model.sample_next(&[1], 0.01), 2);
        }
        // 3^1000 overflows: falls back to argmax rather than failing.
        for _ in 0..10 {
            assert_eq!(model.sample_next(&[1], 0.001), 2);
        }
    }

    #[test]
    fn test_high_temperature_approaches_uniform() {
        let mut model = SequenceModel::with_seed(1, 99);
        let mut sequence = Vec::new();
        for (token, repeats) in [(10, 1), (20, 10), (30, 100)] {
            for _ in 0..repeats {
                sequence.extend([0, token]);
            }
        }
        model.train(&sequence);

        let draws = 30_000;
        let mut seen: BTreeMap<Token, usize> = BTreeMap::new();
        for _ in 0..draws {
            *seen.entry(model.sample_next(&[0], 1000.0)).or_default() += 1;
        }
        assert_eq!(seen.len(), 3);
        for (&token, &count) in &seen {
            let share = count as f64 / draws as f64;
            assert!((0.30..0.37).contains(&share), "token {token} drawn {share:.3}");
        }
    }

    #[test]
    fn test_temperature_one_follows_counts() {
        let mut model = SequenceModel::with_seed(1, 5);
        let mut sequence = Vec::new();
        for _ in 0..3 {
            sequence.extend([0, 1]);
        }
        sequence.extend([0, 2]);
        model.train(&sequence);

        let draws = 20_000;
        let ones = (0..draws).filter(|_| model.sample_next(&[0], 1.0) == 1).count();
        let share = ones as f64 / draws as f64;
        assert!((0.72..0.78).contains(&share), "share of token 1: {share:.3}");
    }

    #[test]
    fn test_same_seed_same_samples() {
        let mut a = SequenceModel::with_seed(2, 1234);
        let mut b = SequenceModel::with_seed(2, 1234);
        let corpus = [60, 62, 64, 62, 60, 64, 67, 64, 62, 60];
        a.train(&corpus);
        b.train(&corpus);
        let mut history = vec![60];
        for _ in 0..100 {
            let x = a.sample_next(&history, 1.3);
            assert_eq!(x, b.sample_next(&history, 1.3));
            history.push(x);
        }
    }

    #[test]
    fn test_json_roundtrip_keeps_counts() {
        let mut model = SequenceModel::with_seed(2, 3);
        model.train(&[1, 2, 3, 1, 2, 4]);
        let json = serde_json::to_string(&model).unwrap();
        let restored: SequenceModel = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.order(), 2);
        assert_eq!(restored.counts_for_history(&[1, 2]), &table(&[(3, 1), (4, 1)]));
        assert_eq!(restored.vocabulary_size(), 4);
    }
}
