// Summary statistics for trained models.
//
// The history counts are taken over the corpus, not the model tables:
// every context of length 1..=order that precedes a token in some melody.
// Transition entries and observations then sum the resolved distribution
// of each such history, so they reflect what sampling would actually see.

use crate::corpus::Corpus;
use crate::markov::{SequenceModel, Token};
use crate::rhythm::RhythmModel;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReport {
    pub vocabulary_size: usize,
    pub unique_histories: usize,
    pub transition_entries: usize,
    pub transition_observations: u64,
    pub rhythm_unit: Option<f64>,
    pub distinct_duration_tokens: usize,
}

impl ModelReport {
    pub fn compute(melody: &SequenceModel, rhythm: &RhythmModel, corpus: &Corpus) -> Self {
        let order = melody.order();
        let mut histories: BTreeSet<&[Token]> = BTreeSet::new();
        for sequence in &corpus.melodies {
            for i in 1..sequence.len() {
                for len in 1..=order.min(i) {
                    histories.insert(&sequence[i - len..i]);
                }
            }
        }

        let mut transition_entries = 0;
        let mut transition_observations = 0;
        for history in &histories {
            let counts = melody.counts_for_history(history);
            transition_entries += counts.len();
            transition_observations += counts.values().map(|&c| u64::from(c)).sum::<u64>();
        }

        let distinct_duration_tokens = match rhythm.unit() {
            Some(_) => corpus
                .durations
                .iter()
                .flat_map(|sequence| rhythm.tokenize(sequence))
                .collect::<BTreeSet<Token>>()
                .len(),
            None => 0,
        };

        ModelReport {
            vocabulary_size: melody.vocabulary_size(),
            unique_histories: histories.len(),
            transition_entries,
            transition_observations,
            rhythm_unit: rhythm.unit(),
            distinct_duration_tokens,
        }
    }
}

impl fmt::Display for ModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Melody vocabulary size: {}", self.vocabulary_size)?;
        writeln!(f, "  Unique conditioning histories: {}", self.unique_histories)?;
        writeln!(f, "  Transition entries: {}", self.transition_entries)?;
        writeln!(f, "  Transition observations: {}", self.transition_observations)?;
        match self.rhythm_unit {
            Some(unit) => {
                writeln!(f, "  Rhythm unit: {unit} s")?;
                write!(f, "  Distinct duration tokens: {}", self.distinct_duration_tokens)
            }
            None => write!(f, "  Rhythm unit: (not set)"),
        }
    }
}
