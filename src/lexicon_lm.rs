use crate::scorer::{Scorer, ScorerError};
use log::debug;
use patricia_tree::PatriciaMap;
use std::f64::consts::LN_10;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("could not read lexicon: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: invalid log10 probability {value:?}")]
    Parse { line: usize, value: String },
}

/// Unigram word scorer backed by a patricia trie.
///
/// Known words score their stored natural-log probability, any other word scores
/// `unknown_log_prob`. Word boundaries are the `boundary` symbol, a single space by default.
pub struct LexiconScorer {
    words: PatriciaMap<f64>,
    unknown_log_prob: f64,
    boundary: String,
}

impl LexiconScorer {
    pub fn new(unknown_log_prob: f64) -> Self {
        LexiconScorer {
            words: PatriciaMap::new(),
            unknown_log_prob,
            boundary: " ".to_string(),
        }
    }

    /// Every word in `words` is in the lexicon with log-probability 0.
    pub fn from_words<I, W>(words: I, unknown_log_prob: f64) -> Self
    where
        I: IntoIterator<Item = W>,
        W: AsRef<str>,
    {
        let mut lexicon = Self::new(unknown_log_prob);
        for word in words {
            lexicon.insert(word.as_ref(), 0.0);
        }
        lexicon
    }

    /// Reads one word per line, optionally followed by a tab and its log10 probability (ARPA
    /// unigram convention). Blank lines are skipped.
    pub fn load_from_file<P: AsRef<Path>>(
        filename: P,
        unknown_log_prob: f64,
    ) -> Result<Self, LexiconError> {
        let file = File::open(filename.as_ref())?;
        let lexicon = Self::load_from_reader(BufReader::new(file), unknown_log_prob)?;
        debug!(
            "loaded {} lexicon words from {}",
            lexicon.len(),
            filename.as_ref().display()
        );
        Ok(lexicon)
    }

    pub fn load_from_reader<R: BufRead>(
        reader: R,
        unknown_log_prob: f64,
    ) -> Result<Self, LexiconError> {
        let mut lexicon = Self::new(unknown_log_prob);

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.trim_end().splitn(2, '\t');
            let word = match fields.next() {
                Some(word) if !word.is_empty() => word,
                _ => continue,
            };
            let log_prob = match fields.next() {
                Some(value) => value.trim().parse::<f64>().map_err(|_| LexiconError::Parse {
                    line: index + 1,
                    value: value.to_string(),
                })? * LN_10,
                None => 0.0,
            };
            lexicon.insert(word, log_prob);
        }

        Ok(lexicon)
    }

    pub fn with_boundary<B: Into<String>>(mut self, boundary: B) -> Self {
        self.boundary = boundary.into();
        self
    }

    pub fn insert(&mut self, word: &str, log_prob: f64) {
        self.words.insert(word, log_prob);
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.get(word).is_some()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Scorer for LexiconScorer {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn is_word_boundary(&self, symbol: &str) -> bool {
        symbol == self.boundary
    }

    fn score_word(
        &self,
        _state: &Self::State,
        word: &[&str],
    ) -> Result<(f64, Self::State), ScorerError> {
        let word = word.concat();
        let log_prob = self
            .words
            .get(&word)
            .copied()
            .unwrap_or(self.unknown_log_prob);
        Ok((log_prob, ()))
    }
}
