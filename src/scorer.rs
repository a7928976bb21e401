use thiserror::Error;

/// Error raised by a [`Scorer`]. It fails only the sequence being decoded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ScorerError(pub String);

impl ScorerError {
    pub fn new<M: Into<String>>(message: M) -> Self {
        ScorerError(message.into())
    }
}

/// Word-level language model hook consulted at word boundaries.
///
/// Scorers are shared by every worker of a batch, so they must be `Sync`; anything that changes
/// while decoding belongs in [`Scorer::State`], which travels with each beam.
pub trait Scorer: Sync {
    /// Opaque model context, e.g. the last words seen by an n-gram model.
    type State: Clone + Send;

    /// Context of a beam that has not completed any word yet.
    fn initial_state(&self) -> Self::State;

    /// Whether emitting `symbol` ends the word in progress.
    fn is_word_boundary(&self, symbol: &str) -> bool {
        symbol == " "
    }

    /// Log-score of `word` (its symbols in emission order) following `state`, together with
    /// the context to keep for the next word.
    fn score_word(
        &self,
        state: &Self::State,
        word: &[&str],
    ) -> Result<(f64, Self::State), ScorerError>;
}

/// Placeholder scorer type of a decoder without a language model. It cannot be constructed.
#[derive(Debug)]
pub enum NoScorer {}

impl Scorer for NoScorer {
    type State = ();

    fn initial_state(&self) -> Self::State {
        match *self {}
    }

    fn is_word_boundary(&self, _symbol: &str) -> bool {
        match *self {}
    }

    fn score_word(
        &self,
        _state: &Self::State,
        _word: &[&str],
    ) -> Result<(f64, Self::State), ScorerError> {
        match *self {}
    }
}
