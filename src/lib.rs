//! Prefix beam search over the per-timestep output distributions of a CTC-trained model.
//!
//! A [`CtcBeamDecoder`] is built once from a [`Vocabulary`] and a validated [`DecoderConfig`],
//! optionally extended with a word-level [`Scorer`], and then decodes single sequences
//! (`[timesteps, V]`) or whole batches (`[batch, timesteps, V]`) into ranked label sequences with
//! their scores and per-symbol timestep alignments.

extern crate ndarray;

use log::debug;
use ndarray::{s, ArrayBase, Axis, Data, Ix2, Ix3};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::AtomicBool;
use thiserror::Error;

mod batch;
mod beam;
mod bsearch_ctc;
mod config;
mod fast_math;
mod greedy;
mod lexicon_lm;
mod pruning;
mod scorer;
mod tree;
mod vocabulary;

pub use batch::{BatchArrays, BatchOutput};
pub use bsearch_ctc::DecodedBeam;
pub use config::{DecoderConfig, LmWeights};
pub use lexicon_lm::{LexiconError, LexiconScorer};
pub use pruning::{pruned_candidates, Candidate};
pub use scorer::{NoScorer, Scorer, ScorerError};
pub use vocabulary::{AlphabetError, LabelJoin, Vocabulary};

use bsearch_ctc::{SearchContext, WordScoring};

/// Invalid decoder configuration, detected before any decoding starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("vocabulary is empty")]
    EmptyVocabulary,

    #[error("beam_size must be at least 1")]
    ZeroBeamSize,

    #[error("cutoff_top_n {value} is outside [1, {vocab_size}]")]
    CutoffTopN { value: usize, vocab_size: usize },

    #[error("cutoff_prob {0} is outside (0, 1]")]
    CutoffProb(f64),

    #[error("blank_id {blank_id} is outside a vocabulary of {vocab_size} symbols")]
    BlankId { blank_id: usize, vocab_size: usize },

    #[error("num_processes must be at least 1")]
    ZeroProcesses,

    #[error("{name} must be a finite non-negative weight, got {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("could not build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Probability input whose dimensions do not agree with the vocabulary or with the requested
/// effective lengths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("item {item}: probability rows have {actual} entries, vocabulary has {expected} symbols")]
    VocabularyMismatch {
        item: usize,
        expected: usize,
        actual: usize,
    },

    #[error("item {item}: effective length {length} exceeds the {available} available timesteps")]
    SequenceLength {
        item: usize,
        length: usize,
        available: usize,
    },

    #[error("got {actual} effective lengths for a batch of {expected} items")]
    LengthCount { expected: usize, actual: usize },
}

/// Failure while searching one sequence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("scorer failed: {0}")]
    Scorer(#[from] ScorerError),

    #[error("failed to compare values (NaNs in input?)")]
    IncomparableValues,

    #[error("ran out of search space (no beam with non-zero probability)")]
    RanOutOfBeam,

    #[error("decoding was cancelled before this item started")]
    Cancelled,
}

/// A [`SearchError`] tagged with the batch item it happened on.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("item {item}: {source}")]
pub struct ItemError {
    pub item: usize,
    pub source: SearchError,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Item(#[from] ItemError),
}

/// Beam search decoder bound to one vocabulary and one configuration.
///
/// The decoder is immutable once built and can be shared between threads; batch calls fan out
/// over its own worker pool of `num_processes` threads. `S` is the optional word-level scorer,
/// [`NoScorer`] when none is attached.
pub struct CtcBeamDecoder<S = NoScorer> {
    vocabulary: Vocabulary,
    config: DecoderConfig,
    scorer: Option<S>,
    boundaries: Vec<bool>,
    pool: ThreadPool,
}

impl CtcBeamDecoder {
    /// Validates `config` against `vocabulary` and spins up the worker pool.
    pub fn new(vocabulary: Vocabulary, config: DecoderConfig) -> Result<Self, ConfigError> {
        config.validate(vocabulary.len())?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_processes)
            .thread_name(|index| format!("rustctc-worker-{}", index))
            .build()?;

        debug!(
            "built CTC decoder: {} symbols, blank {}, beam_size {}, cutoff_top_n {}, cutoff_prob {}, {} workers",
            vocabulary.len(),
            config.blank_id,
            config.beam_size,
            config.cutoff_top_n,
            config.cutoff_prob,
            config.num_processes
        );

        Ok(CtcBeamDecoder {
            boundaries: Vec::new(),
            vocabulary,
            config,
            scorer: None,
            pool,
        })
    }
}

impl<S: Scorer> CtcBeamDecoder<S> {
    /// Attaches a word-level scorer, weighted by the configured `lm_weights` (zero weights when
    /// absent).
    pub fn with_scorer<T: Scorer>(self, scorer: T) -> CtcBeamDecoder<T> {
        let boundaries: Vec<bool> = self
            .vocabulary
            .labels()
            .iter()
            .map(|label| scorer.is_word_boundary(label))
            .collect();

        debug!(
            "attached scorer, {} boundary symbols",
            boundaries.iter().filter(|&&b| b).count()
        );

        CtcBeamDecoder {
            vocabulary: self.vocabulary,
            config: self.config,
            scorer: Some(scorer),
            boundaries,
            pool: self.pool,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn scorer(&self) -> Option<&S> {
        self.scorer.as_ref()
    }

    /// Decodes one `[timesteps, V]` sequence, reading only its first `length` timesteps (all of
    /// them when `None`).
    ///
    /// Returns exactly `beam_size` beams, best first; missing beams are padding with no tokens and
    /// a score of `-inf`.
    pub fn decode<D: Data<Elem = f32>>(
        &self,
        probs: &ArrayBase<D, Ix2>,
        length: Option<usize>,
    ) -> Result<Vec<DecodedBeam>, DecodeError> {
        let (available, width) = probs.dim();
        self.check_width(0, width)?;
        let length = resolve_length(0, length, available)?;

        self.search(&probs.slice(s![..length, ..]))
            .map_err(|source| ItemError { item: 0, source }.into())
    }

    /// Best path decoding: the most probable symbol at every timestep, repeats collapsed and
    /// blanks removed.
    pub fn decode_greedy<D: Data<Elem = f32>>(
        &self,
        probs: &ArrayBase<D, Ix2>,
        length: Option<usize>,
    ) -> Result<DecodedBeam, DecodeError> {
        let (available, width) = probs.dim();
        self.check_width(0, width)?;
        let length = resolve_length(0, length, available)?;

        Ok(greedy::greedy_ctc(
            &probs.slice(s![..length, ..]),
            self.config.blank_id,
            self.config.is_log_domain,
        ))
    }

    /// Decodes a `[batch, timesteps, V]` tensor on the worker pool.
    ///
    /// `lengths` holds one effective length per item (the full timestep count when `None`).
    /// Shape problems fail the whole call before any work starts; search failures are reported
    /// per item in the returned [`BatchOutput`].
    pub fn decode_batch<D: Data<Elem = f32>>(
        &self,
        probs: &ArrayBase<D, Ix3>,
        lengths: Option<&[usize]>,
    ) -> Result<BatchOutput, DecodeError> {
        self.run_batch(probs, lengths, None)
    }

    /// Like [`decode_batch`](Self::decode_batch), but items that have not started when `cancel`
    /// is raised report [`SearchError::Cancelled`] instead of being decoded.
    pub fn decode_batch_cancellable<D: Data<Elem = f32>>(
        &self,
        probs: &ArrayBase<D, Ix3>,
        lengths: Option<&[usize]>,
        cancel: &AtomicBool,
    ) -> Result<BatchOutput, DecodeError> {
        self.run_batch(probs, lengths, Some(cancel))
    }

    fn run_batch<D: Data<Elem = f32>>(
        &self,
        probs: &ArrayBase<D, Ix3>,
        lengths: Option<&[usize]>,
        cancel: Option<&AtomicBool>,
    ) -> Result<BatchOutput, DecodeError> {
        let (batch_size, max_time, width) = probs.dim();
        self.check_width(0, width)?;
        let lengths = resolve_lengths(lengths, batch_size, max_time)?;

        let probs = probs.view();
        let items = batch::decode_items(&self.pool, batch_size, cancel, |item| {
            let sequence = probs.index_axis(Axis(0), item);
            self.search(&sequence.slice(s![..lengths[item], ..]))
        });

        Ok(BatchOutput::new(self.config.beam_size, max_time, items))
    }

    fn search<D: Data<Elem = f32>>(
        &self,
        sequence: &ArrayBase<D, Ix2>,
    ) -> Result<Vec<DecodedBeam>, SearchError> {
        let context = SearchContext {
            config: &self.config,
            words: self.scorer.as_ref().map(|scorer| WordScoring {
                scorer,
                weights: self.config.lm_weights.unwrap_or_default(),
                boundaries: &self.boundaries,
                vocabulary: &self.vocabulary,
            }),
        };
        bsearch_ctc::beam_search_ctc(sequence, &context)
    }

    fn check_width(&self, item: usize, width: usize) -> Result<(), ShapeError> {
        if width != self.vocabulary.len() {
            return Err(ShapeError::VocabularyMismatch {
                item,
                expected: self.vocabulary.len(),
                actual: width,
            });
        }
        Ok(())
    }
}

fn resolve_length(item: usize, length: Option<usize>, available: usize) -> Result<usize, ShapeError> {
    match length {
        Some(length) if length > available => Err(ShapeError::SequenceLength {
            item,
            length,
            available,
        }),
        Some(length) => Ok(length),
        None => Ok(available),
    }
}

fn resolve_lengths(
    lengths: Option<&[usize]>,
    batch_size: usize,
    available: usize,
) -> Result<Vec<usize>, ShapeError> {
    match lengths {
        None => Ok(vec![available; batch_size]),
        Some(lengths) if lengths.len() != batch_size => Err(ShapeError::LengthCount {
            expected: batch_size,
            actual: lengths.len(),
        }),
        Some(lengths) => lengths
            .iter()
            .enumerate()
            .map(|(item, &length)| resolve_length(item, Some(length), available))
            .collect(),
    }
}
