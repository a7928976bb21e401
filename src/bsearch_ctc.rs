use super::SearchError;
use crate::beam::{compare_ranked, Beam, BeamSet};
use crate::config::{DecoderConfig, LmWeights};
use crate::fast_math::LOG_ZERO;
use crate::pruning::{pruned_candidates, Candidate};
use crate::scorer::{Scorer, ScorerError};
use crate::tree::{NodeLm, PrefixTree, ROOT_NODE};
use crate::vocabulary::{LabelJoin, Vocabulary};
use log::trace;
use ndarray::{ArrayBase, Data, Ix2};
use std::cmp::Ordering;

/// One ranked hypothesis of a decoded sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBeam {
    /// Emitted symbol indices, blanks and collapsed repeats removed.
    pub tokens: Vec<usize>,
    /// For each token, the timestep where its probability peaked.
    pub timesteps: Vec<usize>,
    /// Log-probability of the prefix plus any scorer contribution; `-inf` for padding.
    pub score: f32,
}

impl DecodedBeam {
    /// Filler used when fewer than `beam_size` prefixes survive.
    pub fn padding() -> Self {
        DecodedBeam {
            tokens: Vec::new(),
            timesteps: Vec::new(),
            score: f32::NEG_INFINITY,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn text(&self, vocabulary: &Vocabulary, join: LabelJoin) -> String {
        vocabulary.render(&self.tokens, join)
    }
}

/// Scorer attached to a search, with its weights and the boundary flag of every symbol.
pub(crate) struct WordScoring<'a, S: Scorer> {
    pub scorer: &'a S,
    pub weights: LmWeights,
    pub boundaries: &'a [bool],
    pub vocabulary: &'a Vocabulary,
}

impl<'a, S: Scorer> WordScoring<'a, S> {
    fn root(&self) -> NodeLm<S::State> {
        NodeLm {
            score: 0.0,
            state: self.scorer.initial_state(),
        }
    }

    /// Symbols of the word in progress at the end of the prefix `node`.
    fn open_word(&self, tree: &PrefixTree<S::State>, node: usize) -> Vec<&'a str> {
        let mut word: Vec<&'a str> = tree
            .iter_from(node)
            .take_while(|&(label, _)| !self.boundaries[label])
            .filter_map(|(label, _)| self.vocabulary.label(label))
            .collect();
        word.reverse();
        word
    }

    /// Scorer bookkeeping of the child of `parent` labelled `label`. Every boundary earns
    /// `beta`, plus the weighted score of the word it closes when that word is not empty;
    /// other labels inherit the parent's.
    fn extend(
        &self,
        tree: &PrefixTree<S::State>,
        parent: usize,
        label: usize,
    ) -> Result<NodeLm<S::State>, ScorerError> {
        let inherited = match tree.lm(parent) {
            Some(lm) => lm.clone(),
            None => self.root(),
        };
        if !self.boundaries[label] {
            return Ok(inherited);
        }

        let word = self.open_word(tree, parent);
        if word.is_empty() {
            return Ok(NodeLm {
                score: inherited.score + self.weights.beta,
                state: inherited.state,
            });
        }

        let (log_score, state) = self.scorer.score_word(&inherited.state, &word)?;
        Ok(NodeLm {
            score: inherited.score + self.weights.alpha * log_score + self.weights.beta,
            state,
        })
    }

    /// Weighted score of the unfinished word at the end of `node`, zero if there is none.
    fn close_trailing_word(
        &self,
        tree: &PrefixTree<S::State>,
        node: usize,
    ) -> Result<f64, ScorerError> {
        let word = self.open_word(tree, node);
        if word.is_empty() {
            return Ok(0.0);
        }
        let state = match tree.lm(node) {
            Some(lm) => lm.state.clone(),
            None => self.scorer.initial_state(),
        };
        let (log_score, _) = self.scorer.score_word(&state, &word)?;
        Ok(self.weights.alpha * log_score + self.weights.beta)
    }
}

pub(crate) struct SearchContext<'a, S: Scorer> {
    pub config: &'a DecoderConfig,
    pub words: Option<WordScoring<'a, S>>,
}

/// Prefix tree of one search plus the optional scorer consulted when it grows.
struct Labelling<'c, 'a, S: Scorer> {
    tree: PrefixTree<S::State>,
    words: Option<&'c WordScoring<'a, S>>,
}

impl<'c, 'a, S: Scorer> Labelling<'c, 'a, S> {
    /// Node of the prefix `node + [label]`, created on first use. Its alignment moves to
    /// `timestep` when `log_prob` is the label's best so far.
    fn extend(
        &mut self,
        node: usize,
        label: usize,
        timestep: usize,
        log_prob: f64,
    ) -> Result<usize, ScorerError> {
        if let Some(child) = self.tree.get_child(node, label) {
            self.tree.record_peak(child, timestep, log_prob);
            return Ok(child);
        }
        let lm = match self.words {
            Some(words) => Some(words.extend(&self.tree, node, label)?),
            None => None,
        };
        Ok(self.tree.add_node(node, label, timestep, log_prob, lm))
    }
}

/// Runs the prefix beam search over every row of `network_output` (`[timesteps, V]`) and
/// returns exactly `beam_size` beams, best first.
pub(crate) fn beam_search_ctc<D: Data<Elem = f32>, S: Scorer>(
    network_output: &ArrayBase<D, Ix2>,
    context: &SearchContext<S>,
) -> Result<Vec<DecodedBeam>, SearchError> {
    let (tree, beam) = grow_beams(network_output, context)?;
    finalize(&tree, context.words.as_ref(), beam, context.config.beam_size)
}

/// The timestep loop. Returns the live beams after the last row and the tree holding their
/// prefixes, which only keeps the paths of live beams.
fn grow_beams<D: Data<Elem = f32>, S: Scorer>(
    network_output: &ArrayBase<D, Ix2>,
    context: &SearchContext<S>,
) -> Result<(PrefixTree<S::State>, Vec<Beam>), SearchError> {
    let config = context.config;
    let blank_id = config.blank_id;

    let mut labelling = Labelling {
        tree: PrefixTree::new(
            network_output.ncols(),
            context.words.as_ref().map(WordScoring::root),
        ),
        words: context.words.as_ref(),
    };

    // initial state
    let mut beam = vec![Beam::empty()];

    for (idx, pr) in network_output.outer_iter().enumerate() {
        let candidates = pruned_candidates(
            &pr,
            config.cutoff_top_n,
            config.cutoff_prob,
            config.is_log_domain,
        );
        let mut prefix_set = BeamSet::new();

        for &Candidate { symbol, log_prob } in &candidates {
            for search_point in &beam {
                let node = search_point.node;
                let total = search_point.probability() + log_prob;

                // empty token
                if symbol == blank_id {
                    prefix_set.add_blank(node, total);
                    continue;
                }

                if Some(symbol) == labelling.tree.label(node) {
                    // repetition without a blank in between collapses into the same prefix
                    prefix_set.add_label(node, search_point.p_nonblank + log_prob);

                    // after a blank it is a second occurrence
                    if search_point.p_blank > LOG_ZERO {
                        let child = labelling.extend(node, symbol, idx, log_prob)?;
                        prefix_set.add_label(child, search_point.p_blank + log_prob);
                    }
                } else if total != LOG_ZERO {
                    let child = labelling.extend(node, symbol, idx, log_prob)?;
                    prefix_set.add_label(child, total);
                }
            }
        }

        if prefix_set.is_empty() {
            return Err(SearchError::RanOutOfBeam);
        }
        trace!(
            "timestep {}: {} candidates, {} prefixes, {} tree nodes",
            idx,
            candidates.len(),
            prefix_set.len(),
            labelling.tree.len()
        );

        let ranked = prefix_set.into_ranked(&labelling.tree, config.beam_size)?;

        // pruned prefixes are never extended again
        let live: Vec<usize> = ranked.iter().map(|search_point| search_point.node).collect();
        let nodes = labelling.tree.retain_paths(&live);
        beam = ranked
            .into_iter()
            .zip(nodes)
            .map(|(search_point, node)| Beam {
                node,
                ..search_point
            })
            .collect();
    }

    Ok((labelling.tree, beam))
}

/// Scores the trailing words, sorts by final score and pads to `beam_size`.
fn finalize<S: Scorer>(
    tree: &PrefixTree<S::State>,
    words: Option<&WordScoring<S>>,
    beam: Vec<Beam>,
    beam_size: usize,
) -> Result<Vec<DecodedBeam>, SearchError> {
    let mut keys = Vec::<(f64, usize)>::with_capacity(beam.len());
    let mut results = Vec::<DecodedBeam>::with_capacity(beam_size);

    for search_point in &beam {
        let mut score = search_point.ranking_score(tree);
        if let Some(words) = words {
            score += words.close_trailing_word(tree, search_point.node)?;
        }

        let (tokens, timesteps) = if search_point.node == ROOT_NODE {
            (Vec::new(), Vec::new())
        } else {
            tree.path(search_point.node)
        };

        keys.push((score, search_point.node));
        results.push(DecodedBeam {
            tokens,
            timesteps,
            score: score as f32,
        });
    }

    let mut has_nans = false;
    let permutation = permutation::sort_by(&keys[..], |a, b| {
        compare_ranked(tree, *a, *b).unwrap_or_else(|| {
            has_nans = true;
            Ordering::Equal
        })
    });
    if has_nans {
        return Err(SearchError::IncomparableValues);
    }

    let mut results = permutation.apply_slice(&results[..]);
    results.resize(beam_size, DecodedBeam::padding());
    Ok(results)
}
