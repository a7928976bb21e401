use crate::fast_math::{log_sum_exp, LOG_ZERO};
use crate::tree::{PrefixTree, ROOT_NODE};
use crate::SearchError;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A node in the labelling tree to build from.
#[derive(Clone, Debug, PartialEq)]
pub struct Beam {
    /// The prefix of the search point
    pub node: usize,
    /// Log-probability of the paths producing the prefix that end on one or more blanks.
    pub p_blank: f64,
    /// Log-probability of the paths producing the prefix that end on its last label.
    pub p_nonblank: f64,
}

impl Beam {
    /// The empty prefix before the first timestep: probability one, ending on a blank.
    pub fn empty() -> Self {
        Beam {
            node: ROOT_NODE,
            p_blank: 0.0,
            p_nonblank: LOG_ZERO,
        }
    }

    fn unreached(node: usize) -> Self {
        Beam {
            node,
            p_blank: LOG_ZERO,
            p_nonblank: LOG_ZERO,
        }
    }

    /// The total log-probability of the labelling so far.
    pub fn probability(&self) -> f64 {
        log_sum_exp(self.p_blank, self.p_nonblank)
    }

    /// Probability plus the scorer contribution stored on the prefix.
    pub fn ranking_score<St>(&self, tree: &PrefixTree<St>) -> f64 {
        self.probability() + tree.lm_score(self.node)
    }
}

/// Beams of the next timestep, at most one per prefix. Contributions reaching the same prefix
/// are merged with log-sum-exp as they arrive.
#[derive(Debug, Default)]
pub struct BeamSet {
    beams: BTreeMap<usize, Beam>,
}

impl BeamSet {
    pub fn new() -> Self {
        BeamSet::default()
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, node: usize) -> Option<&Beam> {
        self.beams.get(&node)
    }

    /// Adds `log_prob` to the paths of `node` that end on a blank.
    pub fn add_blank(&mut self, node: usize, log_prob: f64) {
        if log_prob == LOG_ZERO {
            return;
        }
        let beam = self
            .beams
            .entry(node)
            .or_insert_with(|| Beam::unreached(node));
        beam.p_blank = log_sum_exp(beam.p_blank, log_prob);
    }

    /// Adds `log_prob` to the paths of `node` that end on its last label.
    pub fn add_label(&mut self, node: usize, log_prob: f64) {
        if log_prob == LOG_ZERO {
            return;
        }
        let beam = self
            .beams
            .entry(node)
            .or_insert_with(|| Beam::unreached(node));
        beam.p_nonblank = log_sum_exp(beam.p_nonblank, log_prob);
    }

    /// The `beam_size` best beams, best first.
    pub fn into_ranked<St>(
        self,
        tree: &PrefixTree<St>,
        beam_size: usize,
    ) -> Result<Vec<Beam>, SearchError> {
        let mut ranked: Vec<(f64, Beam)> = self
            .beams
            .into_iter()
            .map(|(_, beam)| (beam.ranking_score(tree), beam))
            .collect();

        let mut has_nans = false;
        ranked.sort_unstable_by(|a, b| {
            compare_ranked(tree, (a.0, a.1.node), (b.0, b.1.node)).unwrap_or_else(|| {
                has_nans = true;
                Ordering::Equal
            })
        });
        if has_nans {
            return Err(SearchError::IncomparableValues);
        }

        ranked.truncate(beam_size);
        Ok(ranked.into_iter().map(|(_, beam)| beam).collect())
    }
}

/// Ranking order of two scored prefixes: higher score first, then shorter prefix, then lower
/// label sequence. `None` when a score is NaN.
pub fn compare_ranked<St>(
    tree: &PrefixTree<St>,
    (score_a, node_a): (f64, usize),
    (score_b, node_b): (f64, usize),
) -> Option<Ordering> {
    score_b
        .partial_cmp(&score_a)
        .map(|order| order.then_with(|| tree.compare_prefixes(node_a, node_b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contributions_to_one_prefix_merge() {
        let mut tree: PrefixTree<()> = PrefixTree::new(3, None);
        let a = tree.add_node(ROOT_NODE, 1, 0, 0.5f64.ln(), None);

        let mut set = BeamSet::new();
        set.add_label(a, 0.25f64.ln());
        set.add_label(a, 0.25f64.ln());
        set.add_blank(a, 0.1f64.ln());
        set.add_blank(ROOT_NODE, LOG_ZERO);

        assert_eq!(set.len(), 1);
        let beam = set.get(a).unwrap();
        assert!((beam.p_nonblank - 0.5f64.ln()).abs() < 1e-12);
        assert!((beam.probability() - 0.6f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn ranking_keeps_best_and_breaks_ties_by_prefix() {
        let mut tree: PrefixTree<()> = PrefixTree::new(3, None);
        let b = tree.add_node(ROOT_NODE, 2, 0, -1.0, None);
        let a = tree.add_node(ROOT_NODE, 1, 0, -1.0, None);
        let ab = tree.add_node(a, 2, 1, -1.0, None);

        let mut set = BeamSet::new();
        set.add_label(ab, 0.3f64.ln());
        set.add_label(b, 0.3f64.ln());
        set.add_label(a, 0.3f64.ln());
        set.add_blank(ROOT_NODE, 0.1f64.ln());

        let ranked = set.into_ranked(&tree, 3).unwrap();
        let nodes: Vec<usize> = ranked.iter().map(|beam| beam.node).collect();
        assert_eq!(nodes, vec![a, b, ab]);
    }

    #[test]
    fn nan_scores_are_reported() {
        let mut tree: PrefixTree<()> = PrefixTree::new(2, None);
        let a = tree.add_node(ROOT_NODE, 1, 0, -1.0, None);

        let mut set = BeamSet::new();
        set.add_blank(ROOT_NODE, f64::NAN);
        set.add_label(a, -1.0);

        assert_eq!(
            set.into_ranked(&tree, 2),
            Err(SearchError::IncomparableValues)
        );
    }
}
