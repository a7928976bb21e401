use std::cmp::Ordering;
use std::collections::HashMap;

/// Node id of the empty prefix.
pub const ROOT_NODE: usize = 0;

/// Scorer bookkeeping carried by a node: the weighted score of every word completed along the
/// path and the scorer state after the last of them.
#[derive(Clone, Debug)]
pub struct NodeLm<St> {
    pub score: f64,
    pub state: St,
}

#[derive(Debug)]
struct Node<St> {
    parent: usize,
    label: Option<usize>,
    depth: usize,
    /// Timestep at which `label` had its highest probability among the extensions reaching
    /// this node.
    timestep: usize,
    peak_log_prob: f64,
    lm: Option<NodeLm<St>>,
}

/// Arena of every decoded prefix seen while searching one sequence.
///
/// Each node stands for exactly one prefix: extending a node by a label always yields the same
/// child, so node ids can key the live beams directly. Ids stay stable until
/// [`retain_paths`](Self::retain_paths) prunes and renumbers the tree between timesteps.
#[derive(Debug)]
pub struct PrefixTree<St> {
    nodes: Vec<Node<St>>,
    children: HashMap<(usize, usize), usize>,
    vocabulary_length: usize,
}

impl<St> PrefixTree<St> {
    pub fn new(vocabulary_length: usize, root_lm: Option<NodeLm<St>>) -> Self {
        PrefixTree {
            nodes: vec![Node {
                parent: ROOT_NODE,
                label: None,
                depth: 0,
                timestep: 0,
                peak_log_prob: f64::NEG_INFINITY,
                lm: root_lm,
            }],
            children: HashMap::new(),
            vocabulary_length,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Last label of the prefix, `None` for the root.
    pub fn label(&self, node: usize) -> Option<usize> {
        self.nodes[node].label
    }

    pub fn depth(&self, node: usize) -> usize {
        self.nodes[node].depth
    }

    pub fn lm(&self, node: usize) -> Option<&NodeLm<St>> {
        self.nodes[node].lm.as_ref()
    }

    /// Weighted scorer contribution accumulated along the prefix.
    pub fn lm_score(&self, node: usize) -> f64 {
        self.nodes[node].lm.as_ref().map_or(0.0, |lm| lm.score)
    }

    pub fn get_child(&self, node: usize, label: usize) -> Option<usize> {
        self.children.get(&(node, label)).copied()
    }

    pub fn add_node(
        &mut self,
        node: usize,
        label: usize,
        timestep: usize,
        log_prob: f64,
        lm: Option<NodeLm<St>>,
    ) -> usize {
        debug_assert!(label < self.vocabulary_length);
        debug_assert!(self.get_child(node, label).is_none());

        let index = self.nodes.len();
        self.nodes.push(Node {
            parent: node,
            label: Some(label),
            depth: self.nodes[node].depth + 1,
            timestep,
            peak_log_prob: log_prob,
            lm,
        });
        self.children.insert((node, label), index);
        index
    }

    /// Moves the alignment of the node's label to `timestep` if `log_prob` beats its peak so far.
    pub fn record_peak(&mut self, node: usize, timestep: usize, log_prob: f64) {
        let node = &mut self.nodes[node];
        if log_prob > node.peak_log_prob {
            node.peak_log_prob = log_prob;
            node.timestep = timestep;
        }
    }

    /// Drops every node that is not on the path of one of `live`, then renumbers the rest
    /// without changing their relative order. Returns the new id of each `live` node.
    pub fn retain_paths(&mut self, live: &[usize]) -> Vec<usize> {
        let mut keep = vec![false; self.nodes.len()];
        keep[ROOT_NODE] = true;
        for &node in live {
            let mut current = node;
            while !keep[current] {
                keep[current] = true;
                current = self.nodes[current].parent;
            }
        }

        // parents precede their children, so one forward pass renumbers everything
        let mut remap = vec![ROOT_NODE; self.nodes.len()];
        let nodes = std::mem::take(&mut self.nodes);
        self.children.clear();
        for (old, mut node) in nodes.into_iter().enumerate() {
            if !keep[old] {
                continue;
            }
            let index = self.nodes.len();
            remap[old] = index;
            node.parent = remap[node.parent];
            if let Some(label) = node.label {
                self.children.insert((node.parent, label), index);
            }
            self.nodes.push(node);
        }

        live.iter().map(|&node| remap[node]).collect()
    }

    /// Walks from `node` up to the root, yielding `(label, timestep)` pairs, last label first.
    pub fn iter_from(&self, node: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut current = node;
        std::iter::from_fn(move || {
            let n = &self.nodes[current];
            let label = n.label?;
            current = n.parent;
            Some((label, n.timestep))
        })
    }

    /// Labels and alignment timesteps of the prefix, in emission order.
    pub fn path(&self, node: usize) -> (Vec<usize>, Vec<usize>) {
        let (mut labels, mut timesteps): (Vec<usize>, Vec<usize>) = self.iter_from(node).unzip();
        labels.reverse();
        timesteps.reverse();
        (labels, timesteps)
    }

    /// Shorter prefixes first, then lexicographic order of the label sequences.
    pub fn compare_prefixes(&self, a: usize, b: usize) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.depth(a)
            .cmp(&self.depth(b))
            .then_with(|| self.path(a).0.cmp(&self.path(b).0))
    }
}
