use crate::fast_math::{rank_exp, PROB_FLOOR};
use ndarray::{ArrayBase, Data, Ix1};

/// A symbol selected for expansion at one timestep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub symbol: usize,
    /// Log-probability of the symbol at this timestep.
    pub log_prob: f64,
}

/// Selects the symbols of one probability row worth expanding, most probable first.
///
/// At most `cutoff_top_n` symbols are kept, and when `cutoff_prob < 1` the list is cut as soon as
/// the kept symbols cover `cutoff_prob` of the probability mass. Equal probabilities keep the
/// lower symbol index first. Log-domain rows are exponentiated only to accumulate that mass; the
/// returned scores stay the input log-probabilities.
pub fn pruned_candidates<D: Data<Elem = f32>>(
    row: &ArrayBase<D, Ix1>,
    cutoff_top_n: usize,
    cutoff_prob: f64,
    is_log_domain: bool,
) -> Vec<Candidate> {
    let mut ranked: Vec<(usize, f64)> = row
        .iter()
        .enumerate()
        .map(|(symbol, &value)| (symbol, value as f64))
        .collect();

    // exp is monotonic, so the raw values rank the same in both domains
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(cutoff_top_n);

    if cutoff_prob < 1.0 {
        let mut cumulative = 0.0;
        let mut keep = 0;
        for &(_, value) in &ranked {
            cumulative += if is_log_domain { rank_exp(value) } else { value };
            keep += 1;
            if cumulative >= cutoff_prob {
                break;
            }
        }
        ranked.truncate(keep);
    }

    ranked
        .into_iter()
        .map(|(symbol, value)| Candidate {
            symbol,
            log_prob: if is_log_domain {
                value
            } else {
                (value + PROB_FLOOR).ln()
            },
        })
        .collect()
}
