use crate::bsearch_ctc::DecodedBeam;
use crate::fast_math::PROB_FLOOR;
use ndarray::{ArrayBase, Data, Ix2};

/// Best path decoding of a `[timesteps, V]` sequence.
///
/// Picks the most probable symbol at every timestep (the lower index on ties), collapses
/// consecutive repeats and drops blanks. Each token is aligned to the first timestep of its run,
/// and the score is the log-probability of the whole picked path, blanks included.
pub(crate) fn greedy_ctc<D: Data<Elem = f32>>(
    prob_seq: &ArrayBase<D, Ix2>,
    blank_id: usize,
    is_log_domain: bool,
) -> DecodedBeam {
    let mut last_label = None;
    let mut tokens = Vec::new();
    let mut timesteps = Vec::new();
    let mut score = 0.0f64;

    for (pos, row) in prob_seq.outer_iter().enumerate() {
        let mut label = 0;
        let mut best = f32::NEG_INFINITY;
        for (symbol, &value) in row.iter().enumerate() {
            if value > best {
                best = value;
                label = symbol;
            }
        }

        score += if is_log_domain {
            best as f64
        } else {
            (best as f64 + PROB_FLOOR).ln()
        };

        if last_label == Some(label) {
            continue;
        }
        last_label = Some(label);

        if label != blank_id {
            tokens.push(label);
            timesteps.push(pos);
        }
    }

    DecodedBeam {
        tokens,
        timesteps,
        score: score as f32,
    }
}
