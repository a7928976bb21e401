use crate::bsearch_ctc::DecodedBeam;
use crate::{ItemError, SearchError};
use log::{debug, warn};
use ndarray::{Array2, Array3};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, Ordering};

/// Ranked beams of every item of a batch, in input order.
#[derive(Clone, Debug)]
pub struct BatchOutput {
    pub beam_size: usize,
    /// Timestep count of the input tensor, the widest any beam can be.
    pub max_timesteps: usize,
    pub items: Vec<Result<Vec<DecodedBeam>, ItemError>>,
}

/// Rectangular form of a [`BatchOutput`]. Padding is zero, with a score of `-inf` for beams
/// that do not exist.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchArrays {
    /// `[batch, beam_size, max_timesteps]`
    pub tokens: Array3<i32>,
    /// `[batch, beam_size]`, number of valid entries in `tokens` and `timesteps`.
    pub lengths: Array2<i32>,
    /// `[batch, beam_size]`
    pub scores: Array2<f32>,
    /// `[batch, beam_size, max_timesteps]`
    pub timesteps: Array3<i32>,
}

impl BatchOutput {
    pub(crate) fn new(
        beam_size: usize,
        max_timesteps: usize,
        items: Vec<Result<Vec<DecodedBeam>, ItemError>>,
    ) -> Self {
        BatchOutput {
            beam_size,
            max_timesteps,
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Top beam of `item`, `None` if the item failed or is out of range.
    pub fn best(&self, item: usize) -> Option<&DecodedBeam> {
        match self.items.get(item) {
            Some(Ok(beams)) => beams.first(),
            _ => None,
        }
    }

    pub fn to_arrays(&self) -> BatchArrays {
        let batch_size = self.items.len();
        let mut tokens = Array3::<i32>::zeros((batch_size, self.beam_size, self.max_timesteps));
        let mut timesteps = Array3::<i32>::zeros((batch_size, self.beam_size, self.max_timesteps));
        let mut lengths = Array2::<i32>::zeros((batch_size, self.beam_size));
        let mut scores = Array2::<f32>::from_elem((batch_size, self.beam_size), f32::NEG_INFINITY);

        for (b, item) in self.items.iter().enumerate() {
            let beams = match item {
                Ok(beams) => beams,
                Err(_) => continue,
            };
            for (k, beam) in beams.iter().take(self.beam_size).enumerate() {
                scores[[b, k]] = beam.score;
                lengths[[b, k]] = beam.len() as i32;
                for (t, (&token, &timestep)) in beam
                    .tokens
                    .iter()
                    .zip(beam.timesteps.iter())
                    .take(self.max_timesteps)
                    .enumerate()
                {
                    tokens[[b, k, t]] = token as i32;
                    timesteps[[b, k, t]] = timestep as i32;
                }
            }
        }

        BatchArrays {
            tokens,
            lengths,
            scores,
            timesteps,
        }
    }
}

/// Runs `decode` for every item index on `pool` and collects the results in item order.
///
/// When `cancel` is raised, items that have not started yet report [`SearchError::Cancelled`].
pub(crate) fn decode_items<F>(
    pool: &ThreadPool,
    batch_size: usize,
    cancel: Option<&AtomicBool>,
    decode: F,
) -> Vec<Result<Vec<DecodedBeam>, ItemError>>
where
    F: Fn(usize) -> Result<Vec<DecodedBeam>, SearchError> + Sync,
{
    debug!(
        "decoding batch of {} items on {} workers",
        batch_size,
        pool.current_num_threads()
    );

    let items: Vec<Result<Vec<DecodedBeam>, ItemError>> = pool.install(|| {
        (0..batch_size)
            .into_par_iter()
            .map(|item| {
                if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                    return Err(ItemError {
                        item,
                        source: SearchError::Cancelled,
                    });
                }
                decode(item).map_err(|source| {
                    warn!("item {} failed: {}", item, source);
                    ItemError { item, source }
                })
            })
            .collect()
    });

    debug!(
        "batch done, {} of {} items failed",
        items.iter().filter(|item| item.is_err()).count(),
        batch_size
    );
    items
}
