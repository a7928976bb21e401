use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights applied to a word-level [`Scorer`](crate::Scorer): every completed word adds
/// `alpha * score + beta` to the ranking score of the beam that completed it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmWeights {
    pub alpha: f64,
    pub beta: f64,
}

/// Search parameters, validated once when a [`CtcBeamDecoder`](crate::CtcBeamDecoder) is built.
///
/// Deserializes from JSON with every field optional; missing fields take the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Beams kept after every timestep and returned per sequence.
    pub beam_size: usize,
    /// Only the `cutoff_top_n` most probable symbols of a timestep are expanded.
    ///
    /// The default of 40 is larger than any vocabulary under 40 symbols, which
    /// [`validate`](Self::validate) rejects. Lower it to at most the vocabulary size for those.
    pub cutoff_top_n: usize,
    /// Cumulative probability at which the per-timestep candidate list is cut. `1.0` disables the
    /// cut.
    pub cutoff_prob: f64,
    pub blank_id: usize,
    /// Worker threads used for batch decoding.
    pub num_processes: usize,
    /// Input rows hold log-probabilities rather than probabilities.
    pub is_log_domain: bool,
    /// Scorer weights; only consulted when a scorer is attached.
    pub lm_weights: Option<LmWeights>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            beam_size: 100,
            cutoff_top_n: 40,
            cutoff_prob: 1.0,
            blank_id: 0,
            num_processes: 4,
            is_log_domain: false,
            lm_weights: None,
        }
    }
}

impl DecoderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks every field against a vocabulary of `vocab_size` symbols.
    pub fn validate(&self, vocab_size: usize) -> Result<(), ConfigError> {
        if vocab_size == 0 {
            return Err(ConfigError::EmptyVocabulary);
        }
        if self.beam_size == 0 {
            return Err(ConfigError::ZeroBeamSize);
        }
        if self.cutoff_top_n == 0 || self.cutoff_top_n > vocab_size {
            return Err(ConfigError::CutoffTopN {
                value: self.cutoff_top_n,
                vocab_size,
            });
        }
        if !(self.cutoff_prob > 0.0 && self.cutoff_prob <= 1.0) {
            return Err(ConfigError::CutoffProb(self.cutoff_prob));
        }
        if self.blank_id >= vocab_size {
            return Err(ConfigError::BlankId {
                blank_id: self.blank_id,
                vocab_size,
            });
        }
        if self.num_processes == 0 {
            return Err(ConfigError::ZeroProcesses);
        }
        if let Some(weights) = self.lm_weights {
            check_weight("alpha", weights.alpha)?;
            check_weight("beta", weights.beta)?;
        }
        Ok(())
    }
}

fn check_weight(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeWeight { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DecoderConfig {
        DecoderConfig {
            cutoff_top_n: 7,
            ..DecoderConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid_for_large_vocabularies() {
        assert!(DecoderConfig::default().validate(40).is_ok());
        assert!(matches!(
            DecoderConfig::default().validate(7),
            Err(ConfigError::CutoffTopN {
                value: 40,
                vocab_size: 7
            })
        ));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let cases = vec![
            DecoderConfig {
                beam_size: 0,
                ..config()
            },
            DecoderConfig {
                cutoff_top_n: 0,
                ..config()
            },
            DecoderConfig {
                cutoff_prob: 0.0,
                ..config()
            },
            DecoderConfig {
                cutoff_prob: 1.5,
                ..config()
            },
            DecoderConfig {
                cutoff_prob: f64::NAN,
                ..config()
            },
            DecoderConfig {
                blank_id: 7,
                ..config()
            },
            DecoderConfig {
                num_processes: 0,
                ..config()
            },
            DecoderConfig {
                lm_weights: Some(LmWeights {
                    alpha: -0.5,
                    beta: 1.0,
                }),
                ..config()
            },
        ];
        for case in cases {
            assert!(case.validate(7).is_err(), "{:?} should be rejected", case);
        }
        assert!(config().validate(0).is_err());
        assert!(config().validate(7).is_ok());
    }

    #[test]
    fn loads_partial_json() {
        let config = DecoderConfig::from_json_str(
            r#"{ "beam_size": 20, "blank_id": 6, "lm_weights": { "alpha": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.beam_size, 20);
        assert_eq!(config.blank_id, 6);
        assert_eq!(config.cutoff_top_n, 40);
        assert_eq!(
            config.lm_weights,
            Some(LmWeights {
                alpha: 0.5,
                beta: 0.0
            })
        );
        assert!(matches!(
            DecoderConfig::from_json_str("{ \"beam_size\": -1 }"),
            Err(ConfigError::Json(_))
        ));
    }
}
