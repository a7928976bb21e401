use crate::ConfigError;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlphabetError {
    #[error("unknown alphabet type {0:?} (expected \"characters\" or \"wordpiece\")")]
    UnknownAlphabet(String),
}

/// How decoded symbols are glued back into text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelJoin {
    /// Plain concatenation, one symbol per character.
    Characters,
    /// BERT style word pieces: `##` pieces continue the previous word, `[...]` pieces are
    /// special tokens and dropped, anything else starts a new word.
    WordPiece,
}

impl FromStr for LabelJoin {
    type Err = AlphabetError;

    fn from_str(alphabet_type: &str) -> Result<Self, Self::Err> {
        match alphabet_type {
            "characters" => Ok(LabelJoin::Characters),
            "wordpiece" => Ok(LabelJoin::WordPiece),
            other => Err(AlphabetError::UnknownAlphabet(other.to_string())),
        }
    }
}

/// Ordered output symbols of the acoustic model. Symbol `i` labels column `i` of every
/// probability row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn new<I, L>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(ConfigError::EmptyVocabulary);
        }
        Ok(Vocabulary { labels })
    }

    /// One symbol per character of `alphabet`.
    pub fn from_chars(alphabet: &str) -> Result<Self, ConfigError> {
        Self::new(alphabet.chars().map(String::from))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Index of the first symbol equal to `label`.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Renders decoded symbol indices as text. Indices outside the vocabulary are skipped.
    pub fn render(&self, tokens: &[usize], join: LabelJoin) -> String {
        let pieces = tokens.iter().filter_map(|&token| self.label(token));

        match join {
            LabelJoin::Characters => pieces.collect(),
            LabelJoin::WordPiece => {
                let mut text = String::new();
                for piece in pieces {
                    if let Some(rest) = piece.strip_prefix("##") {
                        text.push_str(rest);
                    } else if piece.is_empty() || piece.starts_with('[') {
                        continue;
                    } else {
                        text.push(' ');
                        text.push_str(piece);
                    }
                }
                // drop the separator in front of the first word
                match text.strip_prefix(' ') {
                    Some(rest) => rest.to_string(),
                    None => text,
                }
            }
        }
    }
}
