//! Vocabulary table and byte-level detokenization.
//!
//! The tokenizer's vocabulary stores sub-word fragments in a byte-shifted
//! form: bytes that are not printable in the legacy single-byte encoding are
//! represented by character codes above 256 so every fragment is visible
//! text. Decoding reverses the shift and reinterprets the resulting bytes as
//! UTF-8, reconstructing multi-byte sequences the tokenizer split into
//! single visible characters.

use crate::error::{Result, SottoError};
use std::collections::HashMap;

/// Printable in the legacy encoding: `!..=~`, `¡..=¬`, `®..=ÿ`.
///
/// Everything else was shifted above 256 by the tokenizer's byte encoder.
fn is_shifted_byte(byte: u8) -> bool {
    !((b'!'..=b'~').contains(&byte)
        || (0xA1..=0xAC).contains(&byte)
        || (0xAE..=0xFF).contains(&byte))
}

/// Bidirectional token table, built once from the serialized fragment→id map
/// and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Dense id-indexed fragments; ids absent from the asset hold "".
    tokens: Vec<String>,
    /// Shifted-index → original byte, for codes above the shift boundary.
    byte_unshift: Vec<u8>,
}

impl Vocabulary {
    /// Parse the serialized fragment→id JSON object and invert it.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: HashMap<String, usize> =
            serde_json::from_str(json).map_err(|e| SottoError::VocabularyInvalid {
                message: e.to_string(),
            })?;

        if map.is_empty() {
            return Err(SottoError::VocabularyInvalid {
                message: "vocabulary is empty".to_string(),
            });
        }

        let table_len = map.values().max().map(|&max| max + 1).unwrap_or(0);
        let mut tokens = vec![String::new(); table_len];
        for (fragment, id) in map {
            tokens[id] = fragment;
        }

        let byte_unshift = (0u8..=255).filter(|&b| is_shifted_byte(b)).collect();

        Ok(Self {
            tokens,
            byte_unshift,
        })
    }

    /// Number of token ids in the table.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Decode a token id to text, or `None` when the id is out of range.
    ///
    /// Out-of-range ids (control tokens, end-of-text) contribute no text;
    /// the decoder skips them rather than failing the utterance.
    pub fn decode(&self, id: i32) -> Option<String> {
        if id < 0 || id as usize >= self.tokens.len() {
            return None;
        }
        Some(self.unshift(&self.tokens[id as usize]))
    }

    /// Reverse the byte-level shift and re-decode the fragment as UTF-8.
    fn unshift(&self, fragment: &str) -> String {
        let bytes: Vec<u8> = fragment
            .chars()
            .map(|ch| {
                let code = ch as u32;
                if code <= 256 {
                    code as u8
                } else {
                    self.byte_unshift
                        .get((code - 256) as usize)
                        .copied()
                        .unwrap_or(b'?')
                }
            })
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Forward shift used by the tokenizer: byte → visible character.
    fn shift_bytes(bytes: &[u8]) -> String {
        let shifted: Vec<u8> = (0u8..=255).filter(|&b| is_shifted_byte(b)).collect();
        bytes
            .iter()
            .map(|&b| {
                if is_shifted_byte(b) {
                    let index = shifted.iter().position(|&s| s == b).unwrap();
                    char::from_u32(256 + index as u32).unwrap()
                } else {
                    b as char
                }
            })
            .collect()
    }

    fn vocab_from(entries: &[(&str, usize)]) -> Vocabulary {
        let map: HashMap<&str, usize> = entries.iter().copied().collect();
        Vocabulary::from_json(&serde_json::to_string(&map).unwrap()).unwrap()
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            Vocabulary::from_json("not json"),
            Err(SottoError::VocabularyInvalid { .. })
        ));
    }

    #[test]
    fn test_empty_vocabulary_is_error() {
        assert!(matches!(
            Vocabulary::from_json("{}"),
            Err(SottoError::VocabularyInvalid { .. })
        ));
    }

    #[test]
    fn test_inversion_is_dense_by_id() {
        let vocab = vocab_from(&[("hello", 0), ("world", 2)]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.decode(0).unwrap(), "hello");
        // Unassigned slot decodes to no text
        assert_eq!(vocab.decode(1).unwrap(), "");
        assert_eq!(vocab.decode(2).unwrap(), "world");
    }

    #[test]
    fn test_out_of_range_ids_decode_to_none() {
        let vocab = vocab_from(&[("a", 0)]);
        assert!(vocab.decode(1).is_none());
        assert!(vocab.decode(-1).is_none());
        assert!(vocab.decode(50257).is_none());
    }

    #[test]
    fn test_shifted_space_prefix() {
        // The tokenizer represents a leading space as the shifted character
        // for byte 0x20 (code 256 + 32 = 'Ġ')
        let fragment = shift_bytes(b" hello");
        assert!(fragment.starts_with('\u{120}'));

        let vocab = vocab_from(&[(fragment.as_str(), 0)]);
        assert_eq!(vocab.decode(0).unwrap(), " hello");
    }

    #[test]
    fn test_multibyte_utf8_round_trip() {
        // Multi-byte UTF-8 text whose bytes the tokenizer shifted into
        // visible characters must reconstruct exactly
        for text in ["héllo", "grüß", "日本語", "naïve café"] {
            let fragment = shift_bytes(text.as_bytes());
            let vocab = vocab_from(&[(fragment.as_str(), 0)]);
            assert_eq!(vocab.decode(0).unwrap(), text, "round trip of {:?}", text);
        }
    }

    #[test]
    fn test_printable_ascii_passes_through() {
        let vocab = vocab_from(&[("The", 0), ("!?", 1)]);
        assert_eq!(vocab.decode(0).unwrap(), "The");
        assert_eq!(vocab.decode(1).unwrap(), "!?");
    }

    #[test]
    fn test_shift_table_covers_all_nonprintable_bytes() {
        let vocab = vocab_from(&[("a", 0)]);
        // 256 bytes minus the three printable ranges (94 + 12 + 82)
        assert_eq!(vocab.byte_unshift.len(), 256 - 94 - 12 - 82);
        assert!(vocab.byte_unshift.iter().all(|&b| is_shifted_byte(b)));
    }
}
