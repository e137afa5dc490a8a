// ============================================================
// Layer 4 — Text Encoding
// ============================================================
// Turns cleaned text into the fixed-length integer form the
// encoder consumes:
//
//   [CLS] t1 t2 ... tn [SEP] [PAD] [PAD] ...
//    └───────── max_seq_len tokens ─────────┘
//
// Long texts are truncated BEFORE the closing [SEP] so every
// sequence still ends its real content with [SEP].
// attention_mask marks real tokens with 1 and padding with 0.
//
// This is a pure function of (tokenizer, text, max_seq_len).

use anyhow::Result;
use tokenizers::Tokenizer;

pub const PAD_ID: u32 = 0;
pub const CLS_ID: u32 = 101;
pub const SEP_ID: u32 = 102;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedText {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
}

/// Wrap raw token ids with [CLS]/[SEP], truncate and pad.
pub fn frame_token_ids(content: &[u32], max_seq_len: usize) -> EncodedText {
    // Room for [CLS] and [SEP]; anything shorter than 2 is meaningless.
    let max_seq_len = max_seq_len.max(2);
    let keep = content.len().min(max_seq_len - 2);

    let mut input_ids = Vec::with_capacity(max_seq_len);
    input_ids.push(CLS_ID);
    input_ids.extend_from_slice(&content[..keep]);
    input_ids.push(SEP_ID);

    let real = input_ids.len();
    let mut attention_mask = vec![1u32; real];

    input_ids.resize(max_seq_len, PAD_ID);
    attention_mask.resize(max_seq_len, 0);

    EncodedText { input_ids, attention_mask }
}

/// Tokenise `text` and frame it to exactly `max_seq_len` tokens.
pub fn encode_text(tokenizer: &Tokenizer, text: &str, max_seq_len: usize) -> Result<EncodedText> {
    let enc = tokenizer
        .encode(text, false)
        .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
    Ok(frame_token_ids(enc.get_ids(), max_seq_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_padded() {
        let enc = frame_token_ids(&[7, 8], 6);
        assert_eq!(enc.input_ids,      vec![CLS_ID, 7, 8, SEP_ID, PAD_ID, PAD_ID]);
        assert_eq!(enc.attention_mask, vec![1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_long_text_is_truncated_but_keeps_sep() {
        let content: Vec<u32> = (200..300).collect();
        let enc = frame_token_ids(&content, 8);
        assert_eq!(enc.input_ids.len(), 8);
        assert_eq!(enc.input_ids[0], CLS_ID);
        assert_eq!(enc.input_ids[7], SEP_ID);
        assert!(enc.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_length_is_constant() {
        for n in [0usize, 1, 5, 50] {
            let content: Vec<u32> = vec![500; n];
            assert_eq!(frame_token_ids(&content, 16).input_ids.len(), 16);
        }
    }
}
