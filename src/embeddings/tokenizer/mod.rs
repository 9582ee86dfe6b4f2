
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, Rank};

use crate::Result;

/// Tokens a window edge may cut out of a single character. cl100k falls back
/// to single bytes, and a UTF-8 character is at most four bytes long.
const MAX_PARTIAL_TOKENS: usize = 3;

/// Byte pair encoder shared by ingestion and querying.
///
/// Uses the `cl100k_base` vocabulary, so `chunk_size` and `overlap` count the
/// same tokens the embedding models are billed and limited by. Special token
/// markers in the text are encoded as plain text.
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

/// Token ids of one text
#[derive(Clone)]
pub struct TokenizedText<'a> {
    bpe: &'a CoreBPE,
    tokens: Vec<Rank>,
}

impl Tokenizer {
    #[inline]
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    #[inline]
    pub fn tokenize(&self, text: &str) -> TokenizedText<'_> {
        TokenizedText {
            bpe: &self.bpe,
            tokens: self.bpe.encode_ordinary(text),
        }
    }

    #[inline]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenize(text).len()
    }
}

impl fmt::Debug for Tokenizer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tokenizer(cl100k_base)")
    }
}

impl TokenizedText<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn tokens(&self) -> &[Rank] {
        &self.tokens
    }

    /// Text of the tokens in `range`.
    ///
    /// When an edge of the range splits a multi-byte character, the tokens
    /// holding the partial character are left out. The fewest tokens that
    /// give valid UTF-8 are dropped.
    #[inline]
    pub fn decode(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.tokens.len());
        for skipped in 0..=2 * MAX_PARTIAL_TOKENS {
            for skip_start in 0..=skipped.min(MAX_PARTIAL_TOKENS) {
                let skip_end = skipped - skip_start;
                if skip_end > MAX_PARTIAL_TOKENS {
                    continue;
                }
                let start = range.start + skip_start;
                let stop = end.saturating_sub(skip_end);
                let Some(window) = self.tokens.get(start..stop) else {
                    continue;
                };
                if window.is_empty() {
                    continue;
                }
                if let Ok(text) = self.bpe.decode(window.to_vec()) {
                    return text;
                }
            }
        }
        String::new()
    }
}

impl fmt::Debug for TokenizedText<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizedText")
            .field("tokens", &self.tokens)
            .finish()
    }
}
