use once_cell::sync::Lazy;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base};
use tracing::warn;

const SIMPLE_CHARS_PER_TOKEN: usize = 4;

// Loaded once on first use; loading can fail if the embedded tables are unusable.
static CL100K_BPE: Lazy<Result<CoreBPE, String>> =
    Lazy::new(|| cl100k_base().map_err(|e| format!("failed to load cl100k_base: {e}")));

static O200K_BPE: Lazy<Result<CoreBPE, String>> =
    Lazy::new(|| o200k_base().map_err(|e| format!("failed to load o200k_base: {e}")));

/// Type of tokenizer to use for estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// `cl100k_base` BPE encoding (GPT-4, GPT-3.5; close enough for Claude)
    #[default]
    #[serde(alias = "cl100k_base")]
    Cl100k,
    /// `o200k_base` BPE encoding (GPT-4o)
    #[serde(alias = "o200k_base")]
    O200k,
    /// Character-based heuristic (~4 chars per token)
    Simple,
}

impl TokenizerKind {
    /// Creates a new tokenizer instance of this kind.
    ///
    /// Falls back to the simple heuristic when a BPE table cannot be loaded.
    #[must_use]
    pub fn create(self) -> Arc<dyn TokenEstimator> {
        let table = match self {
            Self::Cl100k => &*CL100K_BPE,
            Self::O200k => &*O200K_BPE,
            Self::Simple => return Arc::new(SimpleTokenizer),
        };

        match table {
            Ok(bpe) => Arc::new(BpeTokenizer { bpe, kind: self }),
            Err(e) => {
                warn!("{e}; falling back to the simple token heuristic");
                Arc::new(SimpleTokenizer)
            }
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cl100k => "cl100k",
            Self::O200k => "o200k",
            Self::Simple => "simple",
        };
        f.write_str(name)
    }
}

impl FromStr for TokenizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cl100k" | "cl100k_base" => Ok(Self::Cl100k),
            "o200k" | "o200k_base" => Ok(Self::O200k),
            "simple" | "heuristic" => Ok(Self::Simple),
            other => Err(format!(
                "unknown tokenizer '{other}' (expected cl100k, o200k or simple)"
            )),
        }
    }
}

/// Trait for estimating token counts in text.
///
/// Implementations must be deterministic for a fixed input and thread-safe.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// BPE tokenizer backed by a tiktoken encoding table.
struct BpeTokenizer {
    bpe: &'static CoreBPE,
    kind: TokenizerKind,
}

impl TokenEstimator for BpeTokenizer {
    fn estimate(&self, text: &str) -> usize {
        let text = text.trim();
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn name(&self) -> &'static str {
        match self.kind {
            TokenizerKind::O200k => "o200k_base",
            _ => "cl100k_base",
        }
    }
}

/// Simple character-based tokenizer.
///
/// Uses a heuristic of approximately 4 characters per token,
/// which works reasonably well for source code.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimpleTokenizer;

impl TokenEstimator for SimpleTokenizer {
    fn estimate(&self, text: &str) -> usize {
        let text = text.trim();
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count();
        char_count
            .saturating_add(SIMPLE_CHARS_PER_TOKEN - 1)
            .saturating_div(SIMPLE_CHARS_PER_TOKEN)
            .max(1)
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}
