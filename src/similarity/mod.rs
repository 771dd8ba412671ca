//! Content hashing and token-set similarity.
//!
//! Duplicate and blocked-content detection both key off the same two
//! primitives: a normalized SHA256 content digest for exact matches and a
//! word-token Jaccard index for near matches.
//!
//! Content is normalized before hashing so minor formatting differences
//! (case, internal whitespace) do not defeat exact-match detection.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Length of the truncated content digest in hex characters (64 bits).
const DIGEST_HEX_LEN: usize = 16;

/// Splits text into lowercase word tokens.
///
/// Deterministic; empty or whitespace-only input yields an empty vector.
///
/// # Example
///
/// ```rust
/// use tacit::similarity::tokenize;
///
/// assert_eq!(tokenize("Prefer Small PRs"), vec!["prefer", "small", "prs"]);
/// assert!(tokenize("   ").is_empty());
/// ```
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Normalizes content for consistent hashing.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Convert to lowercase
/// 3. Collapse runs of whitespace to single spaces
#[must_use]
pub fn normalize(content: &str) -> String {
    content
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes the truncated SHA256 digest of normalized content.
///
/// Returns the first 16 lowercase hex characters (64 bits) of the digest.
/// Deterministic and insensitive to case and whitespace differences:
/// `hash_content("A  b") == hash_content("a b")`.
///
/// # Example
///
/// ```rust
/// use tacit::similarity::hash_content;
///
/// let hash = hash_content("Use PostgreSQL for primary storage");
/// assert_eq!(hash.len(), 16);
/// assert_eq!(hash, hash_content("  use  postgresql  for  primary  storage  "));
/// ```
#[must_use]
pub fn hash_content(content: &str) -> String {
    let normalized = normalize(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..DIGEST_HEX_LEN].to_string()
}

/// Computes the Jaccard similarity between the token sets of two texts.
///
/// Returns the ratio of shared tokens to the union of tokens, in `[0, 1]`.
/// Symmetric in its arguments. Two inputs that both tokenize to empty sets
/// are considered identical (`1.0`); if exactly one side is empty the
/// similarity is `0.0`.
#[must_use]
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<String> = tokenize(a).into_iter().collect();
    let tokens_b: HashSet<String> = tokenize(b).into_iter().collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}
