use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("invalid tag regex"))
}

/// Strip HTML tags and collapse runs of whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = tag_pattern().replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to `max_len` characters, preserving word boundaries.
/// Appends an ellipsis when truncated.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_len).collect();
    let truncated = match cut.rfind(' ') {
        Some(pos) => &cut[..pos],
        None => cut.as_str(),
    };
    format!("{truncated}...")
}

/// SHA-256 content hash for deduplication, hex-encoded.
/// Empty input hashes to the empty string so blank bodies never collide.
pub fn content_hash(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_tags_and_whitespace() {
        assert_eq!(
            clean_text("<p>Hello   <b>world</b></p>\n\n  today"),
            "Hello world today"
        );
    }

    #[test]
    fn clean_text_empty() {
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn truncate_preserves_word_boundary() {
        let text = "the quick brown fox jumps over the lazy dog";
        let truncated = truncate_text(text, 20);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 23);
        // Never cuts mid-word
        assert_eq!(truncated, "the quick brown fox...");
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate_text("short", 500), "short");
    }

    #[test]
    fn content_hash_is_stable_sha256() {
        let a = content_hash("same content");
        let b = content_hash("same content");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(content_hash("other"), a);
    }

    #[test]
    fn content_hash_empty_is_empty() {
        assert_eq!(content_hash(""), "");
    }
}
