//! Text normalization and near-duplicate detection.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Lowercase, drop punctuation and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Set of normalized word tokens.
pub fn token_set(text: &str) -> HashSet<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Jaccard similarity of the token sets of `a` and `b`.
///
/// Two texts without any words are treated as identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);

    if left.is_empty() && right.is_empty() {
        return 1.0;
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

/// Whether two aspect texts say the same thing.
pub fn is_near_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    normalize(a) == normalize(b) || jaccard(a, b) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  What  causes\tTIDES?! "), "what causes tides");
        assert_eq!(normalize("Économie, et société"), "économie et société");
        assert_eq!(normalize("...!"), "");
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("a b c d", "a b c e") - 0.6).abs() < 1e-9);
        assert_eq!(jaccard("", "?"), 1.0);
    }

    #[test]
    fn test_near_duplicate() {
        assert!(is_near_duplicate("Role of the Moon", "role of the moon!", 0.8));
        assert!(is_near_duplicate(
            "gravitational pull of the moon on oceans",
            "the gravitational pull of the moon on the oceans",
            0.8
        ));
        assert!(!is_near_duplicate("role of the moon", "role of the sun", 0.8));
    }
}
