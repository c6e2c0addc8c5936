//! Pure text helpers shared by plan detection and cataloging.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

pub const TITLE_MAX_CHARS: usize = 80;

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("heading regex"));

/// Extract a plan title: the first `# ` heading (with an optional `Plan:`
/// prefix stripped), else the first non-empty line. Truncated to 80 chars.
pub fn extract_title(content: &str) -> String {
    let raw = HEADING_RE
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .or_else(|| {
            content
                .lines()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        })
        .unwrap_or_default();

    let stripped = raw
        .strip_prefix("Plan:")
        .or_else(|| raw.strip_prefix("plan:"))
        .map(|s| s.trim().to_string())
        .unwrap_or(raw);

    truncate_chars(&stripped, TITLE_MAX_CHARS)
}

/// Plan body: the content with its first heading line removed (if present).
pub fn extract_body(content: &str) -> String {
    let mut removed = false;
    let body: Vec<&str> = content
        .lines()
        .filter(|line| {
            if !removed && line.trim_start().starts_with('#') {
                removed = true;
                return false;
            }
            true
        })
        .collect();
    body.join("\n").trim().to_string()
}

/// Truncate to `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Whitespace-collapsed, case-folded, trimmed form used for hashing and
/// similarity. Deterministic for identical logical content.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim()
        .to_string()
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn content_hash(content: &str) -> String {
    sha256_hex(&normalize_content(content))
}

pub fn body_hash(content: &str) -> String {
    sha256_hex(&normalize_content(&extract_body(content)))
}

/// Length bucket over the normalized content; similarity is only compared
/// within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthBucket {
    Short,
    Medium,
    Long,
}

pub fn length_bucket(normalized: &str) -> LengthBucket {
    match normalized.chars().count() {
        0..=500 => LengthBucket::Short,
        501..=2000 => LengthBucket::Medium,
        _ => LengthBucket::Long,
    }
}

/// Words longer than 3 chars from normalized content, as a set.
pub fn significant_words(normalized: &str) -> BTreeSet<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .collect()
}

/// Jaccard word-overlap similarity over significant words.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = significant_words(a);
    let set_b = significant_words(b);
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

/// Filesystem-safe slug for plan filenames.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 60 {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "plan".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_heading_strips_plan_prefix() {
        assert_eq!(extract_title("# Plan: JWT Auth\n\nbody"), "JWT Auth");
        assert_eq!(extract_title("# JWT Auth\n\nbody"), "JWT Auth");
    }

    #[test]
    fn test_title_falls_back_to_first_line() {
        assert_eq!(extract_title("\nRefactor storage\nmore"), "Refactor storage");
    }

    #[test]
    fn test_title_truncation() {
        let long = "x".repeat(120);
        let title = extract_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_body_removes_first_heading_only() {
        let content = "# Title\n\nIntro.\n\n# Section\n\nDetail.";
        let body = extract_body(content);
        assert!(!body.contains("# Title"));
        assert!(body.contains("# Section"));
    }

    #[test]
    fn test_normalize_collapses_and_folds() {
        assert_eq!(
            normalize_content("  JWT   Auth\n\nPlan  "),
            "jwt auth plan"
        );
    }

    #[test]
    fn test_hashes_ignore_whitespace_and_case() {
        assert_eq!(content_hash("# A\nBody text"), content_hash("#  a\n  BODY   TEXT"));
        // Same body, different titles.
        assert_eq!(body_hash("# One\nshared body"), body_hash("# Two\nshared body"));
        assert_ne!(content_hash("# One\nshared body"), content_hash("# Two\nshared body"));
    }

    #[test]
    fn test_length_buckets() {
        assert_eq!(length_bucket(&"a".repeat(500)), LengthBucket::Short);
        assert_eq!(length_bucket(&"a".repeat(501)), LengthBucket::Medium);
        assert_eq!(length_bucket(&"a".repeat(2001)), LengthBucket::Long);
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert_eq!(jaccard_similarity("alpha beta gamma", "alpha beta gamma"), 1.0);
        assert_eq!(jaccard_similarity("alpha beta", "delta epsilon"), 0.0);
    }

    #[test]
    fn test_jaccard_at_exact_threshold_counts_as_duplicate() {
        // Three shared words out of a four-word union: exactly 0.75, which
        // sits on the duplicate side of the >= comparison.
        let similarity = jaccard_similarity("alpha beta gamma delta", "alpha beta gamma");
        assert_eq!(similarity, 0.75);
        assert!(similarity >= crate::catalog::SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_jaccard_ignores_short_words() {
        // "a", "is", "the" are all <= 3 chars and never counted.
        assert_eq!(
            jaccard_similarity("the auth token", "a is auth token"),
            1.0
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("JWT Auth"), "jwt-auth");
        assert_eq!(slugify("Dashboard — Timestamps, Sort, Tokens"), "dashboard-timestamps-sort-tokens");
        assert_eq!(slugify("!!!"), "plan");
    }
}
