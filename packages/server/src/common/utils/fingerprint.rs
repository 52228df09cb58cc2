use sha2::{Digest, Sha256};

/// Generate a content hash for duplicate detection
///
/// Uses SHA256 of normalized text to detect when content has changed.
/// Normalization rules:
/// - Convert to lowercase
/// - Remove all non-alphanumeric characters (except spaces)
/// - Collapse multiple spaces into single spaces
/// - Trim leading/trailing whitespace
///
/// This makes the hash robust against minor formatting changes while
/// still detecting meaningful content changes.
pub fn generate_content_hash(text: &str) -> String {
    // Normalize text
    let normalized = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    // Generate SHA256 hash
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute the fingerprint that keys a summarization job.
///
/// The fingerprint covers the normalized content hash, the summarization
/// mode, and the include-comments flag. The page URL deliberately does not
/// participate: the same content submitted under two URLs resolves to the
/// same job, and re-submitting identical content always lands on the
/// existing one.
pub fn job_fingerprint(content: &str, mode: &str, include_comments: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(generate_content_hash(content).as_bytes());
    hasher.update(b"\n");
    hasher.update(mode.as_bytes());
    hasher.update(b"\n");
    hasher.update(if include_comments { b"1" } else { b"0" });
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_same_hash() {
        let text1 = "The author argues remote work reshaped cities.";
        let text2 = "The author argues remote work reshaped cities.";

        assert_eq!(generate_content_hash(text1), generate_content_hash(text2));
    }

    #[test]
    fn test_case_insensitive() {
        let text1 = "Remote work reshaped American cities!";
        let text2 = "REMOTE WORK RESHAPED AMERICAN CITIES!";
        let text3 = "remote work reshaped american cities";

        let hash1 = generate_content_hash(text1);
        let hash2 = generate_content_hash(text2);
        let hash3 = generate_content_hash(text3);

        assert_eq!(hash1, hash2);
        assert_eq!(hash2, hash3);
    }

    #[test]
    fn test_punctuation_ignored() {
        let text1 = "Remote-first companies hire everywhere!";
        let text2 = "Remote first companies hire everywhere";
        let text3 = "Remote-first companies hire everywhere!!!";

        let hash1 = generate_content_hash(text1);
        let hash2 = generate_content_hash(text2);
        let hash3 = generate_content_hash(text3);

        assert_eq!(hash1, hash2);
        assert_eq!(hash2, hash3);
    }

    #[test]
    fn test_whitespace_normalized() {
        let text1 = "Commercial vacancy rates doubled downtown";
        let text2 = "Commercial    vacancy rates    doubled downtown";
        let text3 = "  Commercial vacancy rates doubled downtown  ";

        let hash1 = generate_content_hash(text1);
        let hash2 = generate_content_hash(text2);
        let hash3 = generate_content_hash(text3);

        assert_eq!(hash1, hash2);
        assert_eq!(hash2, hash3);
    }

    #[test]
    fn test_different_content_different_hash() {
        let text1 = "Vacancy rates doubled downtown";
        let text2 = "Vacancy rates halved downtown";

        assert_ne!(generate_content_hash(text1), generate_content_hash(text2));
    }

    #[test]
    fn test_word_order_matters() {
        let text1 = "Offices became apartments last year";
        let text2 = "Last year apartments became offices";

        // Word order DOES matter - these should have different hashes
        assert_ne!(generate_content_hash(text1), generate_content_hash(text2));
    }

    #[test]
    fn test_hash_format() {
        let hash = generate_content_hash("Test content");

        // SHA256 hash should be 64 hex characters
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_string() {
        let hash = generate_content_hash("");
        assert_eq!(hash.len(), 64); // Still produces valid hash
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = job_fingerprint("An essay about housing policy.", "standard", false);
        let b = job_fingerprint("An essay about housing policy.", "standard", false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_normalizes_content() {
        let a = job_fingerprint("An essay about housing policy.", "standard", false);
        let b = job_fingerprint("  AN ESSAY about housing   policy!  ", "standard", false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_by_mode() {
        let standard = job_fingerprint("An essay about housing policy.", "standard", false);
        let critical = job_fingerprint("An essay about housing policy.", "critical_analysis", false);
        assert_ne!(standard, critical);
    }

    #[test]
    fn test_fingerprint_varies_by_comments_flag() {
        let without = job_fingerprint("An essay about housing policy.", "standard", false);
        let with = job_fingerprint("An essay about housing policy.", "standard", true);
        assert_ne!(without, with);
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = job_fingerprint("content", "standard", true);
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
