//! Input URL normalization: trim, dedup, ledger diff, and the
//! known-unsupported pattern filter.

use regex::Regex;
use std::collections::HashSet;
use tracing::info;

/// Endpoint shapes the remote service is known not to convert: series index
/// pages and author listings. Matching URLs go straight to the error ledger
/// without a resolver call.
pub const DEFAULT_UNSUPPORTED_PATTERNS: [&str; 2] =
    [r"\barchiveofourown\.org/series\b", r"\bfanfiction\.net/u\b"];

/// Compiled unsupported-URL rules.
#[derive(Debug)]
pub struct UnsupportedFilter {
    rules: Vec<Regex>,
}

impl UnsupportedFilter {
    /// Compile the built-in rules. The patterns are literals, so this cannot
    /// fail.
    pub fn default_rules() -> Self {
        Self::from_patterns(&DEFAULT_UNSUPPORTED_PATTERNS.map(String::from))
            .unwrap_or(Self { rules: Vec::new() })
    }

    /// Compile caller-supplied rules (e.g. from the config file). An invalid
    /// pattern is reported with its source text.
    pub fn from_patterns(patterns: &[String]) -> Result<Self, String> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let rule = Regex::new(pattern)
                .map_err(|e| format!("Invalid unsupported-URL pattern {:?}: {}", pattern, e))?;
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn is_unsupported(&self, url: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(url))
    }
}

/// One batch after normalization. `working` is what this run will process;
/// `input` and `deduped` are kept for reporting totals.
#[derive(Debug, Clone, Default)]
pub struct UrlBatch {
    pub input: Vec<String>,
    pub deduped: Vec<String>,
    pub working: Vec<String>,
}

/// Trim and sanitize raw inputs, dedup by exact value keeping first-seen
/// order, then diff against the ledger's already-recorded set. Reads nothing
/// and writes nothing; the caller supplies the ledger contents.
pub fn normalize(raw_inputs: &[String], already_recorded: &HashSet<String>) -> UrlBatch {
    let input: Vec<String> = raw_inputs
        .iter()
        .map(|s| sanitize_input(s))
        .filter(|s| !s.is_empty())
        .collect();

    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for url in &input {
        if seen.insert(url.clone()) {
            deduped.push(url.clone());
        }
    }

    let working: Vec<String> = deduped
        .iter()
        .filter(|url| !already_recorded.contains(*url))
        .cloned()
        .collect();

    info!(
        input = input.len(),
        deduped = deduped.len(),
        working = working.len(),
        "normalized input batch"
    );

    UrlBatch {
        input,
        deduped,
        working,
    }
}

/// Trim whitespace and drop the replacement characters that lossy decoding
/// of a byte input leaves behind. Undecodable bytes disappear rather than
/// failing the batch.
fn sanitize_input(s: &str) -> String {
    s.chars().filter(|&c| c != '\u{FFFD}').collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let batch = normalize(&urls(&["A", "A", "B"]), &HashSet::new());
        assert_eq!(batch.deduped, urls(&["A", "B"]));
        assert_eq!(batch.working, urls(&["A", "B"]));
        assert_eq!(batch.input.len(), 3);
    }

    #[test]
    fn ledger_diff_excludes_recorded_urls_from_working_only() {
        let recorded: HashSet<String> = ["A".to_string()].into();
        let batch = normalize(&urls(&["A", "B", "C"]), &recorded);
        assert_eq!(batch.deduped.len(), 3);
        assert_eq!(batch.working, urls(&["B", "C"]));
    }

    #[test]
    fn whitespace_is_trimmed_and_blanks_dropped() {
        let batch = normalize(&urls(&["  A  ", "", "   ", "B\n"]), &HashSet::new());
        assert_eq!(batch.input, urls(&["A", "B"]));
    }

    #[test]
    fn replacement_chars_from_lossy_decode_are_dropped() {
        let batch = normalize(
            &urls(&["https://example.com/s/1\u{FFFD}"]),
            &HashSet::new(),
        );
        assert_eq!(batch.input, urls(&["https://example.com/s/1"]));
    }

    #[test]
    fn default_rules_match_series_and_author_pages() {
        let filter = UnsupportedFilter::default_rules();
        assert!(filter.is_unsupported("https://archiveofourown.org/series/12345"));
        assert!(filter.is_unsupported("https://www.fanfiction.net/u/98765/author"));
        assert!(!filter.is_unsupported("https://archiveofourown.org/works/12345"));
        assert!(!filter.is_unsupported("https://www.fanfiction.net/s/98765/1/story"));
    }

    #[test]
    fn custom_patterns_compile_and_match() {
        let filter =
            UnsupportedFilter::from_patterns(&[r"example\.org/collections".to_string()]).unwrap();
        assert!(filter.is_unsupported("https://example.org/collections/abc"));
        assert!(!filter.is_unsupported("https://example.org/works/abc"));
    }

    #[test]
    fn invalid_pattern_reports_source_text() {
        let err = UnsupportedFilter::from_patterns(&["([".to_string()]).unwrap_err();
        assert!(err.contains("(["));
    }
}
