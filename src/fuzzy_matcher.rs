use crate::history::HistoryEntry;
use colored::Colorize;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Score and matched character positions (char indices, not bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub score: i64,
    pub indices: Vec<usize>,
}

/// A history entry that survived filtering.
#[derive(Debug, Clone)]
pub struct RankedEntry<'a> {
    /// 1-based position in the listing, 1 being the most recent.
    pub position: usize,
    pub entry: &'a HistoryEntry,
    pub matched: MatchResult,
}

/// FZF-style matcher for history descriptions.
pub struct FzfMatcher {
    matcher: SkimMatcherV2,
}

impl FzfMatcher {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default().ignore_case(),
        }
    }

    pub fn fuzzy_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        self.matcher
            .fuzzy_indices(text, pattern)
            .map(|(score, indices)| MatchResult { score, indices })
    }

    /// Case-insensitive substring match.
    pub fn exact_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        let pattern: Vec<char> = pattern.chars().collect();
        let text: Vec<char> = text.chars().collect();
        let start = find_chars(&text, &pattern)?;
        let len = pattern.len();
        let score = 1000 + (len * 10) as i64;
        Some(MatchResult {
            score,
            indices: (start..start + len).collect(),
        })
    }

    pub fn prefix_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        let pattern: Vec<char> = pattern.chars().collect();
        let text: Vec<char> = text.chars().collect();
        if !starts_with_chars(&text, &pattern) {
            return None;
        }
        let len = pattern.len();
        Some(MatchResult {
            score: 800 + (len * 8) as i64,
            indices: (0..len).collect(),
        })
    }

    /// Try the strategies from strongest to weakest. An empty pattern matches everything.
    pub fn comprehensive_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        if pattern.is_empty() {
            return Some(MatchResult {
                score: 0,
                indices: Vec::new(),
            });
        }

        if let Some(result) = self.prefix_match(pattern, text) {
            return Some(result);
        }
        if let Some(result) = self.exact_match(pattern, text) {
            return Some(result);
        }
        self.fuzzy_match(pattern, text)
    }

    /// Filter entries (most recent first) by description or tag, best match first.
    ///
    /// A purely numeric pattern selects the entry at that listing position.
    pub fn filter_history<'a>(&self, pattern: &str, entries: &'a [HistoryEntry]) -> Vec<RankedEntry<'a>> {
        let pattern = pattern.trim();

        if let Ok(position) = pattern.parse::<usize>() {
            return entries
                .get(position.wrapping_sub(1))
                .map(|entry| RankedEntry {
                    position,
                    entry,
                    matched: MatchResult {
                        score: 1200,
                        indices: Vec::new(),
                    },
                })
                .into_iter()
                .collect();
        }

        let mut ranked: Vec<RankedEntry<'a>> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let by_description = self.comprehensive_match(pattern, &entry.description);
                let matched = by_description.or_else(|| {
                    // tag hits do not highlight the description
                    self.comprehensive_match(pattern, &entry.kind)
                        .map(|m| MatchResult {
                            score: m.score / 2,
                            indices: Vec::new(),
                        })
                })?;
                Some(RankedEntry {
                    position: i + 1,
                    entry,
                    matched,
                })
            })
            .collect();

        // higher score first, then most recent
        ranked.sort_by(|a, b| {
            b.matched
                .score
                .cmp(&a.matched.score)
                .then(a.position.cmp(&b.position))
        });
        ranked
    }

    /// Paint matched characters.
    pub fn highlight_matches(&self, text: &str, indices: &[usize]) -> String {
        if indices.is_empty() {
            return text.to_string();
        }

        let mut result = String::new();
        for (i, c) in text.chars().enumerate() {
            if indices.contains(&i) {
                result.push_str(&c.to_string().red().bold().to_string());
            } else {
                result.push(c);
            }
        }
        result
    }
}

impl Default for FzfMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// Compared per char so positions line up with the original text even when
// lowercasing changes the length (`İ` lowercases to two chars).
fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn starts_with_chars(text: &[char], pattern: &[char]) -> bool {
    text.len() >= pattern.len()
        && text
            .iter()
            .zip(pattern)
            .all(|(a, b)| chars_eq_ignore_case(*a, *b))
}

fn find_chars(text: &[char], pattern: &[char]) -> Option<usize> {
    if pattern.len() > text.len() {
        return None;
    }
    (0..=text.len() - pattern.len()).find(|&start| starts_with_chars(&text[start..], pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(description: &str, kind: &str) -> HistoryEntry {
        HistoryEntry {
            description: description.to_string(),
            timestamp: "2024-01-01 00:00:00".to_string(),
            is_batch: kind == "Batch",
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_match_strategies() {
        let matcher = FzfMatcher::new();

        let result = matcher.prefix_match("create", "Create account: Caja").unwrap();
        assert_eq!(result.score, 800 + 6 * 8);
        assert_eq!(result.indices, vec![0, 1, 2, 3, 4, 5]);

        let result = matcher.exact_match("caja", "Create account: Caja").unwrap();
        assert_eq!(result.score, 1000 + 4 * 10);
        assert_eq!(result.indices, vec![16, 17, 18, 19]);

        assert!(matcher.fuzzy_match("crt", "Create").is_some());
        assert!(matcher.exact_match("xyz", "Create").is_none());
        assert_eq!(matcher.comprehensive_match("", "anything").unwrap().score, 0);
    }

    #[test]
    fn test_exact_match_counts_chars() {
        let matcher = FzfMatcher::new();
        let result = matcher.exact_match("café", "Update category: Cafetería café").unwrap();
        assert_eq!(result.indices, vec![27, 28, 29, 30]);
    }

    #[test]
    fn test_match_positions_survive_case_folding() {
        let matcher = FzfMatcher::new();
        let found = matcher.exact_match("café", "İstanbul café").unwrap();
        assert_eq!(found.indices, vec![9, 10, 11, 12]);

        colored::control::set_override(true);
        let highlighted = matcher.highlight_matches("İstanbul café", &found.indices);
        assert!(highlighted.starts_with("İstanbul "));

        let prefix = matcher.prefix_match("ISTAN", "istanbul café").unwrap();
        assert_eq!(prefix.indices, vec![0, 1, 2, 3, 4]);
        assert!(matcher.prefix_match("istanbul café!", "istanbul café").is_none());
    }

    #[test]
    fn test_filter_history_ranks_and_keeps_positions() {
        let matcher = FzfMatcher::new();
        let entries = vec![
            entry("Import statement (3 changes)", "Batch"),
            entry("Delete account: Caja chica", "DeleteAccount"),
            entry("Create account: Caja", "CreateAccount"),
        ];

        let ranked = matcher.filter_history("caja", &entries);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.entry.description.contains("Caja")));
        assert_eq!(ranked[0].position, 2);

        let ranked = matcher.filter_history("batch", &entries);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].position, 1);
        assert!(ranked[0].matched.indices.is_empty());
    }

    #[test]
    fn test_filter_history_by_position() {
        let matcher = FzfMatcher::new();
        let entries = vec![entry("a", "CreateAccount"), entry("b", "CreateAccount")];

        let ranked = matcher.filter_history("2", &entries);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].entry.description, "b");
        assert!(matcher.filter_history("0", &entries).is_empty());
        assert!(matcher.filter_history("9", &entries).is_empty());
    }

    #[test]
    fn test_highlight_matches() {
        colored::control::set_override(true);
        let matcher = FzfMatcher::new();
        let highlighted = matcher.highlight_matches("Caja", &[0, 1]);
        assert!(highlighted.contains("\x1b["));
        assert!(highlighted.ends_with("ja"));
        assert_eq!(matcher.highlight_matches("Caja", &[]), "Caja");
    }
}
