use std::collections::VecDeque;

const SUGGESTION_SUFFIXES: &[&str] =
    &["guitar remix", "slowed", "lyrics", "official video", "acoustic", "cover", "live"];
const MAX_SUGGESTIONS: usize = 6;
pub const MAX_RECENT: usize = 10;

/// Query variations offered while the user types.
pub fn suggestions(query: &str) -> Vec<String> {
    let q = query.trim();
    if q.is_empty() {
        return Vec::new();
    }
    std::iter::once(q.to_string())
        .chain(SUGGESTION_SUFFIXES.iter().map(|s| format!("{q} {s}")))
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// Session-scoped search history, newest first.
#[derive(Debug, Default)]
pub struct RecentSearches {
    entries: VecDeque<String>,
}

impl RecentSearches {
    pub fn record(&mut self, query: &str) {
        let q = query.trim();
        if q.is_empty() {
            return;
        }
        self.entries.retain(|e| !e.eq_ignore_ascii_case(q));
        self.entries.push_front(q.to_string());
        self.entries.truncate(MAX_RECENT);
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_start_with_query_and_cap() {
        let s = suggestions("  daft punk ");
        assert_eq!(s.len(), 6);
        assert_eq!(s[0], "daft punk");
        assert_eq!(s[1], "daft punk guitar remix");
        assert_eq!(s[5], "daft punk acoustic");
        assert!(suggestions("   ").is_empty());
    }

    #[test]
    fn recent_searches_dedupe_and_cap() {
        let mut r = RecentSearches::default();
        for i in 0..12 {
            r.record(&format!("q{i}"));
        }
        r.record("Q5");
        let list = r.list();
        assert_eq!(list.len(), MAX_RECENT);
        assert_eq!(list[0], "Q5");
        assert_eq!(list.iter().filter(|e| e.eq_ignore_ascii_case("q5")).count(), 1);
    }
}
