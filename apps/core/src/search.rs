use crate::model::WindowEntry;

/// Keeps the entries a switcher should show for `normalized_query`, in the
/// order they were given.
///
/// An empty query lists every titled window without running the matcher.
/// Otherwise a titled window is kept when the query is a subsequence of its
/// lowercased title or of its lowercased process name.
pub fn filter_windows(entries: &[WindowEntry], normalized_query: &str) -> Vec<WindowEntry> {
    if normalized_query.is_empty() {
        return entries
            .iter()
            .filter(|entry| entry.has_title())
            .cloned()
            .collect();
    }

    entries
        .iter()
        .filter(|entry| entry.has_title() && entry_matches(entry, normalized_query))
        .cloned()
        .collect()
}

fn entry_matches(entry: &WindowEntry, normalized_query: &str) -> bool {
    is_fuzzy_match(normalized_query, entry.normalized_title())
        || is_fuzzy_match(normalized_query, entry.normalized_process_name())
}

/// True when every char of `query` occurs in `candidate` in the same order.
///
/// Single left-to-right pass: each query char resumes the scan right after
/// the position consumed by the previous one. No case folding happens here.
pub fn is_fuzzy_match(query: &str, candidate: &str) -> bool {
    let mut remaining = candidate.chars();
    query
        .chars()
        .all(|wanted| remaining.by_ref().any(|found| found == wanted))
}

/// Char indices consumed by the same greedy scan as [`is_fuzzy_match`], or
/// `None` when the query is not a subsequence.
pub fn match_positions(query: &str, candidate: &str) -> Option<Vec<usize>> {
    let mut positions = Vec::with_capacity(query.chars().count());
    let mut remaining = candidate.chars().enumerate();

    for wanted in query.chars() {
        let (index, _) = remaining.by_ref().find(|(_, found)| *found == wanted)?;
        positions.push(index);
    }

    Some(positions)
}

#[cfg(test)]
mod tests {
    use super::{filter_windows, is_fuzzy_match, match_positions};
    use crate::model::{WindowEntry, WindowHandle};

    #[test]
    fn matches_scattered_subsequence() {
        assert!(is_fuzzy_match("vsc", "visual studio code"));
        assert!(is_fuzzy_match("code", "visual studio code"));
    }

    #[test]
    fn never_backtracks() {
        assert!(!is_fuzzy_match("ab", "ba"));
        assert!(!is_fuzzy_match("aa", "a"));
    }

    #[test]
    fn query_longer_than_candidate_fails() {
        assert!(!is_fuzzy_match("notepad++", "notepad"));
        assert!(!is_fuzzy_match("x", ""));
    }

    #[test]
    fn matcher_is_case_sensitive() {
        assert!(!is_fuzzy_match("V", "visual"));
    }

    #[test]
    fn positions_use_char_indices() {
        assert_eq!(match_positions("éa", "xéya"), Some(vec![1, 3]));
        assert_eq!(match_positions("", "anything"), Some(Vec::new()));
        assert_eq!(match_positions("ab", "ba"), None);
    }

    #[test]
    fn process_name_can_carry_the_match() {
        let entries = vec![WindowEntry::new(
            WindowHandle(1),
            "Untitled - Document",
            "WINWORD",
        )];

        let results = filter_windows(&entries, "wwrd");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn untitled_windows_never_match() {
        let entries = vec![WindowEntry::new(WindowHandle(1), "", "explorer")];

        assert!(filter_windows(&entries, "").is_empty());
        assert!(filter_windows(&entries, "exp").is_empty());
    }
}
