use std::{collections::BTreeSet, ops::Range, sync::LazyLock};

use regex::Regex;

/// `#` followed by word characters, not glued to a preceding word character.
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w#])#(\w+)").expect("hashtag pattern is valid")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").expect("url pattern is valid"));

/// Extracts the normalized hashtag set from a note body.
///
/// Tokens are lowercased and stored without the leading `#`.
pub fn extract_hashtags(body: &str) -> BTreeSet<String> {
    HASHTAG_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalizes hashtag filter input so `#Work`, `work` and `WORK` compare equal.
/// Returns `None` when nothing is left after trimming.
pub fn normalize_hashtag(tag: &str) -> Option<String> {
    let trimmed = tag.trim().trim_start_matches('#').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Finds http(s) links in a note body, in order of appearance, without
/// duplicates. Trailing sentence punctuation is not part of the link.
pub fn extract_urls(body: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    URL_RE
        .find_iter(body)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '"', '\''])
        })
        .filter(|url| seen.insert(url.to_string()))
        .map(str::to_string)
        .collect()
}

/// Case-insensitive substring test used by the search filter.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Byte ranges of every non-overlapping case-insensitive occurrence of
/// `query` in `text`, for marking search matches.
pub fn match_spans(text: &str, query: &str) -> Vec<Range<usize>> {
    if query.is_empty() {
        return Vec::new();
    }
    let pattern = format!("(?i){}", regex::escape(query));
    match Regex::new(&pattern) {
        Ok(re) => re.find_iter(text).map(|m| m.start()..m.end()).collect(),
        Err(_) => Vec::new(),
    }
}
