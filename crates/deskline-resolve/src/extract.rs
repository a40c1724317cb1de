//! Extraction of the suggested name from the advisor's free-text reply.
//!
//! Marker contract: the advisor prompt asks the backend to wrap a match, and
//! only a match, in `**double asterisks**`. This is an instruction to a
//! free-text generator, not a guarantee. If the prompt wording changes, this
//! module and its tests must change with it.

use once_cell::sync::Lazy;
use regex::Regex;

use deskline_store::name_key;

/// Opening and closing marker the advisor prompt asks for.
pub const MARKER: &str = "**";

static EMPHASIS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*\s*([^*\n]+?)\s*\*\*").unwrap());

/// Every non-empty span wrapped in the marker, in order of appearance.
pub fn marked_spans(text: &str) -> Vec<String> {
    EMPHASIS_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim_matches(|c: char| c.is_whitespace() || ".,;:!?。，".contains(c))
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// The suggested name, if the reply marks a known one.
///
/// Prefers a marked span that names a candidate exactly, then a span that
/// contains a whole candidate name as separate words (returned in the
/// candidate's spelling). Marked text that names no candidate is not a
/// suggestion.
pub fn extract_marked_name(text: &str, candidates: &[String]) -> Option<String> {
    let spans: Vec<String> = marked_spans(text).iter().map(|s| name_key(s)).collect();
    if spans.is_empty() {
        return None;
    }

    for key in &spans {
        if let Some(candidate) = candidates.iter().find(|c| name_key(c) == *key) {
            return Some(candidate.clone());
        }
    }

    for key in &spans {
        if let Some(candidate) = candidates
            .iter()
            .find(|c| contains_whole_name(key, &name_key(c)))
        {
            return Some(candidate.clone());
        }
    }

    None
}

/// True when `name` occurs in `span` bounded by non-alphanumerics on both sides.
fn contains_whole_name(span: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    span.match_indices(name).any(|(start, _)| {
        let before = span[..start].chars().next_back();
        let after = span[start + name.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
