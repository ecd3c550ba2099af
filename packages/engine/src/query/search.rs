// packages/engine/src/query/search.rs
//! Full-text and fuzzy search over flattened events

use crate::query::flatten::{event_document, flatten, DecodedBodies};
use crate::recording::event::InterceptedEvent;

/// Events containing every whitespace-separated token of `query`
///
/// Matching is case-insensitive. An empty query matches every event.
pub fn full_text_search(
    events: &[InterceptedEvent],
    query: &str,
    max_depth: usize,
) -> Vec<InterceptedEvent> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return events.to_vec();
    }

    events
        .iter()
        .filter(|event| {
            let text = flatten(&event_document(event, DecodedBodies::default()), max_depth);
            contains_all(&text, &tokens)
        })
        .cloned()
        .collect()
}

/// Events whose flattened text is at least `threshold` similar to `query`
pub fn fuzzy_search(
    events: &[InterceptedEvent],
    query: &str,
    threshold: f64,
    max_depth: usize,
) -> Vec<InterceptedEvent> {
    let threshold = threshold.clamp(0.0, 1.0);

    events
        .iter()
        .filter(|event| {
            let text = flatten(&event_document(event, DecodedBodies::default()), max_depth);
            similarity(&text, query) >= threshold
        })
        .cloned()
        .collect()
}

pub(crate) fn tokenize(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

pub(crate) fn contains_all(text: &str, tokens: &[String]) -> bool {
    let text = text.to_lowercase();
    tokens.iter().all(|token| text.contains(token.as_str()))
}

/// Normalized similarity in `[0, 1]`: `1 - levenshtein / max(len)`
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Edit distance with two rolling rows
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1) // deletion
                .min(current[j] + 1) // insertion
                .min(previous[j] + cost); // substitution
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
