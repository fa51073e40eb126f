//! Recovers one JSON object from free-form decision service text.
//!
//! Replies are expected to be a bare object but routinely arrive wrapped in
//! prose or fenced code blocks. Extraction tries, in order: the trimmed text,
//! every fenced block, then the span from the first `{` to the last `}`.

use serde::de::DeserializeOwned;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractTier {
    Direct,
    Fenced,
    Braced,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub ok: bool,
    /// Which tier produced `value`; `None` when the default was used.
    pub tier: Option<ExtractTier>,
}

pub fn extract<T: DeserializeOwned>(raw: &str) -> Option<(T, ExtractTier)> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Some((value, ExtractTier::Direct));
    }

    for block in fenced_blocks(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(block) {
            return Some((value, ExtractTier::Fenced));
        }
    }

    braced_span(trimmed)
        .and_then(|span| serde_json::from_str::<T>(span).ok())
        .map(|value| (value, ExtractTier::Braced))
}

/// Like [`extract`], falling back to `default` with `ok = false`.
pub fn parse_or<T: DeserializeOwned>(raw: &str, default: T) -> Extracted<T> {
    match extract(raw) {
        Some((value, tier)) => Extracted { value, ok: true, tier: Some(tier) },
        None => Extracted { value: default, ok: false, tier: None },
    }
}

fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    // Segments at odd positions sit between an opening and a closing fence.
    let segments: Vec<&str> = text.split("```").collect();
    let closed = segments.len().saturating_sub(1) / 2;

    segments.into_iter().skip(1).step_by(2).take(closed).map(strip_fence_tag)
}

fn strip_fence_tag(block: &str) -> &str {
    match block.split_once('\n') {
        Some((first_line, rest)) if !first_line.contains('{') => rest.trim(),
        _ => block.trim(),
    }
}

fn braced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
