//! Defaulting of raw provider records into canonical sources.

use dossier_core::{RawSearchResult, SearchResult, SearchResultSet, SourceImage};

const DEFAULT_TITLE: &str = "Untitled Source";
const DEFAULT_CONTENT: &str = "No content available";
const DEFAULT_URL: &str = "#";
const SNIPPET_CHARS: usize = 150;

/// Substitute defaults for whatever the provider left out. `None` (a null or
/// non-array body upstream) normalizes to an empty list; nothing is ever
/// rejected.
pub fn normalize(raw: Option<Vec<RawSearchResult>>) -> Vec<SearchResult> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.into_iter().map(normalize_record).collect()
}

/// Normalize a whole provider result set, pairing images onto records.
pub fn normalize_set(set: SearchResultSet) -> Vec<SearchResult> {
    let mut out = normalize(Some(set.results));
    attach_images(&mut out, &set.images);
    out
}

/// Pair provider images to results by index. Extra images are dropped;
/// results past the image list keep `None`.
pub fn attach_images(results: &mut [SearchResult], images: &[SourceImage]) {
    for (r, img) in results.iter_mut().zip(images.iter()) {
        r.image = Some(img.clone());
    }
}

fn normalize_record(r: RawSearchResult) -> SearchResult {
    // The snippet falls back to the raw content, not the substituted
    // placeholder: a record missing both fields gets an empty snippet.
    let snippet = r
        .snippet
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            r.content
                .as_deref()
                .map(|c| truncate_chars(c, SNIPPET_CHARS))
                .unwrap_or_default()
        });
    SearchResult {
        title: non_empty_or(r.title, DEFAULT_TITLE),
        content: non_empty_or(r.content, DEFAULT_CONTENT),
        url: non_empty_or(r.url, DEFAULT_URL),
        snippet,
        score: r.score.unwrap_or(0.0),
        image: None,
    }
}

fn non_empty_or(v: Option<String>, default: &str) -> String {
    v.filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_input_is_empty() {
        assert!(normalize(None).is_empty());
        assert!(normalize(Some(Vec::new())).is_empty());
    }

    #[test]
    fn empty_record_gets_all_defaults() {
        let out = normalize(Some(vec![RawSearchResult::default()]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Untitled Source");
        assert_eq!(out[0].content, "No content available");
        assert_eq!(out[0].url, "#");
        assert_eq!(out[0].snippet, "");
        assert_eq!(out[0].score, 0.0);
        assert!(out[0].image.is_none());
    }

    #[test]
    fn snippet_defaults_to_content_prefix() {
        let long = "x".repeat(400);
        let out = normalize(Some(vec![RawSearchResult {
            content: Some(long),
            ..Default::default()
        }]));
        assert_eq!(out[0].snippet.chars().count(), 150);
        assert!(out[0].content.len() > out[0].snippet.len());
    }

    #[test]
    fn present_snippet_is_kept_verbatim() {
        let out = normalize(Some(vec![RawSearchResult {
            content: Some("content".to_string()),
            snippet: Some("hand-written".to_string()),
            ..Default::default()
        }]));
        assert_eq!(out[0].snippet, "hand-written");
    }

    #[test]
    fn whitespace_only_fields_are_treated_as_missing() {
        let out = normalize(Some(vec![RawSearchResult {
            title: Some("   ".to_string()),
            url: Some(String::new()),
            ..Default::default()
        }]));
        assert_eq!(out[0].title, "Untitled Source");
        assert_eq!(out[0].url, "#");
    }

    #[test]
    fn images_pair_by_index() {
        let mut out = normalize(Some(vec![
            RawSearchResult::default(),
            RawSearchResult::default(),
        ]));
        attach_images(
            &mut out,
            &[SourceImage {
                url: "https://example.com/a.png".to_string(),
                description: Some("a".to_string()),
            }],
        );
        assert_eq!(
            out[0].image.as_ref().map(|i| i.url.as_str()),
            Some("https://example.com/a.png")
        );
        assert!(out[1].image.is_none());
    }
}
