use bytes::Bytes;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no results: {0}")]
    NoResults(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("completion failed: {0}")]
    Completion(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("aborted")]
    Aborted,
}

impl Error {
    /// The provider-level message without the variant prefix.
    ///
    /// Sections record this plain text so the UI shows "upstream down", not
    /// "search failed: upstream down".
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidInput(m)
            | Error::NoResults(m)
            | Error::Search(m)
            | Error::Completion(m)
            | Error::NotConfigured(m) => m,
            Error::Aborted => "aborted",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub include_images: bool,
    pub include_image_descriptions: bool,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
            include_images: false,
            include_image_descriptions: false,
            timeout_ms: None,
        }
    }
}

/// One record as the search provider returned it. Every field is optional;
/// normalization substitutes defaults, it never rejects.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchResult {
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Provider output for one query. Immutable once produced.
#[derive(Debug, Clone, Default)]
pub struct SearchResultSet {
    pub results: Vec<RawSearchResult>,
    pub images: Vec<SourceImage>,
    /// Provider's direct-answer string, if it produced one.
    pub answer: Option<String>,
    /// Query echo, when the provider returns it.
    pub query: Option<String>,
}

/// A normalized source record. `title`, `content`, and `url` are never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
    pub snippet: String,
    pub score: f64,
    pub image: Option<SourceImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A classified unit extracted from one line of the completion stream.
/// Consumed immediately by the section aggregator, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Reasoning(String),
    Answer(String),
    Unparseable,
}

/// Raw completion output: chunked bytes, errors surfaced in-stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResultSet>;
}

#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, messages: &[Message]) -> Result<ByteStream>;
}
