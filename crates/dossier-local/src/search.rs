//! Tavily-shaped web search provider.

use dossier_core::{
    Error, RawSearchResult, Result, SearchProvider, SearchQuery, SearchResultSet, SourceImage,
};
use serde::Deserialize;

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    // Keep a conservative cap even if callers pass something huge.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

fn tavily_api_key_from_env() -> Option<String> {
    std::env::var("DOSSIER_TAVILY_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
}

fn tavily_endpoint_from_env() -> Option<String> {
    std::env::var("DOSSIER_TAVILY_ENDPOINT")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl TavilySearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = tavily_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured("missing DOSSIER_TAVILY_API_KEY (or TAVILY_API_KEY)".to_string())
        })?;
        let endpoint = tavily_endpoint_from_env()
            .unwrap_or_else(|| "https://api.tavily.com/search".to_string());
        Ok(Self::with_endpoint(client, api_key, endpoint))
    }

    /// Explicit construction, used by tests pointing at a local fixture.
    pub fn with_endpoint(
        client: reqwest::Client,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Option<Vec<RawSearchResult>>,
    #[serde(default)]
    images: Option<Vec<TavilyImage>>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

/// Tavily returns bare URL strings unless image descriptions were requested.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TavilyImage {
    Bare(String),
    Described {
        url: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<TavilyImage> for SourceImage {
    fn from(img: TavilyImage) -> Self {
        match img {
            TavilyImage::Bare(url) => SourceImage {
                url,
                description: None,
            },
            TavilyImage::Described { url, description } => SourceImage { url, description },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Prefer the provider's own `{"error": "..."}` text over a bare status code.
fn error_message_from_body(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<TavilyErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| format!("tavily search HTTP {status}"))
}

#[async_trait::async_trait]
impl SearchProvider for TavilySearchProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResultSet> {
        let max_results = q.max_results.unwrap_or(5).min(20);
        let timeout_ms = timeout_ms_from_query(q);

        let body = serde_json::json!({
            "query": q.query,
            "max_results": max_results,
            "include_answer": true,
            "include_images": q.include_images,
            "include_image_descriptions": q.include_image_descriptions,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&body)
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Search(error_message_from_body(&body, status)));
        }

        let parsed: TavilySearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        Ok(SearchResultSet {
            results: parsed.results.unwrap_or_default(),
            images: parsed
                .images
                .unwrap_or_default()
                .into_iter()
                .map(SourceImage::from)
                .collect(),
            answer: parsed.answer.filter(|a| !a.trim().is_empty()),
            query: parsed.query,
        })
    }
}
