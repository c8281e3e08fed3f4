// src/services/image_provider.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    common::error::AppError,
    config::ImageSearchConfig,
    models::image_search::SearchFilters,
};

/// A API do Google devolve no máximo 10 itens por requisição.
pub const MAX_RESULTS_PER_QUERY: u32 = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provedor indisponível: {0}")]
    Unavailable(String),

    #[error("cota do provedor excedida")]
    QuotaExceeded,
}

/// Busca de imagens candidatas. Lista vazia é um resultado válido.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        filters: &SearchFilters,
    ) -> Result<Vec<String>, ProviderError>;
}

// ---
// Google Custom Search (searchType=image)
// ---

#[derive(Clone)]
pub struct GoogleImageProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    cse_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    #[serde(default)]
    items: Vec<GoogleSearchItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleSearchItem {
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    errors: Vec<GoogleErrorReason>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorReason {
    #[serde(default)]
    reason: Option<String>,
}

const QUOTA_REASONS: [&str; 4] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
];

impl GoogleImageProvider {
    pub fn new(config: &ImageSearchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.provider_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            cse_id: config.cse_id.clone(),
        })
    }

    /// 403 do Google pode ser chave inválida ou cota; só a segunda é "quota".
    fn is_quota_error(body: &str) -> bool {
        match serde_json::from_str::<GoogleErrorBody>(body) {
            Ok(parsed) => {
                parsed.error.status.as_deref() == Some("RESOURCE_EXHAUSTED")
                    || parsed.error.errors.iter().any(|e| {
                        e.reason
                            .as_deref()
                            .is_some_and(|reason| QUOTA_REASONS.contains(&reason))
                    })
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ImageProvider for GoogleImageProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        filters: &SearchFilters,
    ) -> Result<Vec<String>, ProviderError> {
        let (Some(api_key), Some(cse_id)) = (self.api_key.as_deref(), self.cse_id.as_deref()) else {
            return Err(ProviderError::Unavailable(
                "GOOGLE_API_KEY ou GOOGLE_CSE_ID não configurados".into(),
            ));
        };

        if max_results == 0 {
            return Ok(Vec::new());
        }

        let num = max_results.min(MAX_RESULTS_PER_QUERY).to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query),
            ("cx", cse_id),
            ("key", api_key),
            ("searchType", "image"),
            ("num", &num),
        ];
        params.extend(filters.query_params());

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("falha na requisição: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::QuotaExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::FORBIDDEN && Self::is_quota_error(&body) {
                return Err(ProviderError::QuotaExceeded);
            }
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let data: GoogleSearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("resposta inválida: {}", e)))?;

        let links: Vec<String> = data.items.into_iter().filter_map(|item| item.link).collect();
        tracing::debug!(query, found = links.len(), "busca de imagens concluída");
        Ok(links)
    }
}

// ---
// Download dos candidatos
// ---

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, AppError>;
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, AppError> {
        let download_failed =
            |e: reqwest::Error| AppError::ImageStoreFailure(format!("falha ao baixar {}: {}", url, e));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download_failed)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response.bytes().await.map_err(download_failed)?;

        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
