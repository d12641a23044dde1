//! Search provider boundary.
//!
//! `AssetSearch` abstracts the remote catalog so the resolver can be tested
//! against an in-memory fake. `HttpAssetSearch` is the production
//! implementation over a Freesound-style REST API: token-authenticated text
//! search returning candidates with license, duration, and a ladder of
//! preview renditions.

use crate::assets::AssetType;
use crate::errors::AssetError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// One search hit, already reduced to the fields the resolver filters on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    /// Direct URL of the best available rendition
    pub url: String,
    /// File format of that rendition ("mp3", "png", ...)
    pub format: String,
    pub license: String,
    pub duration_secs: Option<f64>,
}

/// Remote catalog boundary.
#[async_trait]
pub trait AssetSearch: Send + Sync {
    /// Run one text search. An empty result set is `Ok(vec![])`, not an
    /// error; only transport and protocol failures are `Err`.
    async fn search(
        &self,
        asset_type: AssetType,
        query: &str,
    ) -> Result<Vec<Candidate>, AssetError>;

    /// Fetch the bytes of an accepted candidate.
    async fn download(&self, candidate: &Candidate) -> Result<Vec<u8>, AssetError>;
}

/// Preview renditions ordered best-first; the first one present wins.
const PREVIEW_PREFERENCE: &[(&str, &str)] = &[
    ("preview-hq-mp3", "mp3"),
    ("preview-lq-mp3", "mp3"),
    ("preview-hq-ogg", "ogg"),
    ("preview-lq-ogg", "ogg"),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: serde_json::Value,
    name: String,
    #[serde(default)]
    license: String,
    #[serde(default)]
    duration: Option<f64>,
    /// Audio hits carry a preview map; image hits a direct URL
    #[serde(default)]
    previews: HashMap<String, String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

impl SearchHit {
    /// Pick the rendition: best preview for audio, the direct URL otherwise.
    fn best_rendition(&self, asset_type: AssetType) -> Option<(String, String)> {
        match asset_type {
            AssetType::Audio => PREVIEW_PREFERENCE.iter().find_map(|(key, format)| {
                self.previews
                    .get(*key)
                    .map(|url| (url.clone(), format.to_string()))
            }),
            AssetType::Image => self.url.clone().map(|url| {
                let format = self
                    .format
                    .clone()
                    .or_else(|| {
                        url.rsplit('.')
                            .next()
                            .filter(|ext| ext.len() <= 4)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| "png".to_string());
                (url, format)
            }),
        }
    }
}

/// Token-authenticated search over a Freesound-style HTTP API.
pub struct HttpAssetSearch {
    client: reqwest::Client,
    image_endpoint: String,
    audio_endpoint: String,
    api_key: String,
}

impl HttpAssetSearch {
    pub fn new(image_endpoint: &str, audio_endpoint: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            image_endpoint: image_endpoint.to_string(),
            audio_endpoint: audio_endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self, asset_type: AssetType) -> &str {
        match asset_type {
            AssetType::Image => &self.image_endpoint,
            AssetType::Audio => &self.audio_endpoint,
        }
    }
}

#[async_trait]
impl AssetSearch for HttpAssetSearch {
    async fn search(
        &self,
        asset_type: AssetType,
        query: &str,
    ) -> Result<Vec<Candidate>, AssetError> {
        debug!(%query, ?asset_type, "asset search");

        let response = self
            .client
            .get(self.endpoint(asset_type))
            .header("Authorization", format!("Token {}", self.api_key))
            .query(&[
                ("query", query),
                ("fields", "id,name,previews,license,duration,url,format"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssetError::Search(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await?;
        let candidates = body
            .results
            .into_iter()
            .filter_map(|hit| {
                let (url, format) = hit.best_rendition(asset_type)?;
                Some(Candidate {
                    id: hit.id.to_string().trim_matches('"').to_string(),
                    name: hit.name,
                    url,
                    format,
                    license: hit.license,
                    duration_secs: hit.duration,
                })
            })
            .collect();
        Ok(candidates)
    }

    async fn download(&self, candidate: &Candidate) -> Result<Vec<u8>, AssetError> {
        let response = self
            .client
            .get(&candidate.url)
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await
            .map_err(|e| AssetError::Download {
                id: candidate.id.clone(),
                url: candidate.url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AssetError::Download {
                id: candidate.id.clone(),
                url: candidate.url.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| AssetError::Download {
            id: candidate.id.clone(),
            url: candidate.url.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
