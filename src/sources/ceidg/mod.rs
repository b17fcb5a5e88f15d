//! Client for the CEIDG (sole-proprietor registry) API.
//!
//! CEIDG requires a bearer token and answers lookups with a `firmy` result
//! envelope; an empty result set means the lookup key is unknown.

pub mod normalizer;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::CeidgConfig;
use crate::error::{EnrichError, Result};
use crate::model::{CeidgProfile, RegistrySnapshot, SourceSystem};
use crate::sources::{normalize_nip, normalize_regon};

pub struct CeidgClient {
    http: reqwest::Client,
    config: CeidgConfig,
}

impl CeidgClient {
    pub fn from_env() -> Result<Self> {
        Self::with_config(CeidgConfig::from_env()?)
    }

    pub fn with_config(config: CeidgConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Look up a registration by NIP.
    #[instrument(skip(self))]
    pub async fn fetch_by_nip(&self, nip: &str) -> Result<(Value, String)> {
        let nip = normalize_nip(nip)?;
        self.fetch(&[("nip", nip.as_str())], &format!("NIP {nip}"))
            .await
    }

    /// Look up a registration by REGON.
    #[instrument(skip(self))]
    pub async fn fetch_by_regon(&self, regon: &str) -> Result<(Value, String)> {
        let regon = normalize_regon(regon)?;
        self.fetch(&[("regon", regon.as_str())], &format!("REGON {regon}"))
            .await
    }

    /// Fetch by NIP, snapshot and normalize in one step.
    #[instrument(skip(self))]
    pub async fn fetch_and_capture_by_nip(
        &self,
        nip: &str,
        entity_id: Option<&str>,
    ) -> Result<(CeidgProfile, RegistrySnapshot)> {
        let nip = normalize_nip(nip)?;
        let (entry, raw_text) = self.fetch_by_nip(&nip).await?;

        let snapshot = RegistrySnapshot::capture(
            SourceSystem::Ceidg,
            format!("NIP:{nip}"),
            entity_id.map(str::to_string),
            raw_text,
        );
        let profile = normalizer::normalize(&entry);

        Ok((profile, snapshot))
    }

    /// Fetch by REGON, snapshot and normalize in one step.
    #[instrument(skip(self))]
    pub async fn fetch_and_capture_by_regon(
        &self,
        regon: &str,
        entity_id: Option<&str>,
    ) -> Result<(CeidgProfile, RegistrySnapshot)> {
        let regon = normalize_regon(regon)?;
        let (entry, raw_text) = self.fetch_by_regon(&regon).await?;

        let snapshot = RegistrySnapshot::capture(
            SourceSystem::Ceidg,
            format!("REGON:{regon}"),
            entity_id.map(str::to_string),
            raw_text,
        );
        let profile = normalizer::normalize(&entry);

        Ok((profile, snapshot))
    }

    async fn fetch(&self, params: &[(&str, &str)], lookup: &str) -> Result<(Value, String)> {
        let url = format!("{}/firmy", self.config.base_url);

        debug!(%url, lookup, "requesting CEIDG entry");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json")
            .query(params)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(EnrichError::Api {
                message: "CEIDG API authentication failed, check the API token".to_string(),
            });
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Err(EnrichError::NotFound {
                source_system: SourceSystem::Ceidg,
                lookup: lookup.to_string(),
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(EnrichError::Api {
                message: format!("CEIDG API returned status {status}: {excerpt}"),
            });
        }

        let raw_text = response.text().await?;
        let payload: Value = serde_json::from_str(&raw_text)?;

        let entry = first_result(&payload).ok_or_else(|| EnrichError::NotFound {
            source_system: SourceSystem::Ceidg,
            lookup: lookup.to_string(),
        })?;
        Ok((entry, raw_text))
    }
}

/// CEIDG wraps matches in a `firmy` array; some responses are a bare array
/// or a single entry object.
fn first_result(payload: &Value) -> Option<Value> {
    match payload {
        Value::Object(map) => {
            if let Some(firmy) = map.get("firmy") {
                firmy.as_array().and_then(|items| items.first().cloned())
            } else if map.is_empty() {
                None
            } else {
                Some(payload.clone())
            }
        }
        Value::Array(items) => items.first().cloned(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}
