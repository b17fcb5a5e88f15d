//! Client for the public KRS (court registry) API.
//!
//! Retry/backoff and auth are out of scope here; the caller gets one fetch
//! attempt and a categorized failure.

pub mod normalizer;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::KrsConfig;
use crate::error::{EnrichError, Result};
use crate::model::{KrsProfile, RegistrySnapshot, SourceSystem};
use crate::sources::normalize_krs_number;

pub struct KrsClient {
    http: reqwest::Client,
    config: KrsConfig,
}

impl KrsClient {
    pub fn from_env() -> Result<Self> {
        Self::with_config(KrsConfig::from_env()?)
    }

    pub fn with_config(config: KrsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Fetch the full registry extract for a KRS number.
    ///
    /// Returns the decoded payload together with the exact response text,
    /// which is what the snapshot hash must be computed over.
    #[instrument(skip(self))]
    pub async fn fetch_raw(&self, krs_number: &str) -> Result<(Value, String)> {
        let krs = normalize_krs_number(krs_number)?;
        let url = format!(
            "{}/OdpisPelny/{}?rejestr=P&format=json",
            self.config.base_url, krs
        );

        debug!(%url, "requesting KRS extract");
        let response = self.http.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EnrichError::NotFound {
                source_system: SourceSystem::Krs,
                lookup: format!("KRS {krs}"),
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(EnrichError::Api {
                message: format!("KRS API returned status {status}: {excerpt}"),
            });
        }

        let raw_text = response.text().await?;
        let payload: Value = serde_json::from_str(&raw_text)?;
        Ok((payload, raw_text))
    }

    /// Fetch, snapshot and normalize in one step.
    #[instrument(skip(self))]
    pub async fn fetch_and_capture(
        &self,
        krs_number: &str,
        entity_id: Option<&str>,
    ) -> Result<(KrsProfile, RegistrySnapshot)> {
        let krs = normalize_krs_number(krs_number)?;
        let (payload, raw_text) = self.fetch_raw(&krs).await?;

        let snapshot = RegistrySnapshot::capture(
            SourceSystem::Krs,
            krs,
            entity_id.map(str::to_string),
            raw_text,
        );
        let profile = normalizer::normalize(&payload);

        Ok((profile, snapshot))
    }
}
