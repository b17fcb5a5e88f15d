use std::env;
use std::time::Duration;

use crate::error::{EnrichError, Result};
use crate::model::SourceSystem;

pub const DEFAULT_KRS_API_BASE_URL: &str = "https://api-krs.ms.gov.pl/api/krs";
pub const DEFAULT_CEIDG_API_BASE_URL: &str = "https://dane.biznes.gov.pl/api/ceidg/v2";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the KRS court-registry API.
///
/// The API is public and needs no credentials; only the base URL and the
/// request timeout can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct KrsConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl KrsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::var("KRS_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_KRS_API_BASE_URL.to_string()),
            timeout: timeout_from_env("KRS_REQUEST_TIMEOUT")?,
        })
    }
}

/// Configuration for the CEIDG sole-proprietor registry API.
///
/// CEIDG requires a bearer token obtained from dane.biznes.gov.pl; a missing
/// token is a configuration failure, not a fetch failure.
#[derive(Debug, Clone)]
pub struct CeidgConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl CeidgConfig {
    pub fn from_env() -> Result<Self> {
        let api_token = env::var("CEIDG_API_TOKEN").unwrap_or_default();
        if api_token.is_empty() {
            return Err(EnrichError::NotConfigured {
                source_system: SourceSystem::Ceidg,
                reason: "set CEIDG_API_TOKEN (free tokens at https://dane.biznes.gov.pl)"
                    .to_string(),
            });
        }

        Ok(Self {
            base_url: env::var("CEIDG_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_CEIDG_API_BASE_URL.to_string()),
            api_token,
            timeout: timeout_from_env("CEIDG_REQUEST_TIMEOUT")?,
        })
    }
}

/// Check whether the CEIDG integration has a token available.
pub fn is_ceidg_configured() -> bool {
    env::var("CEIDG_API_TOKEN").map_or(false, |t| !t.is_empty())
}

fn timeout_from_env(var: &str) -> Result<Duration> {
    match env::var(var) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| EnrichError::Config(format!("{var} must be a number, got '{raw}'")))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
    }
}
