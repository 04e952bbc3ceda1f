use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::regions::{api_base_url, is_valid_region, DEFAULT_REGION};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings shared by every client built in one invocation.
///
/// Read from `TURBOPUFFER_API_KEY`, `TURBOPUFFER_BASE_URL`,
/// `TURBOPUFFER_REGION` and `TPUFF_TIMEOUT_SECS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    /// Fixed endpoint, overrides any region
    pub base_url: Option<String>,
    pub default_region: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_region: DEFAULT_REGION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("TURBOPUFFER_API_KEY").ok_or(ClientError::MissingApiKey)?;
        let default_region = get("TURBOPUFFER_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let timeout = match get("TPUFF_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ClientError::Config(format!(
                        "TPUFF_TIMEOUT_SECS must be a positive integer, got '{raw}'"
                    ))
                })?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            api_key,
            base_url: get("TURBOPUFFER_BASE_URL").map(|url| url.trim_end_matches('/').to_string()),
            default_region,
            timeout,
        })
    }

    /// Region a request goes to when `region_override` is given or not
    pub fn region_for(&self, region_override: Option<&str>) -> String {
        region_override
            .map(str::to_string)
            .unwrap_or_else(|| self.default_region.clone())
    }

    /// Cache key and endpoint for a region. A fixed base URL wins over any
    /// region and skips region validation.
    pub fn endpoint(&self, region_override: Option<&str>) -> Result<String> {
        if let Some(base_url) = &self.base_url {
            return Ok(base_url.clone());
        }
        let region = self.region_for(region_override);
        if !is_valid_region(&region) {
            return Err(ClientError::InvalidRegion(region));
        }
        Ok(api_base_url(&region))
    }
}
