//! Client configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants;

/// Path and field conventions used to talk to the explanation server.
///
/// Two server generations exist in the wild; the client speaks exactly one
/// of them per configuration instead of guessing per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiContract {
    /// Upload field `file`, generate at `/explanations/generate`
    #[default]
    V1,
    /// Upload field `model`, generate at `/explanations`
    Legacy,
}

impl ApiContract {
    /// Multipart field name carrying the uploaded model file
    pub fn upload_field(&self) -> &'static str {
        match self {
            Self::V1 => "file",
            Self::Legacy => "model",
        }
    }

    /// Path (relative to the base URL) of the generate-explanation endpoint
    pub fn generate_path(&self) -> &'static str {
        match self {
            Self::V1 => "/explanations/generate",
            Self::Legacy => "/explanations",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ApiContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiContract {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown API contract '{}' (expected v1 or legacy)", other)),
        }
    }
}

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL including the API prefix, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,

    /// Optional request timeout. `None` leaves the transport default in place.
    pub timeout: Option<Duration>,

    /// Server contract version
    pub contract: ApiContract,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            timeout: None,
            contract: ApiContract::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let contract = constants::get_api_contract()
            .parse()
            .unwrap_or_else(|e: String| {
                log::warn!("{} - falling back to {}", e, ApiContract::default());
                ApiContract::default()
            });

        Self {
            base_url: normalize_base_url(&constants::get_api_url()),
            timeout: constants::get_timeout_secs().map(Duration::from_secs),
            contract,
        }
    }

    pub fn with_contract(mut self, contract: ApiContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Join a path like `/models` onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(constants::DEFAULT_API_URL)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_paths() {
        assert_eq!(ApiContract::V1.upload_field(), "file");
        assert_eq!(ApiContract::V1.generate_path(), "/explanations/generate");
        assert_eq!(ApiContract::Legacy.upload_field(), "model");
        assert_eq!(ApiContract::Legacy.generate_path(), "/explanations");
    }

    #[test]
    fn test_contract_parse() {
        assert_eq!("V1".parse::<ApiContract>().unwrap(), ApiContract::V1);
        assert_eq!(" legacy ".parse::<ApiContract>().unwrap(), ApiContract::Legacy);
        assert!("v2".parse::<ApiContract>().is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let config = ClientConfig::new("http://localhost:8000/api/v1/");
        assert_eq!(config.base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.endpoint("/models"), "http://localhost:8000/api/v1/models");
        assert_eq!(config.endpoint("models/upload"), "http://localhost:8000/api/v1/models/upload");
        assert!(config.timeout.is_none());
    }
}
