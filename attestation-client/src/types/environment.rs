//! Environment configuration for the attestation client

use std::{env, path::PathBuf, time::Duration};

use nitro_attestation::TrustAnchorConfig;

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment
    Development,
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development,
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Whether logs are emitted as JSON
    #[must_use]
    pub const fn json_logs(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }

    /// Returns the trust anchor configuration, the AWS Nitro root unless overridden
    #[must_use]
    pub fn trust_anchor_config(&self) -> TrustAnchorConfig {
        let defaults = TrustAnchorConfig::default();

        TrustAnchorConfig {
            source_url: env::var("TRUST_ANCHOR_URL").unwrap_or(defaults.source_url),
            expected_sha256: env::var("TRUST_ANCHOR_SHA256").unwrap_or(defaults.expected_sha256),
            member_name: env::var("TRUST_ANCHOR_MEMBER").unwrap_or(defaults.member_name),
            fetch_timeout: self.trust_anchor_timeout(),
            staging_dir: env::var("TRUST_ANCHOR_STAGING_DIR").ok().map(PathBuf::from),
        }
    }

    /// Returns the trust anchor download timeout
    #[must_use]
    pub fn trust_anchor_timeout(&self) -> Duration {
        env::var("TRUST_ANCHOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(
                nitro_attestation::constants::DEFAULT_TRUST_ANCHOR_FETCH_TIMEOUT,
                Duration::from_secs,
            )
    }

    /// Returns the attestation document path from `ATTESTATION_DOC_PATH`
    #[must_use]
    pub fn attestation_doc_path(&self) -> Option<PathBuf> {
        env::var("ATTESTATION_DOC_PATH").ok().map(PathBuf::from)
    }

    /// Whether the attestation document is base64 text
    #[must_use]
    pub fn attestation_doc_base64(&self) -> bool {
        env::var("ATTESTATION_DOC_BASE64").is_ok_and(|v| v.to_lowercase() == "true")
    }
}
