//! Acquisition and pinning of the attestation root of trust.
//!
//! The root certificate is distributed as a zip archive. The archive is only
//! opened once its SHA-256 matches the pinned value, so nothing sourced from a
//! tampered archive ever reaches chain validation.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use x509_cert::Certificate;

use crate::chain::parse_certificate;
use crate::constants::{
    AWS_NITRO_ROOT_ARCHIVE_MEMBER, AWS_NITRO_ROOT_ARCHIVE_SHA256, AWS_NITRO_ROOT_ARCHIVE_URL,
    DEFAULT_TRUST_ANCHOR_FETCH_TIMEOUT,
};
use crate::types::TrustAcquisitionError;

/// Where the root certificate comes from and how it is pinned.
///
/// Built once at process start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchorConfig {
    /// URL of the distribution archive
    pub source_url: String,
    /// Hex encoded SHA-256 of the archive
    pub expected_sha256: String,
    /// Archive member holding the PEM root certificate
    pub member_name: String,
    /// Upper bound on the download
    pub fetch_timeout: Duration,
    /// Directory for the staged archive, the system temp dir if `None`
    pub staging_dir: Option<PathBuf>,
}

impl Default for TrustAnchorConfig {
    fn default() -> Self {
        Self {
            source_url: AWS_NITRO_ROOT_ARCHIVE_URL.to_string(),
            expected_sha256: AWS_NITRO_ROOT_ARCHIVE_SHA256.to_string(),
            member_name: AWS_NITRO_ROOT_ARCHIVE_MEMBER.to_string(),
            fetch_timeout: DEFAULT_TRUST_ANCHOR_FETCH_TIMEOUT,
            staging_dir: None,
        }
    }
}

/// The pinned root certificate
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pem: Vec<u8>,
    certificate: Certificate,
}

impl TrustAnchor {
    /// Creates a trust anchor from a PEM (or DER) encoded certificate
    ///
    /// # Errors
    /// Returns an error if the bytes are not a certificate
    pub fn from_pem(pem: &[u8]) -> Result<Self, TrustAcquisitionError> {
        let certificate =
            parse_certificate(pem).map_err(TrustAcquisitionError::InvalidCertificate)?;

        Ok(Self {
            pem: pem.to_vec(),
            certificate,
        })
    }

    /// The certificate exactly as it was extracted
    #[must_use]
    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

/// Downloads the root archive and returns the pinned PEM certificate
///
/// # Errors
/// Returns an error if the download fails or times out, the archive digest does
/// not match, or the archive does not hold the configured member
pub async fn acquire_root_certificate(
    client: &reqwest::Client,
    config: &TrustAnchorConfig,
) -> Result<Vec<u8>, TrustAcquisitionError> {
    info!("Fetching trust anchor archive from {}", config.source_url);

    let fetch = async {
        let response = client
            .get(&config.source_url)
            .send()
            .await
            .map_err(|e| TrustAcquisitionError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrustAcquisitionError::HttpStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TrustAcquisitionError::Fetch(e.to_string()))?;

        Ok::<_, TrustAcquisitionError>(body)
    };

    let archive = tokio::time::timeout(config.fetch_timeout, fetch)
        .await
        .map_err(|_| TrustAcquisitionError::Timeout(config.fetch_timeout))??;

    pin_and_extract(
        &archive,
        &config.expected_sha256,
        &config.member_name,
        config.staging_dir.as_deref(),
    )
}

/// Checks `archive` against the pinned digest, then extracts `member`
///
/// The archive is staged in a temporary file inside `staging_dir` (or the
/// system temp dir) which is removed on every exit path.
///
/// # Errors
/// Returns `DigestMismatch` before touching the archive if the digest differs,
/// and `MissingMember`/`Archive` if extraction fails
pub fn pin_and_extract(
    archive: &[u8],
    expected_sha256: &str,
    member: &str,
    staging_dir: Option<&std::path::Path>,
) -> Result<Vec<u8>, TrustAcquisitionError> {
    let expected = hex::decode(expected_sha256.trim())
        .ok()
        .filter(|digest| digest.len() == Sha256::output_size())
        .ok_or_else(|| TrustAcquisitionError::InvalidExpectedDigest(expected_sha256.to_string()))?;

    let actual = Sha256::digest(archive);
    if actual.as_slice() != expected.as_slice() {
        warn!("Trust anchor archive digest mismatch, refusing to extract");
        return Err(TrustAcquisitionError::DigestMismatch {
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }

    debug!("Trust anchor archive digest matches pinned value");

    let mut builder = tempfile::Builder::new();
    builder.prefix("trust-anchor-").suffix(".zip");
    let staged = match staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| TrustAcquisitionError::TempFile(e.to_string()))?;

    // `staged` is deleted when dropped, whichever way this returns
    extract_member(&staged, archive, member)
}

fn extract_member(
    staged: &tempfile::NamedTempFile,
    archive: &[u8],
    member: &str,
) -> Result<Vec<u8>, TrustAcquisitionError> {
    let mut file = staged.as_file();
    file.write_all(archive)
        .map_err(|e| TrustAcquisitionError::TempFile(e.to_string()))?;
    file.flush()
        .map_err(|e| TrustAcquisitionError::TempFile(e.to_string()))?;

    let mut zip = zip::ZipArchive::new(
        staged
            .reopen()
            .map_err(|e| TrustAcquisitionError::TempFile(e.to_string()))?,
    )
    .map_err(|e| TrustAcquisitionError::Archive(e.to_string()))?;

    let mut entry = match zip.by_name(member) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(TrustAcquisitionError::MissingMember(member.to_string()))
        }
        Err(e) => return Err(TrustAcquisitionError::Archive(e.to_string())),
    };

    let mut contents = Vec::new();
    entry
        .read_to_end(&mut contents)
        .map_err(|e| TrustAcquisitionError::Archive(e.to_string()))?;

    Ok(contents)
}

/// Acquires the trust anchor once and shares it read-only afterwards.
///
/// A failed acquisition is not cached: the next call fetches and re-checks the
/// digest from scratch.
#[derive(Debug)]
pub struct TrustAnchorProvider {
    config: TrustAnchorConfig,
    client: reqwest::Client,
    anchor: OnceCell<Arc<TrustAnchor>>,
}

impl TrustAnchorProvider {
    /// Creates a provider with its own HTTP client
    #[must_use]
    pub fn new(config: TrustAnchorConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Creates a provider using the transport's HTTP client
    #[must_use]
    pub fn with_client(config: TrustAnchorConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            anchor: OnceCell::new(),
        }
    }

    /// Returns the pinned trust anchor, acquiring it on first use
    ///
    /// # Errors
    /// Returns an error if acquisition fails
    pub async fn trust_anchor(&self) -> Result<Arc<TrustAnchor>, TrustAcquisitionError> {
        self.anchor
            .get_or_try_init(|| async {
                let pem = acquire_root_certificate(&self.client, &self.config).await?;
                let anchor = TrustAnchor::from_pem(&pem)?;
                info!(
                    "✅ Pinned trust anchor {}",
                    anchor.certificate().tbs_certificate.subject
                );
                Ok::<_, TrustAcquisitionError>(Arc::new(anchor))
            })
            .await
            .cloned()
    }
}
