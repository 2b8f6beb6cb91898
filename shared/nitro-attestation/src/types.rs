//! Enclave attestation types and errors.
//!
//! This module contains the error taxonomy of the verification pipeline, the
//! verified identity handed back to callers, and the caller-side appraisal
//! helpers that run after a document has been verified.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents errors that can occur while acquiring the trust anchor
#[derive(Debug, Error)]
pub enum TrustAcquisitionError {
    /// The archive could not be downloaded
    #[error("Failed to download trust anchor archive: {0}")]
    Fetch(String),

    /// The download did not finish within the configured timeout
    #[error("Timed out after {0:?} while downloading trust anchor archive")]
    Timeout(Duration),

    /// The server answered with a non-success status
    #[error("Failed to download trust anchor archive: HTTP {0}")]
    HttpStatus(u16),

    /// The configured digest is not a SHA-256 hex string
    #[error("Invalid expected archive digest: {0}")]
    InvalidExpectedDigest(String),

    /// The archive content does not match the pinned digest
    #[error("Trust anchor archive digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The pinned digest
        expected: String,
        /// The digest of the downloaded bytes
        actual: String,
    },

    /// The temporary archive file could not be written
    #[error("Failed to stage trust anchor archive: {0}")]
    TempFile(String),

    /// The archive is not a readable zip file
    #[error("Failed to read trust anchor archive: {0}")]
    Archive(String),

    /// The archive does not contain the configured member
    #[error("Archive member {0} not found")]
    MissingMember(String),

    /// The extracted member is not a certificate
    #[error("Invalid trust anchor certificate: {0}")]
    InvalidCertificate(String),
}

/// Represents errors that can occur during enclave attestation verification
#[derive(Debug, Error)]
pub enum EnclaveAttestationError {
    /// The signed envelope could not be decoded or declares a disallowed algorithm
    #[error("Malformed attestation envelope: {0}")]
    MalformedEnvelope(String),

    /// A payload field is missing or out of bounds
    #[error("Invalid attestation field {field}: {reason}")]
    SchemaViolation {
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Certificate chain validation failed
    #[error("Certificate chain validation failed: {0}")]
    ChainInvalid(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),
}

impl EnclaveAttestationError {
    pub(crate) fn schema(field: &'static str, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending payload field, if this is a schema violation
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::SchemaViolation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for enclave attestation operations
pub type EnclaveAttestationResult<T, E = EnclaveAttestationError> = Result<T, E>;

/// Represents errors raised by the caller-side appraisal helpers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppraisalError {
    /// An expected PCR is not present in the document
    #[error("PCR{0} missing from attestation")]
    PcrMissing(u32),

    /// A PCR does not hold the expected measurement
    #[error("PCR{index} value not trusted: {actual}")]
    PcrMismatch {
        /// The index of the PCR that failed
        index: u32,
        /// The hex encoded value found in the document
        actual: String,
    },

    /// Attestation timestamp is too old
    #[error("Attestation is too old: {age_millis}ms (max: {max_age_millis}ms)")]
    Stale {
        /// The age of the attestation in milliseconds
        age_millis: u64,
        /// The maximum accepted age in milliseconds
        max_age_millis: u64,
    },

    /// Attestation timestamp lies ahead of the local clock
    #[error("Attestation timestamp is {0} ms in the future")]
    FutureTimestamp(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Identity of an enclave whose attestation document passed every gate.
pub struct VerifiedIdentity {
    /// The module ID of the enclave
    pub module_id: String,
    /// Enclave-reported creation time of the document, in milliseconds
    pub timestamp: u64,
    /// Platform configuration registers, keyed by index
    pub pcrs: BTreeMap<u32, Vec<u8>>,
    /// Caller-supplied public key echoed by the enclave. Not authenticated by
    /// the chain, use only for challenge protocols.
    pub public_key: Option<Vec<u8>>,
    /// Caller-supplied user data echoed by the enclave
    pub user_data: Option<Vec<u8>>,
    /// Caller-supplied nonce echoed by the enclave
    pub nonce: Option<Vec<u8>>,
}

impl VerifiedIdentity {
    /// Checks the identity against a list of expected measurements
    ///
    /// # Arguments
    /// * `expected` - pairs of (PCR index, expected PCR value)
    ///
    /// # Errors
    /// Returns an error on the first PCR that is missing or differs
    pub fn check_pcrs(&self, expected: &[(u32, Vec<u8>)]) -> Result<(), AppraisalError> {
        for (index, expected_value) in expected {
            let actual = self
                .pcrs
                .get(index)
                .ok_or(AppraisalError::PcrMissing(*index))?;

            if actual != expected_value {
                return Err(AppraisalError::PcrMismatch {
                    index: *index,
                    actual: hex::encode(actual),
                });
            }
        }

        Ok(())
    }

    /// Checks that the document was produced at most `max_age` before `now`
    ///
    /// `now` is the current time as a duration since the Unix epoch.
    ///
    /// # Errors
    /// Returns an error if the document is older than `max_age` or lies in the future
    pub fn check_freshness(&self, max_age: Duration, now: Duration) -> Result<(), AppraisalError> {
        let now_millis = u64::try_from(now.as_millis()).unwrap_or(u64::MAX);
        let max_age_millis = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);

        let age_millis = now_millis
            .checked_sub(self.timestamp)
            .ok_or_else(|| AppraisalError::FutureTimestamp(self.timestamp - now_millis))?;

        if age_millis > max_age_millis {
            return Err(AppraisalError::Stale {
                age_millis,
                max_age_millis,
            });
        }

        Ok(())
    }
}
