//! Attestation document input

use std::path::Path;

use anyhow::{Context, Result};
use nitro_attestation::{EnclaveAttestationResult, EnclaveAttestationVerifier, VerifiedIdentity};

/// An attestation document as read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationInput {
    /// Raw COSE Sign1 bytes
    Raw(Vec<u8>),
    /// Base64 text, as transports usually carry it
    Base64(String),
}

impl AttestationInput {
    /// Reads the document at `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, or is not UTF-8 when
    /// `base64` is set
    pub fn read(path: &Path, base64: bool) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attestation document {}", path.display()))?;

        if base64 {
            let text = String::from_utf8(bytes).context("Base64 attestation document is not UTF-8")?;
            Ok(Self::Base64(text))
        } else {
            Ok(Self::Raw(bytes))
        }
    }

    /// Runs the full verification pipeline on this document
    ///
    /// # Errors
    /// Returns the verifier's rejection
    pub fn verify(
        &self,
        verifier: &EnclaveAttestationVerifier,
    ) -> EnclaveAttestationResult<VerifiedIdentity> {
        match self {
            Self::Raw(bytes) => verifier.verify_attestation_document(bytes),
            Self::Base64(text) => verifier.verify_attestation_document_base64(text),
        }
    }
}
