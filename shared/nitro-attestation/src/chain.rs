use std::time::{Duration, SystemTime, UNIX_EPOCH};

use webpki::{EndEntityCert, TlsServerTrustAnchors, TrustAnchor};
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::Certificate;

use crate::constants::MAX_CABUNDLE_ENTRY_LENGTH;
use crate::types::{EnclaveAttestationError, EnclaveAttestationResult};

/// Signature algorithms accepted on certificates along the chain
static SUPPORTED_SIG_ALGS: &[&webpki::SignatureAlgorithm] = &[
    &webpki::ECDSA_P384_SHA384,
    &webpki::ECDSA_P256_SHA256,
];

/// A leaf certificate proven to chain to the pinned root.
#[derive(Debug, Clone)]
pub struct TrustedChain {
    leaf: Certificate,
}

impl TrustedChain {
    /// The end-entity certificate that signed the attestation document
    #[must_use]
    pub const fn leaf(&self) -> &Certificate {
        &self.leaf
    }
}

/// Parses a certificate given either as DER or as PEM text
///
/// # Errors
/// Returns an error if the bytes are neither
pub fn parse_certificate(bytes: &[u8]) -> Result<Certificate, String> {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());

    let trimmed = &bytes[start..];
    if trimmed.starts_with(b"-----BEGIN") {
        Certificate::from_pem(trimmed).map_err(|e| format!("invalid PEM certificate: {e}"))
    } else {
        Certificate::from_der(bytes).map_err(|e| format!("invalid DER certificate: {e}"))
    }
}

/// DER encoding of a certificate given as DER or PEM
fn to_der(bytes: &[u8]) -> Result<(Certificate, Vec<u8>), String> {
    let certificate = parse_certificate(bytes)?;
    let der = certificate
        .to_der()
        .map_err(|e| format!("failed to encode certificate: {e}"))?;

    Ok((certificate, der))
}

/// Validates the chain `leaf -> intermediates -> root` at the current time
///
/// # Errors
/// Returns `ChainInvalid` if a certificate cannot be parsed, a bundle entry is
/// oversized, or no valid path to `root` exists
pub fn validate_chain(
    leaf: &[u8],
    intermediates: &[Vec<u8>],
    root: &Certificate,
) -> EnclaveAttestationResult<TrustedChain> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| {
        EnclaveAttestationError::ChainInvalid(format!("Failed to get current time: {e}"))
    })?;

    validate_chain_at(leaf, intermediates, root, now)
}

/// Validates the chain `leaf -> intermediates -> root` at `now`
///
/// `now` is a duration since the Unix epoch. A leaf without an extended key
/// usage extension is accepted for any usage; Nitro leaf certificates carry
/// none.
///
/// # Errors
/// See [`validate_chain`]
pub fn validate_chain_at(
    leaf: &[u8],
    intermediates: &[Vec<u8>],
    root: &Certificate,
    now: Duration,
) -> EnclaveAttestationResult<TrustedChain> {
    // Bound adversarial input before any parsing or path building
    if let Some((i, cert)) = intermediates
        .iter()
        .enumerate()
        .find(|(_, cert)| cert.is_empty() || cert.len() > MAX_CABUNDLE_ENTRY_LENGTH)
    {
        return Err(EnclaveAttestationError::ChainInvalid(format!(
            "cabundle[{i}] length {} out of bounds 1..={MAX_CABUNDLE_ENTRY_LENGTH}",
            cert.len()
        )));
    }

    let root_der = root.to_der().map_err(|e| {
        EnclaveAttestationError::ChainInvalid(format!("Failed to encode root certificate: {e}"))
    })?;

    // Create trust anchor from root certificate
    let trust_anchor = TrustAnchor::try_from_cert_der(&root_der).map_err(|e| {
        EnclaveAttestationError::ChainInvalid(format!(
            "Failed to create trust anchor from root certificate: {e}"
        ))
    })?;

    let (leaf, leaf_der) = to_der(leaf).map_err(|e| {
        EnclaveAttestationError::ChainInvalid(format!("Failed to parse leaf certificate: {e}"))
    })?;

    // Nitro bundles start with a copy of the root; only the pinned one counts
    let mut intermediate_ders = Vec::with_capacity(intermediates.len());
    for (i, cert) in intermediates.iter().enumerate() {
        let (_, der) = to_der(cert).map_err(|e| {
            EnclaveAttestationError::ChainInvalid(format!("Failed to parse cabundle[{i}]: {e}"))
        })?;
        if der != root_der {
            intermediate_ders.push(der);
        }
    }
    let intermediate_certs: Vec<&[u8]> = intermediate_ders.iter().map(Vec::as_slice).collect();

    let end_entity_cert = EndEntityCert::try_from(leaf_der.as_slice()).map_err(|e| {
        EnclaveAttestationError::ChainInvalid(format!("Failed to parse leaf certificate: {e}"))
    })?;

    end_entity_cert
        .verify_is_valid_tls_server_cert(
            SUPPORTED_SIG_ALGS,
            &TlsServerTrustAnchors(&[trust_anchor]),
            &intermediate_certs,
            webpki::Time::from_seconds_since_unix_epoch(now.as_secs()),
        )
        .map_err(|e| {
            EnclaveAttestationError::ChainInvalid(format!(
                "No valid certification path to the pinned root: {e}"
            ))
        })?;

    Ok(TrustedChain { leaf })
}
