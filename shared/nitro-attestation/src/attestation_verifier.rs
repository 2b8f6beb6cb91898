use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::chain::validate_chain;
use crate::document::validate_fields;
use crate::envelope::decode;
use crate::signature::{leaf_verifying_key, verify_signature};
use crate::trust_anchor::TrustAnchor;
use crate::types::{EnclaveAttestationError, EnclaveAttestationResult, VerifiedIdentity};

/// Progress of a single verification. Strictly forward; any failure ends in
/// rejection and the remaining stages are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    /// Raw bytes, nothing checked
    Unverified,
    /// COSE_Sign1 structure and algorithm accepted
    Decoded,
    /// Payload is a well-formed attestation document
    FieldsValid,
    /// Leaf certificate chains to the pinned root
    ChainValid,
    /// Signature verified with the trusted leaf key
    SignatureValid,
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unverified => "unverified",
            Self::Decoded => "decoded",
            Self::FieldsValid => "fields-valid",
            Self::ChainValid => "chain-valid",
            Self::SignatureValid => "signature-valid",
        };
        f.write_str(name)
    }
}

/// Verifies AWS Nitro Enclave attestation documents
///
/// Verification is a fixed pipeline:
/// - COSE Sign1 structural decoding
/// - Attestation document field validation
/// - Certificate chain validation against the pinned root certificate
/// - COSE Sign1 signature verification with the leaf certificate key
///
/// The chain is always validated before the signature: the leaf key is only
/// trustworthy once its certificate is known to chain to the root.
///
/// The verifier holds no per-call state and can be shared across threads.
#[derive(Debug, Clone)]
pub struct EnclaveAttestationVerifier {
    trust_anchor: Arc<TrustAnchor>,
}

impl EnclaveAttestationVerifier {
    /// Creates a new `EnclaveAttestationVerifier`
    ///
    /// # Arguments
    /// * `trust_anchor` - The pinned root certificate
    #[must_use]
    pub const fn new(trust_anchor: Arc<TrustAnchor>) -> Self {
        Self { trust_anchor }
    }

    /// Creates a verifier from a PEM encoded root certificate
    ///
    /// # Errors
    /// Returns `ChainInvalid` if the root certificate cannot be parsed
    pub fn from_root_pem(root_pem: &[u8]) -> EnclaveAttestationResult<Self> {
        let anchor = TrustAnchor::from_pem(root_pem).map_err(|e| {
            EnclaveAttestationError::ChainInvalid(format!("Failed to parse root certificate: {e}"))
        })?;

        Ok(Self::new(Arc::new(anchor)))
    }

    /// Verifies a base64-encoded attestation document
    ///
    /// This is a convenience method that handles base64 decoding and then verifies the document
    ///
    /// # Errors
    /// Returns an error if the base64 decoding fails or the attestation document verification fails
    pub fn verify_attestation_document_base64(
        &self,
        attestation_doc_base64: &str,
    ) -> EnclaveAttestationResult<VerifiedIdentity> {
        let attestation_doc_bytes = STANDARD.decode(attestation_doc_base64.trim()).map_err(|e| {
            EnclaveAttestationError::MalformedEnvelope(format!(
                "Failed to decode base64 attestation document: {e}"
            ))
        })?;

        self.verify_attestation_document(&attestation_doc_bytes)
    }

    /// Verifies the attestation document from the enclave.
    ///
    /// Follows the AWS Nitro Enclave Attestation Document Specification:
    /// <https://docs.aws.amazon.com/enclaves/latest/user/nitro-enclave-attestation-document.html>
    ///
    /// # Errors
    /// Returns the error of the first stage that rejects the document
    pub fn verify_attestation_document(
        &self,
        attestation_doc_bytes: &[u8],
    ) -> EnclaveAttestationResult<VerifiedIdentity> {
        let mut stage = VerificationStage::Unverified;

        self.run_pipeline(attestation_doc_bytes, &mut stage)
            .inspect(|identity| {
                debug!(module_id = %identity.module_id, "Attestation document verified");
            })
            .inspect_err(|e| {
                warn!(%stage, "Attestation document rejected: {e}");
            })
    }

    fn run_pipeline(
        &self,
        attestation_doc_bytes: &[u8],
        stage: &mut VerificationStage,
    ) -> EnclaveAttestationResult<VerifiedIdentity> {
        // 1. Syntactical validation
        let envelope = decode(attestation_doc_bytes)?;
        advance(stage, VerificationStage::Decoded);

        let document = validate_fields(envelope.payload())?;
        advance(stage, VerificationStage::FieldsValid);

        // 2. Semantic validation
        let chain = validate_chain(
            &document.certificate,
            &document.cabundle,
            self.trust_anchor.certificate(),
        )?;
        advance(stage, VerificationStage::ChainValid);

        // 3. Cryptographic validation
        let leaf_key = leaf_verifying_key(&chain)?;
        verify_signature(&envelope, &leaf_key, envelope.algorithm())?;
        advance(stage, VerificationStage::SignatureValid);

        Ok(VerifiedIdentity {
            module_id: document.module_id,
            timestamp: document.timestamp,
            pcrs: document.pcrs,
            public_key: document.public_key,
            user_data: document.user_data,
            nonce: document.nonce,
        })
    }
}

fn advance(stage: &mut VerificationStage, next: VerificationStage) {
    debug!(from = %stage, to = %next, "Attestation verification advanced");
    *stage = next;
}

/// Verifies `attestation_doc_bytes` against a PEM encoded root certificate
///
/// # Errors
/// Returns the error of the first stage that rejects the document
pub fn verify(
    attestation_doc_bytes: &[u8],
    trusted_root_pem: &[u8],
) -> EnclaveAttestationResult<VerifiedIdentity> {
    EnclaveAttestationVerifier::from_root_pem(trusted_root_pem)?
        .verify_attestation_document(attestation_doc_bytes)
}
