use coset::iana;
use p384::ecdsa::{signature::Verifier as _, Signature, VerifyingKey};

use crate::chain::TrustedChain;
use crate::constants::ES384_SIGNATURE_LENGTH;
use crate::envelope::{SignedEnvelope, EXPECTED_ALGORITHM};
use crate::types::{EnclaveAttestationError, EnclaveAttestationResult};

/// Extracts the P-384 signing key from the leaf of a validated chain.
///
/// Taking a [`TrustedChain`] rather than raw bytes keeps the payload's own
/// `public_key` field, or any other unauthenticated key, out of reach.
///
/// # Errors
/// Returns `SignatureInvalid` if the leaf does not carry a P-384 key
pub fn leaf_verifying_key(chain: &TrustedChain) -> EnclaveAttestationResult<VerifyingKey> {
    let spki = &chain.leaf().tbs_certificate.subject_public_key_info;
    let public_key_bytes = spki.subject_public_key.as_bytes().ok_or_else(|| {
        EnclaveAttestationError::SignatureInvalid("Failed to extract public key bytes".to_string())
    })?;

    VerifyingKey::from_sec1_bytes(public_key_bytes).map_err(|e| {
        EnclaveAttestationError::SignatureInvalid(format!("Failed to parse P-384 public key: {e}"))
    })
}

/// Verifies the COSE_Sign1 signature of `envelope`
///
/// The signed bytes are the COSE `Sig_structure`:
/// `["Signature1", protected, h'', payload]`.
///
/// # Errors
/// Returns `SignatureInvalid` on any algorithm or cryptographic mismatch
pub fn verify_signature(
    envelope: &SignedEnvelope,
    leaf_key: &VerifyingKey,
    algorithm: iana::Algorithm,
) -> EnclaveAttestationResult<()> {
    if algorithm != EXPECTED_ALGORITHM || envelope.algorithm() != EXPECTED_ALGORITHM {
        return Err(EnclaveAttestationError::SignatureInvalid(format!(
            "Algorithm mismatch: declared {:?}, requested {algorithm:?}, expected {EXPECTED_ALGORITHM:?}",
            envelope.algorithm()
        )));
    }

    let signature = envelope.signature();

    // Nitro uses P-384 signatures which should be exactly 96 bytes
    if signature.len() != ES384_SIGNATURE_LENGTH {
        return Err(EnclaveAttestationError::SignatureInvalid(format!(
            "Invalid signature length: expected {ES384_SIGNATURE_LENGTH} bytes, got {}",
            signature.len()
        )));
    }

    let ecdsa_signature = Signature::from_slice(signature).map_err(|e| {
        EnclaveAttestationError::SignatureInvalid(format!(
            "Failed to parse ECDSA signature (need 96 raw bytes): {e}"
        ))
    })?;

    let sig_structure = envelope.cose_sign1().tbs_data(&[]);

    leaf_key
        .verify(&sig_structure, &ecdsa_signature)
        .map_err(|e| {
            EnclaveAttestationError::SignatureInvalid(format!(
                "Signature verification failed: {e}"
            ))
        })
}
