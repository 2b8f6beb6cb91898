use coset::{iana, Algorithm, CborSerializable, CoseSign1, TaggedCborSerializable};

use crate::types::{EnclaveAttestationError, EnclaveAttestationResult};

/// CBOR tag 18 (COSE_Sign1) in its one-byte encoding
const COSE_SIGN1_TAG_BYTE: u8 = 0xd2;

/// The only algorithm Nitro hardware signs with
pub const EXPECTED_ALGORITHM: iana::Algorithm = iana::Algorithm::ES384;

/// A structurally decoded COSE_Sign1 envelope.
///
/// Holding one of these says nothing about authenticity: the signature has not
/// been checked yet.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    algorithm: iana::Algorithm,
    tagged: bool,
    cose_sign1: CoseSign1,
}

impl SignedEnvelope {
    /// Algorithm declared in the protected header
    #[must_use]
    pub const fn algorithm(&self) -> iana::Algorithm {
        self.algorithm
    }

    /// Whether the input carried the COSE_Sign1 tag
    #[must_use]
    pub const fn is_tagged(&self) -> bool {
        self.tagged
    }

    /// The attestation document payload, exactly as it was signed
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        // `decode` rejects envelopes without a payload
        self.cose_sign1.payload.as_deref().unwrap_or_default()
    }

    /// Raw signature bytes
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.cose_sign1.signature
    }

    pub(crate) const fn cose_sign1(&self) -> &CoseSign1 {
        &self.cose_sign1
    }

    /// Re-encodes the envelope in the form it was received in
    ///
    /// # Errors
    /// Returns an error if the envelope cannot be serialized
    pub fn to_vec(&self) -> EnclaveAttestationResult<Vec<u8>> {
        let encoded = if self.tagged {
            self.cose_sign1.clone().to_tagged_vec()
        } else {
            self.cose_sign1.clone().to_vec()
        };

        encoded.map_err(|e| {
            EnclaveAttestationError::MalformedEnvelope(format!("Failed to encode COSE Sign1: {e}"))
        })
    }
}

/// Decodes raw bytes as a single-signer COSE_Sign1 envelope.
///
/// Both the tagged and the untagged form are accepted. Only the structure and
/// the declared algorithm are checked here, no signature math is done.
///
/// # Errors
/// Returns `MalformedEnvelope` if the bytes are not a COSE_Sign1 structure,
/// carry no payload, or declare an algorithm other than ES384
pub fn decode(bytes: &[u8]) -> EnclaveAttestationResult<SignedEnvelope> {
    // Validate before handing the buffer to the CBOR decoder
    let Some(&first_byte) = bytes.first() else {
        return Err(EnclaveAttestationError::MalformedEnvelope(
            "Empty attestation document".to_string(),
        ));
    };

    let tagged = first_byte == COSE_SIGN1_TAG_BYTE;
    if !tagged && !(0x80..=0x97).contains(&first_byte) && first_byte != 0x9f {
        return Err(EnclaveAttestationError::MalformedEnvelope(format!(
            "Invalid CBOR magic byte: expected COSE_Sign1 tag (0xd2) or array marker (0x80-0x97 or 0x9f), got 0x{first_byte:02x}"
        )));
    }

    let cose_sign1 = if tagged {
        CoseSign1::from_tagged_slice(bytes)
    } else {
        CoseSign1::from_slice(bytes)
    }
    .map_err(|e| {
        EnclaveAttestationError::MalformedEnvelope(format!("Failed to parse COSE Sign1: {e}"))
    })?;

    if cose_sign1.payload.as_ref().map_or(true, Vec::is_empty) {
        return Err(EnclaveAttestationError::MalformedEnvelope(
            "Missing payload in COSE Sign1".to_string(),
        ));
    }

    let algorithm = match &cose_sign1.protected.header.alg {
        Some(Algorithm::Assigned(alg)) if *alg == EXPECTED_ALGORITHM => *alg,
        Some(other) => {
            return Err(EnclaveAttestationError::MalformedEnvelope(format!(
                "Unsupported signing algorithm {other:?}, expected {EXPECTED_ALGORITHM:?}"
            )))
        }
        None => {
            return Err(EnclaveAttestationError::MalformedEnvelope(
                "Protected header does not declare an algorithm".to_string(),
            ))
        }
    };

    Ok(SignedEnvelope {
        algorithm,
        tagged,
        cose_sign1,
    })
}
