//! Verification of AWS Nitro Enclave attestation documents.
//!
//! A document is trusted only if it decodes as an ES384 COSE_Sign1 envelope,
//! its payload is a well-formed attestation document, its leaf certificate
//! chains to a pinned root, and the envelope signature verifies with the key
//! of that leaf. See [`EnclaveAttestationVerifier`].

/// Constants for enclave verification
pub mod constants;

/// Types for enclave verification
pub mod types;

/// Root of trust acquisition
pub mod trust_anchor;

/// COSE Sign1 envelope decoding
pub mod envelope;

/// Attestation document field validation
pub mod document;

/// Certificate chain validation
pub mod chain;

/// Envelope signature verification
pub mod signature;

mod attestation_verifier;

pub use attestation_verifier::{verify, EnclaveAttestationVerifier, VerificationStage};
pub use trust_anchor::{TrustAnchor, TrustAnchorConfig, TrustAnchorProvider};
pub use types::{
    AppraisalError, EnclaveAttestationError, EnclaveAttestationResult, TrustAcquisitionError,
    VerifiedIdentity,
};
