//! Typed decoding of the attestation document payload.
//!
//! The payload is a CBOR map. Every field is pulled out by name and checked
//! in a fixed order so that a given malformed input always fails at the same
//! point: presence of required fields first, then per-field types and bounds,
//! then the semantic checks on `digest` and `pcrs`.

use std::collections::BTreeMap;

use ciborium::Value;

use crate::constants::{
    ALLOWED_PCR_LENGTHS, MAX_CABUNDLE_ENTRY_LENGTH, MAX_PCR_COUNT, MAX_PUBLIC_KEY_LENGTH,
    MAX_USER_DATA_LENGTH, SUPPORTED_DIGEST,
};
use crate::types::{EnclaveAttestationError, EnclaveAttestationResult};

const MODULE_ID: &str = "module_id";
const DIGEST: &str = "digest";
const TIMESTAMP: &str = "timestamp";
const PCRS: &str = "pcrs";
const CERTIFICATE: &str = "certificate";
const CABUNDLE: &str = "cabundle";
const PUBLIC_KEY: &str = "public_key";
const USER_DATA: &str = "user_data";
const NONCE: &str = "nonce";

/// Required fields, in the order their absence is reported
const REQUIRED_FIELDS: [&str; 6] = [MODULE_ID, DIGEST, TIMESTAMP, PCRS, CERTIFICATE, CABUNDLE];

/// A well-formed attestation document.
///
/// Well-formed is not trusted: the certificate chain and the envelope
/// signature are checked separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationDocument {
    /// Enclave instance identifier
    pub module_id: String,
    /// Enclave-reported creation time
    pub timestamp: u64,
    /// Digest algorithm of the PCRs, always `SHA384`
    pub digest: String,
    /// PCR index to measurement
    pub pcrs: BTreeMap<u32, Vec<u8>>,
    /// Leaf certificate, DER or PEM
    pub certificate: Vec<u8>,
    /// Intermediate certificates
    pub cabundle: Vec<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    pub user_data: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
}

/// Decodes and validates the attestation document payload
///
/// # Errors
/// Returns `SchemaViolation` naming the first offending field
pub fn validate_fields(payload: &[u8]) -> EnclaveAttestationResult<AttestationDocument> {
    let value: Value = ciborium::from_reader(payload)
        .map_err(|e| EnclaveAttestationError::schema("payload", format!("not valid CBOR: {e}")))?;

    let Value::Map(entries) = value else {
        return Err(EnclaveAttestationError::schema(
            "payload",
            "expected a CBOR map",
        ));
    };

    let fields = PayloadFields::new(&entries);

    // 1. Presence
    if let Some(missing) = REQUIRED_FIELDS.into_iter().find(|name| fields.get(name).is_none()) {
        return Err(EnclaveAttestationError::schema(missing, "missing"));
    }

    // 2. Types and bounds
    let module_id = fields.text(MODULE_ID)?;
    if module_id.is_empty() {
        return Err(EnclaveAttestationError::schema(MODULE_ID, "must not be empty"));
    }

    let timestamp = fields.timestamp()?;
    let digest = fields.text(DIGEST)?;
    let raw_pcrs = fields.pcrs()?;

    let certificate = fields.bytes(CERTIFICATE)?;
    if certificate.is_empty() {
        return Err(EnclaveAttestationError::schema(CERTIFICATE, "must not be empty"));
    }

    let cabundle = fields.cabundle()?;
    let public_key = fields.optional_bytes(PUBLIC_KEY, MAX_PUBLIC_KEY_LENGTH)?;
    let user_data = fields.optional_bytes(USER_DATA, MAX_USER_DATA_LENGTH)?;
    let nonce = fields.optional_bytes(NONCE, MAX_USER_DATA_LENGTH)?;

    // 3. Semantics
    if digest != SUPPORTED_DIGEST {
        return Err(EnclaveAttestationError::schema(
            DIGEST,
            format!("unsupported digest {digest}, expected {SUPPORTED_DIGEST}"),
        ));
    }

    let mut pcrs = BTreeMap::new();
    for (index, value) in raw_pcrs {
        let index = u32::try_from(index)
            .ok()
            .filter(|i| (*i as usize) < MAX_PCR_COUNT)
            .ok_or_else(|| {
                EnclaveAttestationError::schema(PCRS, format!("invalid PCR index {index}"))
            })?;

        if !ALLOWED_PCR_LENGTHS.contains(&value.len()) {
            return Err(EnclaveAttestationError::schema(
                PCRS,
                format!("invalid PCR{index} length {}", value.len()),
            ));
        }

        if pcrs.insert(index, value).is_some() {
            return Err(EnclaveAttestationError::schema(
                PCRS,
                format!("duplicate PCR index {index}"),
            ));
        }
    }

    Ok(AttestationDocument {
        module_id,
        timestamp,
        digest,
        pcrs,
        certificate,
        cabundle,
        public_key,
        user_data,
        nonce,
    })
}

/// Lookup view over the top-level payload map
struct PayloadFields<'a> {
    entries: &'a [(Value, Value)],
}

impl<'a> PayloadFields<'a> {
    const fn new(entries: &'a [(Value, Value)]) -> Self {
        Self { entries }
    }

    /// Unknown keys are ignored. `null` counts as absent.
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(key, _)| key.as_text() == Some(name))
            .map(|(_, value)| value)
            .filter(|value| !value.is_null())
    }

    fn required(&self, name: &'static str) -> EnclaveAttestationResult<&'a Value> {
        self.get(name)
            .ok_or_else(|| EnclaveAttestationError::schema(name, "missing"))
    }

    fn text(&self, name: &'static str) -> EnclaveAttestationResult<String> {
        self.required(name)?
            .as_text()
            .map(ToOwned::to_owned)
            .ok_or_else(|| EnclaveAttestationError::schema(name, "expected a text string"))
    }

    fn bytes(&self, name: &'static str) -> EnclaveAttestationResult<Vec<u8>> {
        self.required(name)?
            .as_bytes()
            .cloned()
            .ok_or_else(|| EnclaveAttestationError::schema(name, "expected a byte string"))
    }

    fn optional_bytes(
        &self,
        name: &'static str,
        max_len: usize,
    ) -> EnclaveAttestationResult<Option<Vec<u8>>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };

        let bytes = value
            .as_bytes()
            .ok_or_else(|| EnclaveAttestationError::schema(name, "expected a byte string"))?;

        if bytes.len() > max_len {
            return Err(EnclaveAttestationError::schema(
                name,
                format!("length {} exceeds limit {max_len}", bytes.len()),
            ));
        }

        Ok(Some(bytes.clone()))
    }

    fn timestamp(&self) -> EnclaveAttestationResult<u64> {
        let value = self.required(TIMESTAMP)?;
        let integer = value
            .as_integer()
            .ok_or_else(|| EnclaveAttestationError::schema(TIMESTAMP, "expected an integer"))?;

        u64::try_from(integer)
            .ok()
            .filter(|t| *t > 0)
            .ok_or_else(|| EnclaveAttestationError::schema(TIMESTAMP, "must be positive"))
    }

    /// PCR entries with integer keys and byte string values; index range and
    /// value lengths are checked by the caller
    fn pcrs(&self) -> EnclaveAttestationResult<Vec<(i128, Vec<u8>)>> {
        let entries = self
            .required(PCRS)?
            .as_map()
            .ok_or_else(|| EnclaveAttestationError::schema(PCRS, "expected a map"))?;

        if entries.is_empty() || entries.len() > MAX_PCR_COUNT {
            return Err(EnclaveAttestationError::schema(
                PCRS,
                format!("size {} out of bounds 1..={MAX_PCR_COUNT}", entries.len()),
            ));
        }

        let mut pcrs = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let index = key.as_integer().map(i128::from).ok_or_else(|| {
                EnclaveAttestationError::schema(PCRS, "expected integer PCR indices")
            })?;
            let measurement = value.as_bytes().ok_or_else(|| {
                EnclaveAttestationError::schema(PCRS, format!("PCR{index} is not a byte string"))
            })?;
            pcrs.push((index, measurement.clone()));
        }

        Ok(pcrs)
    }

    fn cabundle(&self) -> EnclaveAttestationResult<Vec<Vec<u8>>> {
        let entries = self
            .required(CABUNDLE)?
            .as_array()
            .ok_or_else(|| EnclaveAttestationError::schema(CABUNDLE, "expected an array"))?;

        if entries.is_empty() {
            return Err(EnclaveAttestationError::schema(CABUNDLE, "must not be empty"));
        }

        let mut cabundle = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let cert = entry.as_bytes().ok_or_else(|| {
                EnclaveAttestationError::schema(
                    CABUNDLE,
                    format!("cabundle[{i}] is not a byte string"),
                )
            })?;

            if cert.is_empty() || cert.len() > MAX_CABUNDLE_ENTRY_LENGTH {
                return Err(EnclaveAttestationError::schema(
                    CABUNDLE,
                    format!("invalid cabundle[{i}] length {}", cert.len()),
                ));
            }

            cabundle.push(cert.clone());
        }

        Ok(cabundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn valid_entries() -> Vec<(Value, Value)> {
        vec![
            (text(MODULE_ID), text("i-0123-enc0456")),
            (text(DIGEST), text("SHA384")),
            (text(TIMESTAMP), Value::Integer(1_700_000_000u64.into())),
            (
                text(PCRS),
                Value::Map(vec![(Value::Integer(0.into()), Value::Bytes(vec![0; 32]))]),
            ),
            (text(CERTIFICATE), Value::Bytes(vec![0x30, 0x82])),
            (text(CABUNDLE), Value::Array(vec![Value::Bytes(vec![0x30; 16])])),
        ]
    }

    fn encode(entries: Vec<(Value, Value)>) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(&Value::Map(entries), &mut out).unwrap();
        out
    }

    fn with(name: &str, value: Value) -> Vec<u8> {
        let mut entries = valid_entries();
        entries.retain(|(k, _)| k.as_text() != Some(name));
        entries.push((text(name), value));
        encode(entries)
    }

    fn pcr_map(count: usize, len: usize) -> Value {
        Value::Map(
            (0..count)
                .map(|i| (Value::Integer((i as u64).into()), Value::Bytes(vec![0; len])))
                .collect(),
        )
    }

    fn violation(payload: &[u8]) -> (&'static str, String) {
        match validate_fields(payload) {
            Err(EnclaveAttestationError::SchemaViolation { field, reason }) => (field, reason),
            other => panic!("expected a schema violation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_document() {
        let mut entries = valid_entries();
        entries.push((text("unknown_key"), Value::Bool(true)));
        entries.push((text(NONCE), Value::Bytes(vec![9; 16])));
        entries.push((text(USER_DATA), Value::Null));

        let doc = validate_fields(&encode(entries)).unwrap();
        assert_eq!(doc.module_id, "i-0123-enc0456");
        assert_eq!(doc.timestamp, 1_700_000_000);
        assert_eq!(doc.pcrs, BTreeMap::from([(0, vec![0; 32])]));
        assert_eq!(doc.cabundle.len(), 1);
        assert_eq!(doc.nonce, Some(vec![9; 16]));
        assert_eq!(doc.user_data, None);
        assert_eq!(doc.public_key, None);
    }

    #[test]
    fn test_each_missing_required_field_is_named() {
        for name in REQUIRED_FIELDS {
            let mut entries = valid_entries();
            entries.retain(|(k, _)| k.as_text() != Some(name));
            assert_eq!(violation(&encode(entries)).0, name);
        }
    }

    #[test]
    fn test_first_missing_field_wins() {
        let mut entries = valid_entries();
        entries.retain(|(k, _)| ![CABUNDLE, DIGEST, PCRS].contains(&k.as_text().unwrap()));
        assert_eq!(violation(&encode(entries)).0, DIGEST);
    }

    #[test]
    fn test_pcr_bounds() {
        for len in ALLOWED_PCR_LENGTHS {
            assert!(validate_fields(&with(PCRS, pcr_map(1, len))).is_ok());
        }
        assert!(validate_fields(&with(PCRS, pcr_map(32, 48))).is_ok());

        let (field, reason) = violation(&with(PCRS, pcr_map(1, 47)));
        assert_eq!(field, PCRS);
        assert!(reason.contains("length 47"));

        let (field, reason) = violation(&with(PCRS, pcr_map(33, 48)));
        assert_eq!(field, PCRS);
        assert!(reason.contains("size 33"));

        assert_eq!(violation(&with(PCRS, pcr_map(0, 48))).0, PCRS);

        let out_of_range = Value::Map(vec![(Value::Integer(32.into()), Value::Bytes(vec![0; 48]))]);
        assert!(violation(&with(PCRS, out_of_range)).1.contains("index 32"));

        let negative = Value::Map(vec![(Value::Integer((-1).into()), Value::Bytes(vec![0; 48]))]);
        assert!(violation(&with(PCRS, negative)).1.contains("index -1"));
    }

    #[test]
    fn test_digest_must_be_sha384() {
        let (field, reason) = violation(&with(DIGEST, text("SHA256")));
        assert_eq!(field, DIGEST);
        assert!(reason.contains("SHA256"));
    }

    #[test]
    fn test_type_mismatch_is_a_schema_violation() {
        assert_eq!(violation(&with(TIMESTAMP, text("now"))).0, TIMESTAMP);
        assert_eq!(violation(&with(MODULE_ID, Value::Bytes(vec![1]))).0, MODULE_ID);
        assert_eq!(violation(&with(CABUNDLE, Value::Bytes(vec![1]))).0, CABUNDLE);
        assert_eq!(violation(&with(PCRS, Value::Array(vec![]))).0, PCRS);
        assert_eq!(violation(&with(NONCE, text("abc"))).0, NONCE);
    }

    #[test]
    fn test_bounds_on_byte_fields() {
        assert_eq!(violation(&with(MODULE_ID, text(""))).0, MODULE_ID);
        assert_eq!(violation(&with(TIMESTAMP, Value::Integer(0.into()))).0, TIMESTAMP);
        assert_eq!(violation(&with(CERTIFICATE, Value::Bytes(vec![]))).0, CERTIFICATE);
        assert_eq!(violation(&with(CABUNDLE, Value::Array(vec![]))).0, CABUNDLE);
        assert_eq!(
            violation(&with(CABUNDLE, Value::Array(vec![Value::Bytes(vec![0; 1025])]))).0,
            CABUNDLE
        );
        assert_eq!(
            violation(&with(PUBLIC_KEY, Value::Bytes(vec![0; 1025]))).0,
            PUBLIC_KEY
        );
        assert_eq!(violation(&with(USER_DATA, Value::Bytes(vec![0; 513]))).0, USER_DATA);
        assert_eq!(violation(&with(NONCE, Value::Bytes(vec![0; 513]))).0, NONCE);
        assert!(validate_fields(&with(NONCE, Value::Bytes(vec![0; 512]))).is_ok());
    }

    #[test]
    fn test_payload_must_be_a_map() {
        let mut out = Vec::new();
        ciborium::into_writer(&Value::Array(vec![]), &mut out).unwrap();
        assert_eq!(violation(&out).0, "payload");
        assert_eq!(violation(&[0xff, 0x00]).0, "payload");
    }
}
