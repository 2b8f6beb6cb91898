// Not every helper is used in every test, so we allow dead code
#![allow(dead_code)]

use ciborium::Value;
use coset::{iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder, TaggedCborSerializable};
use p384::ecdsa::{signature::Signer, Signature, SigningKey};
use p384::pkcs8::DecodePrivateKey;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    PKCS_ECDSA_P384_SHA384,
};

pub const MODULE_ID: &str = "i-0f1e2d3c4b5a69788-enc0123456789abcdef";
pub const TIMESTAMP: u64 = 1_700_000_000;

/// Initialize tracing for tests
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// A certificate together with the key that certifies it
pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_pkcs8_der(&self.key.serialize_der()).expect("P-384 PKCS#8 key")
    }
}

pub fn params(common_name: &str, ca: bool, validity: (i32, i32)) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, "Amazon");
    name.push(DnType::CommonName, common_name);
    params.distinguished_name = name;
    params.is_ca = if ca {
        IsCa::Ca(BasicConstraints::Unconstrained)
    } else {
        IsCa::NoCa
    };
    params.not_before = rcgen::date_time_ymd(validity.0, 1, 1);
    params.not_after = rcgen::date_time_ymd(validity.1, 1, 1);
    params
}

fn new_key() -> KeyPair {
    KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).expect("P-384 key pair")
}

pub fn self_signed_root(common_name: &str) -> Issued {
    let key = new_key();
    let cert = params(common_name, true, (2019, 2099))
        .self_signed(&key)
        .expect("self-signed root");
    Issued { cert, key }
}

pub fn issue(issuer: &Issued, common_name: &str, ca: bool, validity: (i32, i32)) -> Issued {
    issue_with(issuer, params(common_name, ca, validity))
}

pub fn issue_with(issuer: &Issued, params: CertificateParams) -> Issued {
    let key = new_key();
    let cert = params
        .signed_by(&key, &issuer.cert, &issuer.key)
        .expect("issued certificate");
    Issued { cert, key }
}

/// Root -> intermediate -> leaf, all ECDSA P-384
pub struct TestPki {
    pub root: Issued,
    pub intermediate: Issued,
    pub leaf: Issued,
}

impl TestPki {
    pub fn new() -> Self {
        let root = self_signed_root("aws.nitro-enclaves");
        let intermediate = issue(&root, "zonal.eu-west-1.aws.nitro-enclaves", true, (2020, 2098));
        let leaf = issue(&intermediate, MODULE_ID, false, (2021, 2097));
        Self {
            root,
            intermediate,
            leaf,
        }
    }

    pub fn root_pem(&self) -> Vec<u8> {
        self.root.pem().into_bytes()
    }

    /// Document fields certified by this PKI
    pub fn document(&self) -> DocumentBuilder {
        DocumentBuilder::new(self.leaf.der(), vec![self.intermediate.der()])
    }
}

/// Builds attestation document payloads field by field
#[derive(Clone)]
pub struct DocumentBuilder {
    fields: Vec<(String, Value)>,
}

impl DocumentBuilder {
    pub fn new(certificate: Vec<u8>, cabundle: Vec<Vec<u8>>) -> Self {
        let fields = vec![
            ("module_id".to_string(), Value::Text(MODULE_ID.to_string())),
            ("digest".to_string(), Value::Text("SHA384".to_string())),
            ("timestamp".to_string(), Value::Integer(TIMESTAMP.into())),
            (
                "pcrs".to_string(),
                Value::Map(vec![(Value::Integer(0.into()), Value::Bytes(vec![0; 32]))]),
            ),
            ("certificate".to_string(), Value::Bytes(certificate)),
            (
                "cabundle".to_string(),
                Value::Array(cabundle.into_iter().map(Value::Bytes).collect()),
            ),
            ("public_key".to_string(), Value::Null),
            ("user_data".to_string(), Value::Null),
            ("nonce".to_string(), Value::Null),
        ];
        Self { fields }
    }

    pub fn set(mut self, name: &str, value: Value) -> Self {
        self.fields.retain(|(key, _)| key != name);
        self.fields.push((name.to_string(), value));
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.fields.retain(|(key, _)| key != name);
        self
    }

    pub fn payload(&self) -> Vec<u8> {
        let map = Value::Map(
            self.fields
                .iter()
                .map(|(key, value)| (Value::Text(key.clone()), value.clone()))
                .collect(),
        );
        let mut out = Vec::new();
        ciborium::into_writer(&map, &mut out).expect("CBOR payload");
        out
    }
}

/// Signs `payload` as an ES384 COSE_Sign1 envelope
pub fn sign(payload: Vec<u8>, key: &SigningKey) -> CoseSign1 {
    sign_with_algorithm(payload, key, iana::Algorithm::ES384)
}

pub fn sign_with_algorithm(payload: Vec<u8>, key: &SigningKey, alg: iana::Algorithm) -> CoseSign1 {
    CoseSign1Builder::new()
        .protected(HeaderBuilder::new().algorithm(alg).build())
        .payload(payload)
        .create_signature(&[], |tbs| {
            let signature: Signature = key.sign(tbs);
            signature.to_bytes().to_vec()
        })
        .build()
}

pub fn untagged(sign1: CoseSign1) -> Vec<u8> {
    sign1.to_vec().expect("COSE encoding")
}

pub fn tagged(sign1: CoseSign1) -> Vec<u8> {
    sign1.to_tagged_vec().expect("COSE encoding")
}

/// A correctly signed document certified by `pki`
pub fn signed_document(pki: &TestPki, document: &DocumentBuilder) -> Vec<u8> {
    untagged(sign(document.payload(), &pki.leaf.signing_key()))
}
