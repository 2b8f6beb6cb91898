use std::time::Duration;

/// AWS Nitro Enclaves Root-G1 distribution archive
/// More info: <https://docs.aws.amazon.com/enclaves/latest/user/verify-root.html>
pub const AWS_NITRO_ROOT_ARCHIVE_URL: &str =
    "https://aws-nitro-enclaves.amazonaws.com/AWS_NitroEnclaves_Root-G1.zip";

/// SHA-256 of `AWS_NitroEnclaves_Root-G1.zip`, hex encoded
pub const AWS_NITRO_ROOT_ARCHIVE_SHA256: &str =
    "8cf60e2b2efca96c6a9e71e851d00c1b6991cc09eadbe64a6a1d1b1eb9faff7c";

/// Name of the archive member holding the PEM-encoded root certificate
pub const AWS_NITRO_ROOT_ARCHIVE_MEMBER: &str = "root.pem";

/// Default timeout for fetching the root archive
pub const DEFAULT_TRUST_ANCHOR_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// The only digest Nitro hardware reports
pub const SUPPORTED_DIGEST: &str = "SHA384";

/// Number of platform configuration registers
pub const MAX_PCR_COUNT: usize = 32;

/// Allowed PCR value lengths (SHA-256, SHA-384, SHA-512)
pub const ALLOWED_PCR_LENGTHS: [usize; 3] = [32, 48, 64];

/// Upper bound of a single `cabundle` entry
pub const MAX_CABUNDLE_ENTRY_LENGTH: usize = 1024;

/// Upper bound of the optional `public_key` field
pub const MAX_PUBLIC_KEY_LENGTH: usize = 1024;

/// Upper bound of the optional `user_data` and `nonce` fields
pub const MAX_USER_DATA_LENGTH: usize = 512;

/// ES384 signatures are raw `r || s`, 48 bytes each
pub const ES384_SIGNATURE_LENGTH: usize = 96;
