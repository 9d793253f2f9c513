use std::time::Duration;

/// Name recorded in `tool_name` for blocks produced by this crate
pub const TOOL_NAME: &str = "avcf";
/// Version recorded in `tool_version` for blocks produced by this crate
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of hex characters of a SHA-256 essence digest
pub const VIDEO_HASH_HEX_LEN: usize = 64;

/// Byte lengths a key fingerprint may have (v4 and v6 keys respectively)
pub const FINGERPRINT_LENGTHS: [usize; 2] = [20, 32];

/// Prefix of the framed essence byte stream that gets hashed
pub const ESSENCE_STREAM_MAGIC: &[u8] = b"AVCF-ESSENCE-1";

pub const SIGNATURE_ARMOR_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";
pub const SIGNATURE_ARMOR_END: &str = "-----END PGP SIGNATURE-----";

/// Timestamps are written with whole second precision and a `Z` suffix
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
