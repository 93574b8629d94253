//! Identities, fingerprints, SRTP profiles and the DTLS record engine.

mod error;
pub use error::CryptoError;

mod finger;
pub use finger::Fingerprint;

mod keying;
pub use keying::KeyingMaterial;

mod srtp_profile;
pub use srtp_profile::SrtpProfile;

pub(crate) mod engine;
pub use engine::{EngineEvent, EngineFactory, SecureRecordEngine, SslMode};

mod ossl;
pub(crate) use ossl::message_digest;
pub use ossl::{DtlsIdentity, OsslEngine, OsslEngineFactory, PeerCertificate};
pub use ossl::{DTLS_CERT_IDENTITY, DTLS_MTU};

/// Label for exporting SRTP keying material, as per RFC 5764 4.2.
pub const DTLS_SRTP_KEY_LABEL: &str = "EXTRACTOR-dtls_srtp";
