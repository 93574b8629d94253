//! OpenSSL implementation of the record engine and identities.

use super::SrtpProfile;

mod cert;
mod engine;
mod stream;

pub(crate) use cert::message_digest;
pub use cert::{DtlsIdentity, PeerCertificate, DTLS_CERT_IDENTITY};
pub use engine::{OsslEngine, OsslEngineFactory, DTLS_MTU};

impl SrtpProfile {
    /// What this profile is called in OpenSSL parlance.
    pub(crate) fn openssl_name(&self) -> &'static str {
        match self {
            SrtpProfile::Aes128CmSha1_80 => "SRTP_AES128_CM_SHA1_80",
            SrtpProfile::Aes128CmSha1_32 => "SRTP_AES128_CM_SHA1_32",
            SrtpProfile::AeadAes128Gcm => "SRTP_AEAD_AES_128_GCM",
            SrtpProfile::AeadAes256Gcm => "SRTP_AEAD_AES_256_GCM",
        }
    }
}
