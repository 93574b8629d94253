use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// SRTP protection profiles that can be negotiated via the DTLS `use_srtp` extension.
///
/// The list of profiles is ordered by preference when handed to the transport. The
/// intersection with the remote peer's list picks at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SrtpProfile {
    /// `AES_CM_128_HMAC_SHA1_80` (RFC 5764).
    Aes128CmSha1_80,
    /// `AES_CM_128_HMAC_SHA1_32` (RFC 5764).
    Aes128CmSha1_32,
    /// `AEAD_AES_128_GCM` (RFC 7714).
    AeadAes128Gcm,
    /// `AEAD_AES_256_GCM` (RFC 7714).
    AeadAes256Gcm,
}

impl SrtpProfile {
    /// All the profiles we support, ordered from most preferred to least.
    pub const ALL: &'static [SrtpProfile] = &[
        SrtpProfile::AeadAes128Gcm,
        SrtpProfile::AeadAes256Gcm,
        SrtpProfile::Aes128CmSha1_80,
        SrtpProfile::Aes128CmSha1_32,
    ];

    /// The IANA registered identifier of the profile.
    pub fn iana_id(&self) -> u16 {
        match self {
            SrtpProfile::Aes128CmSha1_80 => 0x0001,
            SrtpProfile::Aes128CmSha1_32 => 0x0002,
            SrtpProfile::AeadAes128Gcm => 0x0007,
            SrtpProfile::AeadAes256Gcm => 0x0008,
        }
    }

    /// Looks up a profile by IANA identifier.
    pub fn from_iana_id(id: u16) -> Option<Self> {
        SrtpProfile::ALL.iter().copied().find(|p| p.iana_id() == id)
    }

    /// Name of the profile as used in SDP and the IANA registry.
    pub fn name(&self) -> &'static str {
        match self {
            SrtpProfile::Aes128CmSha1_80 => "AES_CM_128_HMAC_SHA1_80",
            SrtpProfile::Aes128CmSha1_32 => "AES_CM_128_HMAC_SHA1_32",
            SrtpProfile::AeadAes128Gcm => "AEAD_AES_128_GCM",
            SrtpProfile::AeadAes256Gcm => "AEAD_AES_256_GCM",
        }
    }

    /// The length of keying material to extract from the DTLS session in bytes.
    #[rustfmt::skip]
    pub fn keying_material_len(&self) -> usize {
        match self {
            // MASTER_KEY_LEN * 2 + MASTER_SALT * 2
            SrtpProfile::Aes128CmSha1_80 => 16 * 2 + 14 * 2,
            SrtpProfile::Aes128CmSha1_32 => 16 * 2 + 14 * 2,
            SrtpProfile::AeadAes128Gcm   => 16 * 2 + 12 * 2,
            SrtpProfile::AeadAes256Gcm   => 32 * 2 + 12 * 2,
        }
    }
}

impl fmt::Display for SrtpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SrtpProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SrtpProfile::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown SRTP profile: {}", s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_sdp_names() {
        let p: SrtpProfile = "AES_CM_128_HMAC_SHA1_80".parse().unwrap();
        assert_eq!(p, SrtpProfile::Aes128CmSha1_80);
        assert_eq!(p.to_string(), "AES_CM_128_HMAC_SHA1_80");

        assert!("AES_CM_256_NOPE".parse::<SrtpProfile>().is_err());
    }

    #[test]
    fn iana_ids_are_unique() {
        for p in SrtpProfile::ALL {
            assert_eq!(SrtpProfile::from_iana_id(p.iana_id()), Some(*p));
        }
        assert_eq!(SrtpProfile::from_iana_id(0x0005), None);
    }

    #[test]
    fn keying_material_lengths() {
        assert_eq!(SrtpProfile::Aes128CmSha1_80.keying_material_len(), 60);
        assert_eq!(SrtpProfile::AeadAes128Gcm.keying_material_len(), 56);
        assert_eq!(SrtpProfile::AeadAes256Gcm.keying_material_len(), 88);
    }
}
