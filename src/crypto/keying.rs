use std::fmt;
use std::ops::Deref;

use super::SrtpProfile;

/// Keying material used as master key for SRTP.
///
/// Laid out as per RFC 5764 4.2:
/// `client_write_key | server_write_key | client_write_salt | server_write_salt`.
pub struct KeyingMaterial {
    profile: SrtpProfile,
    material: Vec<u8>,
}

impl KeyingMaterial {
    pub(crate) fn new(profile: SrtpProfile, material: Vec<u8>) -> Self {
        assert_eq!(
            material.len(),
            profile.keying_material_len(),
            "Keying material length must match SRTP profile"
        );
        KeyingMaterial { profile, material }
    }

    /// The SRTP profile this material was exported for.
    pub fn profile(&self) -> SrtpProfile {
        self.profile
    }

    /// Master key used by the DTLS client to protect outgoing SRTP.
    pub fn client_key(&self) -> &[u8] {
        let k = self.key_len();
        &self.material[..k]
    }

    /// Master key used by the DTLS server to protect outgoing SRTP.
    pub fn server_key(&self) -> &[u8] {
        let k = self.key_len();
        &self.material[k..2 * k]
    }

    /// Master salt paired with [`KeyingMaterial::client_key`].
    pub fn client_salt(&self) -> &[u8] {
        let (k, s) = (self.key_len(), self.salt_len());
        &self.material[2 * k..2 * k + s]
    }

    /// Master salt paired with [`KeyingMaterial::server_key`].
    pub fn server_salt(&self) -> &[u8] {
        let (k, s) = (self.key_len(), self.salt_len());
        &self.material[2 * k + s..]
    }

    fn key_len(&self) -> usize {
        match self.profile {
            SrtpProfile::AeadAes256Gcm => 32,
            _ => 16,
        }
    }

    fn salt_len(&self) -> usize {
        (self.material.len() - 2 * self.key_len()) / 2
    }
}

impl Deref for KeyingMaterial {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.material
    }
}

impl fmt::Debug for KeyingMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyingMaterial({})", self.profile)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_aes_cm() {
        let m: Vec<u8> = (0..60).collect();
        let k = KeyingMaterial::new(SrtpProfile::Aes128CmSha1_80, m);

        assert_eq!(k.client_key(), &(0..16).collect::<Vec<u8>>()[..]);
        assert_eq!(k.server_key(), &(16..32).collect::<Vec<u8>>()[..]);
        assert_eq!(k.client_salt(), &(32..46).collect::<Vec<u8>>()[..]);
        assert_eq!(k.server_salt(), &(46..60).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn split_aead_256() {
        let k = KeyingMaterial::new(SrtpProfile::AeadAes256Gcm, vec![0; 88]);
        assert_eq!(k.client_key().len(), 32);
        assert_eq!(k.server_salt().len(), 12);
    }

    #[test]
    fn debug_hides_material() {
        let k = KeyingMaterial::new(SrtpProfile::AeadAes128Gcm, vec![7; 56]);
        assert_eq!(format!("{:?}", k), "KeyingMaterial(AEAD_AES_128_GCM)");
    }
}
