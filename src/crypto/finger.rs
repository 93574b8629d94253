use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Certificate fingerprint.
///
/// DTLS uses self signed certificates, and the fingerprint is communicated via
/// SDP to let the remote peer verify who is connecting.
///
/// An empty fingerprint (no hash function, no digest) is how a remote peer
/// that declined DTLS is represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hash function used to produce the `bytes`.
    ///
    /// This is normally `sha-256`.
    pub hash_func: String,

    /// Digest of the certificate by the algorithm in `hash_func`.
    pub bytes: Vec<u8>,
}

impl Fingerprint {
    /// Creates a fingerprint from a hash function name and a digest.
    pub fn new(hash_func: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Fingerprint {
            hash_func: hash_func.into(),
            bytes: bytes.into(),
        }
    }

    /// The fingerprint of a peer that doesn't do DTLS.
    pub fn empty() -> Self {
        Fingerprint {
            hash_func: String::new(),
            bytes: vec![],
        }
    }

    /// Tells if this fingerprint carries neither hash function nor digest.
    pub fn is_empty(&self) -> bool {
        self.hash_func.is_empty() && self.bytes.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    /// Convert to the hex string you find in SDP
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.hash_func)?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(hex_string: &str) -> Result<Self, Self::Err> {
        let (hash_func, hex_with_colons) = hex_string
            .trim()
            .split_once(' ')
            .ok_or_else(|| "Failed to split once".to_owned())?;

        let mut bytes = Vec::new();
        for hex in hex_with_colons.split(':') {
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|e| format!("Failed to parse fingerprint: {}", e))?;
            bytes.push(byte);
        }

        Ok(Self {
            hash_func: hash_func.to_ascii_lowercase(),
            bytes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sdp_form_round_trip() {
        let s = "sha-256 0A:FF:10:3C";
        let fp: Fingerprint = s.parse().unwrap();

        assert_eq!(fp.hash_func, "sha-256");
        assert_eq!(fp.bytes, vec![0x0a, 0xff, 0x10, 0x3c]);
        assert_eq!(fp.to_string(), s);
    }

    #[test]
    fn hash_func_is_lowercased() {
        let fp: Fingerprint = "SHA-1 01:02".parse().unwrap();
        assert_eq!(fp.hash_func, "sha-1");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("sha-256".parse::<Fingerprint>().is_err());
        assert!("sha-256 ZZ:01".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn empty_fingerprint() {
        assert!(Fingerprint::empty().is_empty());
        assert!(!Fingerprint::new("sha-256", vec![1]).is_empty());
    }
}
