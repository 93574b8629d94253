use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use openssl::asn1::{Asn1Integer, Asn1Time, Asn1Type};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Name, X509};

use crate::crypto::{CryptoError, Fingerprint};

// libWebRTC says "WebRTC" here when doing OpenSSL, for BoringSSL they seem
// to generate a random 8 characters.
// https://webrtc.googlesource.com/src/+/1568f1b1330f94494197696fe235094e6293b258/rtc_base/rtc_certificate_generator.cc#27
/// Common name of generated certificates.
pub const DTLS_CERT_IDENTITY: &str = "WebRTC";

const CERT_VALID_DAYS: u32 = 30;

/// Maps the SDP name of a hash function (`sha-256`) to the OpenSSL digest.
pub(crate) fn message_digest(hash_func: &str) -> Result<MessageDigest, CryptoError> {
    let md = match hash_func.to_ascii_lowercase().as_str() {
        "md5" => MessageDigest::md5(),
        "sha-1" => MessageDigest::sha1(),
        "sha-224" => MessageDigest::sha224(),
        "sha-256" => MessageDigest::sha256(),
        "sha-384" => MessageDigest::sha384(),
        "sha-512" => MessageDigest::sha512(),
        _ => return Err(CryptoError::UnknownDigest(hash_func.to_string())),
    };
    Ok(md)
}

/// Local identity for DTLS, a key pair and a self signed certificate.
///
/// Cloning hands out another reference to the same identity. The record
/// engine holds its own reference for the lifetime of the session.
#[derive(Clone)]
pub struct DtlsIdentity(Arc<IdentityInner>);

struct IdentityInner {
    pkey: PKey<Private>,
    x509: X509,
}

impl DtlsIdentity {
    /// Creates a new self signed ECDSA (P-256) identity.
    // The libWebRTC code we try to match is at:
    // https://webrtc.googlesource.com/src/+/1568f1b1330f94494197696fe235094e6293b258/rtc_base/openssl_certificate.cc#58
    pub fn generate() -> Result<Self, CryptoError> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
        let key = EcKey::generate(&group)?;
        let pkey = PKey::from_ec_key(key)?;

        let mut x509b = X509::builder()?;
        x509b.set_version(2)?; // X509.V3 (zero indexed)

        // For Firefox, the serial number must be unique across all certificates, including those of other
        // processes/machines! See https://github.com/versatica/mediasoup/issues/127#issuecomment-474460153
        let mut serial_buf = [0u8; 16];
        openssl::rand::rand_bytes(&mut serial_buf)?;

        let serial_bn = BigNum::from_slice(&serial_buf)?;
        let serial = Asn1Integer::from_bn(&serial_bn)?;
        x509b.set_serial_number(&serial)?;
        let before = Asn1Time::from_unix(unix_time() - 3600)?;
        x509b.set_not_before(&before)?;
        let after = Asn1Time::days_from_now(CERT_VALID_DAYS)?;
        x509b.set_not_after(&after)?;
        x509b.set_pubkey(&pkey)?;

        let mut nameb = X509Name::builder()?;
        nameb.append_entry_by_nid_with_type(
            Nid::COMMONNAME,
            DTLS_CERT_IDENTITY,
            Asn1Type::UTF8STRING,
        )?;
        let name = nameb.build();

        x509b.set_subject_name(&name)?;
        x509b.set_issuer_name(&name)?;

        x509b.sign(&pkey, MessageDigest::sha256())?;
        let x509 = x509b.build();

        Ok(DtlsIdentity(Arc::new(IdentityInner { pkey, x509 })))
    }

    /// Loads an identity from a PEM encoded certificate and private key.
    pub fn from_pem(certificate: &[u8], private_key: &[u8]) -> Result<Self, CryptoError> {
        let x509 = X509::from_pem(certificate)?;
        let pkey = PKey::private_key_from_pem(private_key)?;
        Ok(DtlsIdentity(Arc::new(IdentityInner { pkey, x509 })))
    }

    /// Hands out another reference to this identity.
    pub fn clone_reference(&self) -> Self {
        self.clone()
    }

    /// Tells if both handles refer to the same identity.
    pub fn ptr_eq(&self, other: &DtlsIdentity) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Digest of the certificate using the hash function named as in SDP.
    pub fn digest(&self, hash_func: &str) -> Result<Vec<u8>, CryptoError> {
        let md = message_digest(hash_func)?;
        Ok(self.0.x509.digest(md)?.to_vec())
    }

    /// Produce a (public) fingerprint of the cert.
    ///
    /// This is sent via SDP to the other peer to lock down the DTLS
    /// to this specific certificate.
    pub fn fingerprint(&self, hash_func: &str) -> Result<Fingerprint, CryptoError> {
        Ok(Fingerprint {
            hash_func: hash_func.to_ascii_lowercase(),
            bytes: self.digest(hash_func)?,
        })
    }

    /// The certificate of this identity, as a remote peer would see it.
    pub fn certificate(&self) -> PeerCertificate {
        PeerCertificate(self.0.x509.clone())
    }

    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.0.pkey
    }

    pub(crate) fn x509(&self) -> &X509 {
        &self.0.x509
    }
}

impl fmt::Debug for DtlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fp = self.fingerprint("sha-256").map(|f| f.to_string());
        f.debug_tuple("DtlsIdentity")
            .field(&fp.unwrap_or_default())
            .finish()
    }
}

/// The certificate presented by the remote peer during the handshake.
#[derive(Clone)]
pub struct PeerCertificate(X509);

impl PeerCertificate {
    pub(crate) fn new(x509: X509) -> Self {
        PeerCertificate(x509)
    }

    /// Digest of the certificate using the hash function named as in SDP.
    pub fn digest(&self, hash_func: &str) -> Result<Vec<u8>, CryptoError> {
        let md = message_digest(hash_func)?;
        Ok(self.0.digest(md)?.to_vec())
    }

    /// DER encoding of the certificate.
    pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.0.to_der()?)
    }
}

impl fmt::Debug for PeerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fp = self
            .digest("sha-256")
            .map(|bytes| Fingerprint::new("sha-256", bytes).to_string());
        f.debug_tuple("PeerCertificate")
            .field(&fp.unwrap_or_default())
            .finish()
    }
}

// Only used for the not-before time of generated certificates, which is
// backdated an hour anyway.
fn unix_time() -> libc::time_t {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as libc::time_t
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digest_lengths() {
        let id = DtlsIdentity::generate().unwrap();

        assert_eq!(id.digest("sha-1").unwrap().len(), 20);
        assert_eq!(id.digest("sha-256").unwrap().len(), 32);
        assert_eq!(id.digest("SHA-512").unwrap().len(), 64);
        assert!(matches!(
            id.digest("sha-3"),
            Err(CryptoError::UnknownDigest(_))
        ));
    }

    #[test]
    fn certificate_digest_matches_identity() {
        let id = DtlsIdentity::generate().unwrap();
        let cert = id.certificate();

        assert_eq!(
            cert.digest("sha-256").unwrap(),
            id.digest("sha-256").unwrap()
        );
        assert!(!cert.to_der().unwrap().is_empty());
    }

    #[test]
    fn generated_identities_differ() {
        let a = DtlsIdentity::generate().unwrap();
        let b = DtlsIdentity::generate().unwrap();

        assert_ne!(
            a.fingerprint("sha-256").unwrap(),
            b.fingerprint("sha-256").unwrap()
        );
        assert!(a.ptr_eq(&a.clone_reference()));
        assert!(!a.ptr_eq(&b));
    }
}
