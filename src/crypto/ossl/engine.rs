use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::mem;
use std::time::{Duration, Instant};

use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::ssl::{Ssl, SslContext, SslContextBuilder, SslMethod, SslOptions, SslVerifyMode};

use crate::crypto::engine::{EngineEvent, EngineFactory, SecureRecordEngine, SslMode};
use crate::crypto::{CryptoError, Fingerprint, SrtpProfile};
use crate::error::EngineError;
use crate::role::DtlsRole;
use crate::stream::RecordStream;

use super::cert::{message_digest, DtlsIdentity, PeerCertificate};
use super::stream::TlsStream;

const DTLS_CIPHERS: &str = "EECDH+AESGCM:EDH+AESGCM:AES256+EECDH:AES256+EDH";
const DTLS_EC_CURVE: Nid = Nid::X9_62_PRIME256V1;

/// Path MTU assumed for handshake flights.
pub const DTLS_MTU: u32 = 1150;

/// Creates [`OsslEngine`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsslEngineFactory;

impl EngineFactory for OsslEngineFactory {
    fn create(&self, stream: RecordStream) -> Result<Box<dyn SecureRecordEngine>, EngineError> {
        Ok(Box::new(OsslEngine::new(stream)))
    }
}

/// DTLS 1.2 record engine on OpenSSL.
///
/// The OpenSSL context is only built when the handshake starts, since
/// identity and SRTP profiles are programmed into the context.
pub struct OsslEngine {
    identity: Option<DtlsIdentity>,
    role: DtlsRole,
    profiles: Vec<SrtpProfile>,
    fingerprint: Option<Fingerprint>,
    phase: Phase,
}

enum Phase {
    Configuring(RecordStream),
    Running {
        /// Pins the OpenSSL context from which the `Ssl` is created.
        _context: SslContext,
        tls: TlsStream<RecordStream>,
    },
    Taken,
}

impl OsslEngine {
    /// Creates an engine bound to `stream`, yet to be configured.
    pub fn new(stream: RecordStream) -> Self {
        OsslEngine {
            identity: None,
            role: DtlsRole::default(),
            profiles: vec![],
            fingerprint: None,
            phase: Phase::Configuring(stream),
        }
    }

    fn tls(&self) -> Option<&TlsStream<RecordStream>> {
        match &self.phase {
            Phase::Running { tls, .. } => Some(tls),
            _ => None,
        }
    }

    fn tls_mut(&mut self) -> Option<&mut TlsStream<RecordStream>> {
        match &mut self.phase {
            Phase::Running { tls, .. } => Some(tls),
            _ => None,
        }
    }

    fn handle_handshake(&mut self, out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError> {
        let Some(tls) = self.tls_mut() else {
            return Ok(());
        };

        if !tls.is_handshaking() {
            return Ok(());
        }

        let done = tls
            .complete_handshake_until_block()
            .map_err(|e| EngineError::Handshake(e.to_string()))?;

        if done {
            out.push_back(EngineEvent::Open);
            // Application data may have arrived in the last flight.
            out.push_back(EngineEvent::Readable);
        }

        Ok(())
    }
}

impl SecureRecordEngine for OsslEngine {
    fn set_local_identity(&mut self, identity: DtlsIdentity) {
        self.identity = Some(identity);
    }

    fn set_role(&mut self, role: DtlsRole) {
        self.role = role;
    }

    fn set_mode(&mut self, mode: SslMode) -> Result<(), EngineError> {
        match mode {
            SslMode::Datagram => Ok(()),
            SslMode::Stream => Err(EngineError::Start("stream mode is not supported".into())),
        }
    }

    fn set_peer_fingerprint(&mut self, fingerprint: &Fingerprint) -> Result<(), EngineError> {
        // The digest is checked by the transport, but the algorithm must exist.
        message_digest(&fingerprint.hash_func)?;
        self.fingerprint = Some(fingerprint.clone());
        Ok(())
    }

    fn set_srtp_cipher_list(&mut self, profiles: &[SrtpProfile]) -> Result<(), EngineError> {
        if !matches!(self.phase, Phase::Configuring(_)) {
            return Err(EngineError::Start(
                "SRTP profiles set after handshake start".into(),
            ));
        }
        self.profiles = profiles.to_vec();
        Ok(())
    }

    fn start_handshake(&mut self, out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError> {
        if !matches!(self.phase, Phase::Configuring(_)) {
            return Ok(());
        }

        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| EngineError::Start("no local identity".into()))?;

        let context = dtls_create_ctx(identity, &self.profiles)
            .map_err(|e| EngineError::Start(e.to_string()))?;
        let ssl = dtls_ssl_create(&context).map_err(|e| EngineError::Start(e.to_string()))?;

        let stream = match mem::replace(&mut self.phase, Phase::Taken) {
            Phase::Configuring(s) => s,
            other => {
                self.phase = other;
                return Ok(());
            }
        };

        debug!(
            "Start DTLS handshake as {} with SRTP profiles {:?}, expecting peer {:?}",
            self.role,
            self.profiles,
            self.fingerprint.as_ref().map(|f| f.hash_func.as_str())
        );

        self.phase = Phase::Running {
            _context: context,
            tls: TlsStream::new(ssl, stream, self.role),
        };

        self.handle_handshake(out)
    }

    fn drive(&mut self, out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError> {
        let readable = self.stream_mut().take_readable();

        let Some(tls) = self.tls() else {
            return Ok(());
        };

        if tls.is_handshaking() {
            self.handle_handshake(out)
        } else {
            if readable && tls.is_connected() {
                out.push_back(EngineEvent::Readable);
            }
            Ok(())
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.tls_mut() {
            Some(tls) if tls.is_connected() => tls.write(data),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "DTLS not established",
            )),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.tls_mut() {
            Some(tls) if tls.is_connected() => tls.read(buf),
            _ => Err(io::Error::new(io::ErrorKind::WouldBlock, "WouldBlock")),
        }
    }

    fn stream_mut(&mut self) -> &mut RecordStream {
        match &mut self.phase {
            Phase::Configuring(s) => s,
            Phase::Running { tls, .. } => tls.inner_mut(),
            Phase::Taken => panic!("stream_mut while starting handshake"),
        }
    }

    fn peer_certificate(&self) -> Option<PeerCertificate> {
        let tls = self.tls().filter(|t| t.is_connected())?;
        let x509 = tls.ssl()?.peer_certificate()?;
        Some(PeerCertificate::new(x509))
    }

    fn negotiated_srtp_profile(&self) -> Option<SrtpProfile> {
        let tls = self.tls().filter(|t| t.is_connected())?;
        let id = tls.ssl()?.selected_srtp_profile()?.id();
        SrtpProfile::from_iana_id(id.as_raw() as u16)
    }

    fn export_keying_material(
        &self,
        label: &str,
        context: Option<&[u8]>,
        len: usize,
    ) -> Result<Vec<u8>, EngineError> {
        let ssl = self
            .tls()
            .filter(|t| t.is_connected())
            .and_then(|t| t.ssl())
            .ok_or_else(|| EngineError::Closed(Some("DTLS not established".into())))?;

        let mut buf = vec![0_u8; len];
        ssl.export_keying_material(&mut buf, label, context)
            .map_err(CryptoError::from)?;

        Ok(buf)
    }

    fn poll_timeout(&self, now: Instant) -> Option<Instant> {
        // OpenSSL has a built-in timeout of 1 second that is doubled for
        // each retry. There is no direct control of it through the openssl
        // crate (DTLS_set_timer_cb), so poll often while handshaking.
        self.tls()
            .filter(|t| t.is_handshaking())
            .map(|_| now + Duration::from_millis(500))
    }

    fn handle_timeout(
        &mut self,
        _now: Instant,
        out: &mut VecDeque<EngineEvent>,
    ) -> Result<(), EngineError> {
        self.handle_handshake(out)
    }

    fn close(&mut self) {
        if let Some(tls) = self.tls_mut() {
            tls.shutdown();
        }
        if !matches!(self.phase, Phase::Taken) {
            self.stream_mut().close("DTLS engine closed");
        }
    }
}

pub fn dtls_create_ctx(
    identity: &DtlsIdentity,
    profiles: &[SrtpProfile],
) -> Result<SslContext, CryptoError> {
    // No safe way to ask for a 1.2-only method, NO_DTLSV1 below does it.
    let mut ctx = SslContextBuilder::new(SslMethod::dtls())?;

    ctx.set_cipher_list(DTLS_CIPHERS)?;

    if !profiles.is_empty() {
        let names: Vec<_> = profiles.iter().map(SrtpProfile::openssl_name).collect();
        ctx.set_tlsext_use_srtp(&names.join(":"))?;
    }

    // The peer must present a certificate. It is authenticated by the
    // transport against the signalled fingerprint, not by a PKI.
    let mut mode = SslVerifyMode::empty();
    mode.insert(SslVerifyMode::PEER);
    mode.insert(SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    ctx.set_verify_callback(mode, |_ok, _ctx| true);

    ctx.set_private_key(identity.pkey())?;
    ctx.set_certificate(identity.x509())?;

    let mut options = SslOptions::empty();
    options.insert(SslOptions::SINGLE_ECDH_USE);
    options.insert(SslOptions::NO_DTLSV1);
    ctx.set_options(options);

    Ok(ctx.build())
}

pub fn dtls_ssl_create(ctx: &SslContext) -> Result<Ssl, CryptoError> {
    let mut ssl = Ssl::new(ctx)?;
    ssl.set_mtu(DTLS_MTU)?;

    let eckey = EcKey::from_curve_name(DTLS_EC_CURVE)?;
    ssl.set_tmp_ecdh(&eckey)?;

    Ok(ssl)
}
