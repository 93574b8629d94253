use std::collections::VecDeque;
use std::io;
use std::time::Instant;

use crate::crypto::{message_digest, DtlsIdentity, EngineEvent, EngineFactory, Fingerprint};
use crate::crypto::{PeerCertificate, SecureRecordEngine, SrtpProfile, SslMode};
use crate::error::{CloseReason, ConfigError, EngineError, Error};
use crate::role::DtlsRole;
use crate::stream::RecordStream;

/// Largest plaintext a single DTLS record can carry, 2^14 (RFC 6347 4.1).
///
/// Decrypted application data is read into a buffer this large, so one
/// record is always surfaced as one packet.
pub const MAX_DTLS_PLAINTEXT_LEN: usize = 16_384;

/// States of a DTLS transport.
///
/// The order of the variants is the only order in which they can be
/// visited, though any state can go directly to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DtlsState {
    /// No local identity yet.
    New,
    /// Local identity set, waiting for the remote fingerprint.
    Offered,
    /// Remote fingerprint set, waiting for the underlying channel to be writable.
    Accepted,
    /// Handshake in progress.
    Started,
    /// Handshake done and the peer certificate matches the fingerprint.
    Established,
    /// Terminal.
    Closed,
}

impl DtlsState {
    /// Tells if DTLS records are accepted from the peer in this state.
    pub fn accepts_records(&self) -> bool {
        matches!(self, DtlsState::Started | DtlsState::Established)
    }
}

/// Outputs from the state machine towards the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutput {
    /// The transport reached [`DtlsState::Established`].
    Established,
    /// Decrypted application data.
    Data(Vec<u8>),
    /// The transport reached [`DtlsState::Closed`]. Emitted exactly once.
    Closed(CloseReason),
}

/// Drives a record engine from configuration to established or closed.
///
/// Owns the DTLS parameters (identity, remote fingerprint, role, SRTP
/// profiles) and enforces that the peer certificate matches the remote
/// fingerprint before anything is let through.
pub struct HandshakeStateMachine {
    state: DtlsState,
    identity: Option<DtlsIdentity>,
    fingerprint: Option<Fingerprint>,
    role: DtlsRole,
    srtp_profiles: Vec<SrtpProfile>,
    fifo_capacity: usize,
    writable: bool,
    factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn SecureRecordEngine>>,
    events: VecDeque<EngineEvent>,
    output: VecDeque<HandshakeOutput>,
    close_reason: Option<CloseReason>,
}

impl HandshakeStateMachine {
    pub fn new(factory: Box<dyn EngineFactory>, fifo_capacity: usize) -> Self {
        HandshakeStateMachine {
            state: DtlsState::New,
            identity: None,
            fingerprint: None,
            role: DtlsRole::default(),
            srtp_profiles: vec![],
            fifo_capacity,
            writable: false,
            factory,
            engine: None,
            events: VecDeque::new(),
            output: VecDeque::new(),
            close_reason: None,
        }
    }

    pub fn state(&self) -> DtlsState {
        self.state
    }

    pub fn role(&self) -> DtlsRole {
        self.role
    }

    pub fn local_identity(&self) -> Option<DtlsIdentity> {
        self.identity.as_ref().map(DtlsIdentity::clone_reference)
    }

    pub fn peer_fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn srtp_profiles(&self) -> &[SrtpProfile] {
        &self.srtp_profiles
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// The record engine, once the remote fingerprint is accepted.
    pub fn engine(&self) -> Option<&dyn SecureRecordEngine> {
        self.engine.as_deref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut dyn SecureRecordEngine> {
        match &mut self.engine {
            Some(e) => Some(e.as_mut()),
            None => None,
        }
    }

    /// The record stream the engine is bound to.
    pub fn stream_mut(&mut self) -> Option<&mut RecordStream> {
        self.engine.as_mut().map(|e| e.stream_mut())
    }

    pub fn poll_output(&mut self) -> Option<HandshakeOutput> {
        self.output.pop_front()
    }

    /// Certificate of the peer. Only once established.
    pub fn peer_certificate(&self) -> Option<PeerCertificate> {
        if self.state != DtlsState::Established {
            return None;
        }
        self.engine.as_ref()?.peer_certificate()
    }

    /// SRTP profile agreed with the peer. Only once established.
    pub fn negotiated_srtp_profile(&self) -> Option<SrtpProfile> {
        if self.state != DtlsState::Established {
            return None;
        }
        self.engine.as_ref()?.negotiated_srtp_profile()
    }

    pub fn set_local_identity(&mut self, identity: DtlsIdentity) -> Result<(), ConfigError> {
        match self.state {
            DtlsState::New => {
                debug!("Set local identity {:?}", identity);
                self.identity = Some(identity);
                self.set_state(DtlsState::Offered);
                Ok(())
            }
            DtlsState::Established => {
                let same = self
                    .identity
                    .as_ref()
                    .map(|i| i.ptr_eq(&identity))
                    .unwrap_or(false);
                if same {
                    Ok(())
                } else {
                    Err(ConfigError::AlreadyEstablished)
                }
            }
            s => Err(ConfigError::InvalidState(s)),
        }
    }

    pub fn set_role(&mut self, role: DtlsRole) -> Result<(), ConfigError> {
        match self.state {
            DtlsState::New | DtlsState::Offered => {
                self.role = role;
                Ok(())
            }
            _ if role == self.role && self.state != DtlsState::Closed => Ok(()),
            DtlsState::Accepted | DtlsState::Started => Err(ConfigError::TooLate),
            DtlsState::Established => Err(ConfigError::AlreadyEstablished),
            DtlsState::Closed => Err(ConfigError::InvalidState(DtlsState::Closed)),
        }
    }

    pub fn set_srtp_profiles(&mut self, profiles: &[SrtpProfile]) -> Result<(), ConfigError> {
        match self.state {
            DtlsState::New | DtlsState::Offered => {
                self.srtp_profiles = profiles.to_vec();
                Ok(())
            }
            DtlsState::Accepted => {
                if let Some(engine) = self.engine.as_mut() {
                    engine
                        .set_srtp_cipher_list(profiles)
                        .map_err(|_| ConfigError::TooLate)?;
                }
                self.srtp_profiles = profiles.to_vec();
                Ok(())
            }
            DtlsState::Started | DtlsState::Established => Err(ConfigError::TooLate),
            DtlsState::Closed => Err(ConfigError::InvalidState(DtlsState::Closed)),
        }
    }

    /// Pins the peer certificate to a fingerprint and creates the record engine.
    ///
    /// An empty fingerprint means the peer declined DTLS, and the transport
    /// closes with [`CloseReason::PeerDeclined`].
    pub fn set_peer_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<(), Error> {
        match self.state {
            DtlsState::Established => {
                return if self.fingerprint.as_ref() == Some(&fingerprint) {
                    Ok(())
                } else {
                    Err(ConfigError::AlreadyEstablished.into())
                };
            }
            DtlsState::Accepted | DtlsState::Started => return Err(ConfigError::TooLate.into()),
            DtlsState::Closed => return Err(ConfigError::InvalidState(DtlsState::Closed).into()),
            DtlsState::New | DtlsState::Offered => {}
        }

        if fingerprint.is_empty() {
            info!("Remote peer declined DTLS");
            self.close_with(CloseReason::PeerDeclined);
            return Ok(());
        }

        if fingerprint.hash_func.is_empty() || fingerprint.bytes.is_empty() {
            return Err(ConfigError::EmptyFingerprint.into());
        }

        let Some(identity) = self.identity.as_ref() else {
            return Err(ConfigError::MissingIdentity.into());
        };

        let md = message_digest(&fingerprint.hash_func)
            .map_err(|e| ConfigError::InvalidFingerprint(e.to_string()))?;
        if md.size() != fingerprint.bytes.len() {
            return Err(ConfigError::InvalidFingerprint(format!(
                "{} digest is {} bytes, got {}",
                fingerprint.hash_func,
                md.size(),
                fingerprint.bytes.len()
            ))
            .into());
        }

        let identity = identity.clone_reference();
        let engine = self.create_engine(identity, &fingerprint);

        let engine = match engine {
            Ok(v) => v,
            Err(e) => {
                let msg = start_failure(e);
                warn!("Failed to set up DTLS engine: {}", msg);
                self.close_with(CloseReason::EngineStart(msg.clone()));
                return Err(EngineError::Start(msg).into());
            }
        };

        self.fingerprint = Some(fingerprint);
        self.engine = Some(engine);
        self.set_state(DtlsState::Accepted);

        if self.writable {
            self.start_handshake();
        }

        Ok(())
    }

    fn create_engine(
        &self,
        identity: DtlsIdentity,
        fingerprint: &Fingerprint,
    ) -> Result<Box<dyn SecureRecordEngine>, EngineError> {
        let stream = RecordStream::new(self.fifo_capacity);
        let mut engine = self.factory.create(stream)?;

        engine.set_mode(SslMode::Datagram)?;
        engine.set_local_identity(identity);
        engine.set_role(self.role);
        engine.set_peer_fingerprint(fingerprint)?;
        if !self.srtp_profiles.is_empty() {
            engine.set_srtp_cipher_list(&self.srtp_profiles)?;
        }

        debug!("Created DTLS engine as {}", self.role);

        Ok(engine)
    }

    /// Writability of the underlying channel changed.
    pub fn handle_writable_changed(&mut self, writable: bool) {
        self.writable = writable;

        if writable && self.state == DtlsState::Accepted {
            self.start_handshake();
        }
    }

    fn start_handshake(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        match engine.start_handshake(&mut self.events) {
            Ok(()) => {
                self.set_state(DtlsState::Started);
                self.process_events();
            }
            Err(e) => {
                let msg = start_failure(e);
                warn!("Failed to start DTLS handshake: {}", msg);
                self.close_with(CloseReason::EngineStart(msg));
            }
        }
    }

    /// Feeds a DTLS datagram to the engine.
    ///
    /// Returns false if it was dropped.
    pub fn handle_dtls(&mut self, datagram: &[u8]) -> bool {
        if !self.state.accepts_records() {
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };

        let accepted = engine.stream_mut().on_datagram(datagram);

        // Drive even on overflow, there might be something to drain.
        let r = engine.drive(&mut self.events);
        self.after_engine(r);

        accepted
    }

    pub fn poll_timeout(&self, now: Instant) -> Option<Instant> {
        if !self.state.accepts_records() {
            return None;
        }
        self.engine.as_ref()?.poll_timeout(now)
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        if !self.state.accepts_records() {
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        let r = engine.handle_timeout(now, &mut self.events);
        self.after_engine(r);
    }

    pub fn close(&mut self) {
        self.close_with(CloseReason::Local);
    }

    /// The underlying channel went away.
    pub fn handle_channel_closed(&mut self) {
        self.close_with(CloseReason::PeerGone);
    }

    fn after_engine(&mut self, r: Result<(), EngineError>) {
        match r {
            Ok(()) => self.process_events(),
            Err(e) => self.engine_failed(e),
        }
    }

    fn process_events(&mut self) {
        while let Some(ev) = self.events.pop_front() {
            if self.state == DtlsState::Closed {
                self.events.clear();
                return;
            }

            match ev {
                EngineEvent::Open => self.on_engine_open(),
                EngineEvent::Readable => self.on_engine_readable(),
                EngineEvent::Closed(err) => self.on_engine_closed(err),
            }
        }
    }

    fn on_engine_open(&mut self) {
        if self.state != DtlsState::Started {
            warn!("DTLS engine open in state {:?}", self.state);
            return;
        }

        let verified = self.verify_peer();

        if !verified {
            warn!("Remote certificate does not match the fingerprint");
            self.close_with(CloseReason::FingerprintMismatch);
            return;
        }

        let profile = self.engine.as_ref().and_then(|e| e.negotiated_srtp_profile());
        info!(
            "DTLS established as {}, SRTP profile: {}",
            self.role,
            profile.map(|p| p.name()).unwrap_or("none")
        );

        self.set_state(DtlsState::Established);
        self.output.push_back(HandshakeOutput::Established);
    }

    fn verify_peer(&self) -> bool {
        let (Some(engine), Some(fp)) = (self.engine.as_ref(), self.fingerprint.as_ref()) else {
            return false;
        };

        let Some(cert) = engine.peer_certificate() else {
            warn!("No remote certificate");
            return false;
        };

        match cert.digest(&fp.hash_func) {
            Ok(digest) => digest == fp.bytes,
            Err(e) => {
                warn!("Failed to digest remote certificate: {}", e);
                false
            }
        }
    }

    fn on_engine_readable(&mut self) {
        if self.state != DtlsState::Established {
            return;
        }

        let mut buf = vec![0; MAX_DTLS_PLAINTEXT_LEN];

        loop {
            let Some(engine) = self.engine.as_mut() else {
                return;
            };

            match engine.read(&mut buf) {
                Ok(0) => {
                    debug!("DTLS close notify from peer");
                    self.on_engine_closed(None);
                    return;
                }
                Ok(n) => {
                    trace!("Decrypted DTLS data: {}", n);
                    self.output.push_back(HandshakeOutput::Data(buf[..n].to_vec()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    self.on_engine_closed(Some(e.to_string()));
                    return;
                }
            }
        }
    }

    fn on_engine_closed(&mut self, err: Option<String>) {
        let reason = if self.state == DtlsState::Established {
            CloseReason::EngineClosed(err)
        } else {
            CloseReason::EngineHandshake(
                err.unwrap_or_else(|| "closed during handshake".to_string()),
            )
        };
        self.close_with(reason);
    }

    fn engine_failed(&mut self, e: EngineError) {
        warn!("DTLS engine error: {}", e);

        let reason = match e {
            EngineError::Start(s) => CloseReason::EngineStart(s),
            EngineError::Closed(s) if self.state == DtlsState::Established => {
                CloseReason::EngineClosed(s)
            }
            e if self.state == DtlsState::Established => {
                CloseReason::EngineClosed(Some(e.to_string()))
            }
            EngineError::Handshake(s) => CloseReason::EngineHandshake(s),
            e => CloseReason::EngineHandshake(e.to_string()),
        };

        self.close_with(reason);
    }

    fn close_with(&mut self, reason: CloseReason) {
        if self.state == DtlsState::Closed {
            return;
        }

        info!("DTLS transport closed: {}", reason);

        if let Some(engine) = self.engine.as_mut() {
            engine.close();
        }

        self.set_state(DtlsState::Closed);
        self.close_reason = Some(reason.clone());
        self.output.push_back(HandshakeOutput::Closed(reason));
    }

    fn set_state(&mut self, to: DtlsState) {
        let from = self.state;
        if from == to {
            return;
        }
        assert!(from < to, "DTLS state can't go from {:?} to {:?}", from, to);
        debug!("DtlsState {:?} -> {:?}", from, to);
        self.state = to;
    }
}

/// Any engine error before the handshake runs is a start failure.
fn start_failure(e: EngineError) -> String {
    match e {
        EngineError::Start(s) => s,
        e => e.to_string(),
    }
}
