use std::fmt;
use std::io;
use std::time::Instant;

use crate::channel::{UnderlyingChannel, Worker};
use crate::config::DtlsConfig;
use crate::crypto::{DtlsIdentity, EngineFactory, Fingerprint, KeyingMaterial};
use crate::crypto::{OsslEngineFactory, PeerCertificate, SrtpProfile, DTLS_SRTP_KEY_LABEL};
use crate::demux::{is_well_formed_dtls, PacketFamily};
use crate::error::{CloseReason, Error, TransportError};
use crate::fifo::DEFAULT_FIFO_CAPACITY;
use crate::handshake::{DtlsState, HandshakeOutput, HandshakeStateMachine};
use crate::role::DtlsRole;

/// Flags for [`DtlsTransport::send`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendFlags {
    /// The payload is an SRTP/SRTCP packet to send as is, without DTLS.
    pub bypass: bool,
}

impl SendFlags {
    /// Flags for sending an already protected SRTP packet.
    pub fn bypass() -> Self {
        SendFlags { bypass: true }
    }
}

/// Flags for a received packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketFlags {
    /// The packet is SRTP/SRTCP that bypassed DTLS.
    pub bypass: bool,
}

/// Counters of a [`DtlsTransport`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportStats {
    /// DTLS datagrams fed to the record engine.
    pub dtls_received: u64,
    /// SRTP datagrams passed up.
    pub srtp_received: u64,
    /// Datagrams that are neither DTLS nor SRTP.
    pub other_dropped: u64,
    /// DTLS datagrams arriving when no handshake is running.
    pub dtls_dropped: u64,
    /// SRTP datagrams arriving before established, or without a negotiated profile.
    pub srtp_dropped: u64,
    /// DTLS looking datagrams whose records don't add up.
    pub malformed_dropped: u64,
    /// DTLS datagrams dropped because the record buffer was full.
    pub fifo_overflows: u64,
    /// Datagrams handed to the underlying channel.
    pub datagrams_sent: u64,
}

type PacketCallback = Box<dyn FnMut(&[u8], PacketFlags)>;
type WritableCallback = Box<dyn FnMut(bool)>;
type ClosedCallback = Box<dyn FnMut(&CloseReason)>;

/// DTLS over an unreliable datagram channel, with SRTP bypass.
///
/// The transport is Sans-IO in the sense that it never does any network
/// calls of its own. The host relays the underlying channel's signals
/// (datagrams, writability, close) to the `handle_*` methods, and the
/// transport writes outgoing datagrams directly to the channel.
///
/// Everything happens on the thread that created the transport.
pub struct DtlsTransport<C: UnderlyingChannel> {
    worker: Worker,
    channel: C,
    machine: HandshakeStateMachine,
    channel_writable: bool,
    channel_readable: bool,
    channel_closed: bool,
    signalled_writable: bool,
    stats: TransportStats,
    on_packet: Option<PacketCallback>,
    on_writable: Option<WritableCallback>,
    on_closed: Option<ClosedCallback>,
}

impl<C: UnderlyingChannel> DtlsTransport<C> {
    /// Creates a transport using the OpenSSL record engine.
    ///
    /// Panics unless called on `worker`, see [`DtlsTransport::with_engine_factory`].
    pub fn new(channel: C, worker: Worker) -> Self {
        Self::with_engine_factory(
            channel,
            worker,
            Box::new(OsslEngineFactory),
            DEFAULT_FIFO_CAPACITY,
        )
    }

    /// Creates a transport with record engines from `factory`.
    ///
    /// The transport is bound to `worker`, and every entry point asserts it
    /// runs there. It must be created on that worker too.
    pub fn with_engine_factory(
        channel: C,
        worker: Worker,
        factory: Box<dyn EngineFactory>,
        fifo_capacity: usize,
    ) -> Self {
        worker.assert_current();

        let channel_writable = channel.is_writable();
        let channel_readable = channel.is_readable();

        let mut machine = HandshakeStateMachine::new(factory, fifo_capacity);
        machine.handle_writable_changed(channel_writable);

        DtlsTransport {
            worker,
            channel,
            machine,
            channel_writable,
            channel_readable,
            channel_closed: false,
            signalled_writable: false,
            stats: TransportStats::default(),
            on_packet: None,
            on_writable: None,
            on_closed: None,
        }
    }

    /// Applies role, SRTP profiles, local identity and remote fingerprint,
    /// in that order. Stops at the first error.
    pub fn configure(&mut self, config: DtlsConfig) -> Result<(), Error> {
        if let Some(role) = config.role {
            self.set_role(role)?;
        }
        if !config.srtp_profiles.is_empty() {
            self.set_srtp_profiles(&config.srtp_profiles)?;
        }
        if let Some(identity) = config.local_identity {
            self.set_local_identity(identity)?;
        }
        if let Some(fingerprint) = config.remote_fingerprint {
            self.set_peer_fingerprint(fingerprint)?;
        }
        Ok(())
    }

    /// Sets the identity presented to the peer.
    pub fn set_local_identity(&mut self, identity: DtlsIdentity) -> Result<(), Error> {
        self.worker.assert_current();
        self.machine.set_local_identity(identity)?;
        Ok(())
    }

    /// Pins the peer's certificate to `fingerprint`.
    ///
    /// An empty fingerprint means the peer declined DTLS. The transport then
    /// closes with [`CloseReason::PeerDeclined`].
    pub fn set_peer_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<(), Error> {
        self.worker.assert_current();
        let r = self.machine.set_peer_fingerprint(fingerprint);
        self.process();
        r
    }

    /// Sets the DTLS role. Frozen once the remote fingerprint is accepted.
    pub fn set_role(&mut self, role: DtlsRole) -> Result<(), Error> {
        self.worker.assert_current();
        self.machine.set_role(role)?;
        Ok(())
    }

    /// Sets the SRTP profiles to offer, most preferred first.
    pub fn set_srtp_profiles(&mut self, profiles: &[SrtpProfile]) -> Result<(), Error> {
        self.worker.assert_current();
        self.machine.set_srtp_profiles(profiles)?;
        Ok(())
    }

    /// Registers the callback for received packets.
    pub fn on_packet_received(&mut self, f: impl FnMut(&[u8], PacketFlags) + 'static) {
        self.worker.assert_current();
        self.on_packet = Some(Box::new(f));
    }

    /// Registers the callback for changes to [`DtlsTransport::is_writable`].
    pub fn on_writability_changed(&mut self, f: impl FnMut(bool) + 'static) {
        self.worker.assert_current();
        self.on_writable = Some(Box::new(f));
    }

    /// Registers the callback for the transport closing. Called once.
    pub fn on_closed(&mut self, f: impl FnMut(&CloseReason) + 'static) {
        self.worker.assert_current();
        self.on_closed = Some(Box::new(f));
    }

    /// Sends a payload.
    ///
    /// Without bypass the payload is sent as DTLS application data. With
    /// bypass, the payload must be an SRTP or SRTCP packet and is sent as is.
    /// That requires an established session with a negotiated SRTP profile.
    pub fn send(&mut self, payload: &[u8], flags: SendFlags) -> Result<usize, TransportError> {
        self.worker.assert_current();

        if let Some(reason) = self.machine.close_reason() {
            return Err(TransportError::Closed(reason.clone()));
        }

        if self.machine.state() != DtlsState::Established {
            return Err(TransportError::NotReady);
        }

        if flags.bypass {
            if self.machine.srtp_profiles().is_empty()
                || self.machine.negotiated_srtp_profile().is_none()
            {
                return Err(TransportError::NotReady);
            }

            if PacketFamily::classify(payload) != PacketFamily::Srtp {
                warn!("Refusing to bypass DTLS for non-SRTP packet");
                return Err(TransportError::NotReady);
            }

            return self.send_datagram(payload);
        }

        let engine = self
            .machine
            .engine_mut()
            .ok_or(TransportError::NotReady)?;

        let r = engine.write(payload);
        self.flush();

        match r {
            Ok(n) if n < payload.len() => Err(TransportError::WouldBlock),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }

    /// Handles a datagram from the underlying channel.
    pub fn handle_datagram(&mut self, datagram: &[u8]) {
        self.worker.assert_current();
        trace!("Received datagram: {}", datagram.len());

        let state = self.machine.state();

        match PacketFamily::classify(datagram) {
            PacketFamily::Dtls => {
                if !state.accepts_records() {
                    warn!("Drop DTLS datagram in state {:?}", state);
                    self.stats.dtls_dropped += 1;
                    return;
                }
                if !is_well_formed_dtls(datagram) {
                    warn!("Drop malformed DTLS datagram: {}", datagram.len());
                    self.stats.malformed_dropped += 1;
                    return;
                }

                self.stats.dtls_received += 1;
                if !self.machine.handle_dtls(datagram) {
                    self.stats.fifo_overflows += 1;
                }
                self.process();
            }
            PacketFamily::Srtp => {
                if state != DtlsState::Established
                    || self.machine.negotiated_srtp_profile().is_none()
                {
                    warn!("Drop SRTP datagram in state {:?}", state);
                    self.stats.srtp_dropped += 1;
                    return;
                }

                self.stats.srtp_received += 1;
                if let Some(cb) = &mut self.on_packet {
                    cb(datagram, PacketFlags { bypass: true });
                }
            }
            PacketFamily::Other => {
                // STUN is demultiplexed before reaching us.
                warn!("Drop datagram that is neither DTLS nor SRTP");
                self.stats.other_dropped += 1;
            }
        }
    }

    /// The underlying channel's writability changed.
    pub fn handle_writable_changed(&mut self, writable: bool) {
        self.worker.assert_current();
        self.channel_writable = writable;
        self.machine.handle_writable_changed(writable);
        self.process();
        self.update_writability();
    }

    /// The underlying channel's readability changed.
    pub fn handle_readable_changed(&mut self, readable: bool) {
        self.worker.assert_current();
        self.channel_readable = readable;
    }

    /// The underlying channel closed.
    pub fn handle_channel_closed(&mut self) {
        self.worker.assert_current();
        self.channel_closed = true;
        self.machine.handle_channel_closed();
        self.process();
    }

    /// When the record engine next needs [`DtlsTransport::handle_timeout`].
    pub fn poll_timeout(&self, now: Instant) -> Option<Instant> {
        self.worker.assert_current();
        self.machine.poll_timeout(now)
    }

    /// Lets the record engine retransmit handshake flights.
    pub fn handle_timeout(&mut self, now: Instant) {
        self.worker.assert_current();
        self.machine.handle_timeout(now);
        self.process();
    }

    /// Closes the transport. Idempotent.
    pub fn close(&mut self) {
        self.worker.assert_current();
        self.machine.close();
        self.process();
    }

    /// Current state.
    pub fn state(&self) -> DtlsState {
        self.machine.state()
    }

    /// The DTLS role, client unless set.
    pub fn role(&self) -> DtlsRole {
        self.machine.role()
    }

    /// Why the transport closed, once closed.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.machine.close_reason()
    }

    /// Established and the underlying channel is writable.
    pub fn is_writable(&self) -> bool {
        self.signalled_writable
    }

    /// Established and the underlying channel is readable.
    pub fn is_readable(&self) -> bool {
        self.machine.state() == DtlsState::Established && self.channel_readable
    }

    /// Another reference to the local identity, if set.
    pub fn local_identity(&self) -> Option<DtlsIdentity> {
        self.machine.local_identity()
    }

    /// The fingerprint the peer's certificate is pinned to.
    pub fn peer_fingerprint(&self) -> Option<&Fingerprint> {
        self.machine.peer_fingerprint()
    }

    /// The SRTP profile agreed with the peer. Only once established.
    pub fn negotiated_srtp_profile(&self) -> Option<SrtpProfile> {
        self.machine.negotiated_srtp_profile()
    }

    /// The peer's certificate. Only once established.
    pub fn peer_certificate(&self) -> Option<PeerCertificate> {
        self.machine.peer_certificate()
    }

    /// RFC 5705 keying material exporter. Only once established.
    pub fn export_keying_material(
        &self,
        label: &str,
        context: Option<&[u8]>,
        len: usize,
    ) -> Result<Vec<u8>, Error> {
        if self.machine.state() != DtlsState::Established {
            return Err(TransportError::NotReady.into());
        }
        let engine = self.machine.engine().ok_or(TransportError::NotReady)?;
        Ok(engine.export_keying_material(label, context, len)?)
    }

    /// SRTP master keys and salts for the negotiated profile.
    pub fn srtp_keying_material(&self) -> Result<KeyingMaterial, Error> {
        let profile = self
            .negotiated_srtp_profile()
            .ok_or(TransportError::NotReady)?;
        let material =
            self.export_keying_material(DTLS_SRTP_KEY_LABEL, None, profile.keying_material_len())?;
        Ok(KeyingMaterial::new(profile, material))
    }

    /// Counters for datagrams in and out.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the underlying channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    fn send_datagram(&mut self, datagram: &[u8]) -> Result<usize, TransportError> {
        if self.channel_closed {
            return Err(TransportError::UnderlyingClosed);
        }
        trace!("Send datagram: {}", datagram.len());
        let n = self.channel.send_datagram(datagram)?;
        self.stats.datagrams_sent += 1;
        Ok(n)
    }

    /// Sends the datagrams the record engine queued.
    fn flush(&mut self) {
        loop {
            let Some(datagram) = self.machine.stream_mut().and_then(|s| s.pop_outgoing()) else {
                return;
            };

            if self.channel_closed {
                debug!("Drop outgoing DTLS datagram, channel closed");
                continue;
            }

            if let Err(e) = self.send_datagram(&datagram) {
                warn!("Failed to send DTLS datagram: {}", e);
            }
        }
    }

    fn process(&mut self) {
        self.flush();

        while let Some(out) = self.machine.poll_output() {
            match out {
                HandshakeOutput::Established => self.update_writability(),
                HandshakeOutput::Data(data) => {
                    if let Some(cb) = &mut self.on_packet {
                        cb(&data, PacketFlags::default());
                    }
                }
                HandshakeOutput::Closed(reason) => {
                    self.update_writability();
                    if let Some(cb) = &mut self.on_closed {
                        cb(&reason);
                    }
                }
            }
        }
    }

    fn update_writability(&mut self) {
        let writable = self.machine.state() == DtlsState::Established && self.channel_writable;
        if writable == self.signalled_writable {
            return;
        }
        self.signalled_writable = writable;
        debug!("DTLS transport writable: {}", writable);
        if let Some(cb) = &mut self.on_writable {
            cb(writable);
        }
    }
}

impl<C: UnderlyingChannel> fmt::Debug for DtlsTransport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsTransport")
            .field("state", &self.machine.state())
            .field("role", &self.machine.role())
            .field("writable", &self.signalled_writable)
            .field("stats", &self.stats)
            .finish()
    }
}
