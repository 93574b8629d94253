#![allow(unused)]
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::Once;
use std::time::{Duration, Instant};

use dtls_transport::{CloseReason, DtlsConfig, DtlsIdentity, DtlsRole, DtlsState};
use dtls_transport::{DtlsTransport, Fingerprint, PacketFlags, SrtpProfile, UnderlyingChannel};
use tracing::info_span;
use tracing::Span;

/// In memory datagram channel. Whatever the transport sends ends up in `outbox`
/// until the test delivers it to the other side.
#[derive(Debug, Default)]
pub struct TestChannel {
    pub writable: bool,
    pub outbox: VecDeque<Vec<u8>>,
    /// Every datagram ever sent, in order.
    pub sent: Vec<Vec<u8>>,
}

impl UnderlyingChannel for TestChannel {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<usize> {
        self.outbox.push_back(datagram.to_vec());
        self.sent.push(datagram.to_vec());
        Ok(datagram.len())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

/// What the transport reported through its callbacks.
#[derive(Debug, Default)]
pub struct Events {
    pub packets: Vec<(Vec<u8>, PacketFlags)>,
    pub writable: Vec<bool>,
    pub closed: Vec<CloseReason>,
}

pub struct TestPeer {
    pub span: Span,
    pub transport: DtlsTransport<TestChannel>,
    pub identity: DtlsIdentity,
    pub events: Rc<RefCell<Events>>,
    pub start: Instant,
}

impl TestPeer {
    pub fn new(span: Span, role: DtlsRole) -> Self {
        Self::with_profiles(span, role, &[SrtpProfile::Aes128CmSha1_80])
    }

    pub fn with_profiles(span: Span, role: DtlsRole, profiles: &[SrtpProfile]) -> Self {
        let identity = DtlsIdentity::generate().unwrap();

        let config = DtlsConfig::new()
            .set_role(role)
            .set_srtp_profiles(profiles)
            .set_local_identity(identity.clone_reference());

        let transport = span.in_scope(|| config.build(TestChannel::default()).unwrap());

        Self::from_transport(span, transport, identity)
    }

    pub fn from_transport(
        span: Span,
        mut transport: DtlsTransport<TestChannel>,
        identity: DtlsIdentity,
    ) -> Self {
        let events = Rc::new(RefCell::new(Events::default()));

        let e = events.clone();
        transport.on_packet_received(move |d, f| e.borrow_mut().packets.push((d.to_vec(), f)));
        let e = events.clone();
        transport.on_writability_changed(move |w| e.borrow_mut().writable.push(w));
        let e = events.clone();
        transport.on_closed(move |r| e.borrow_mut().closed.push(r.clone()));

        TestPeer {
            span,
            transport,
            identity,
            events,
            start: Instant::now(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.identity.fingerprint("sha-256").unwrap()
    }

    pub fn set_writable(&mut self, writable: bool) {
        self.channel_mut().writable = writable;
        let span = self.span.clone();
        span.in_scope(|| self.transport.handle_writable_changed(writable));
    }

    pub fn is_established(&self) -> bool {
        self.state() == DtlsState::Established
    }

    pub fn is_closed(&self) -> bool {
        self.state() == DtlsState::Closed
    }

    pub fn take_outbox(&mut self) -> Vec<Vec<u8>> {
        self.channel_mut().outbox.drain(..).collect()
    }

    pub fn receive(&mut self, datagram: &[u8]) {
        let span = self.span.clone();
        span.in_scope(|| self.transport.handle_datagram(datagram));
    }
}

impl Deref for TestPeer {
    type Target = DtlsTransport<TestChannel>;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl DerefMut for TestPeer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transport
    }
}

/// Two peers, `l` as DTLS server and `r` as DTLS client.
pub fn peer_pair() -> (TestPeer, TestPeer) {
    let l = TestPeer::new(info_span!("L"), DtlsRole::Server);
    let r = TestPeer::new(info_span!("R"), DtlsRole::Client);
    (l, r)
}

/// Exchanges fingerprints and makes both channels writable, server first.
///
/// The client sends its ClientHello right away.
pub fn start(l: &mut TestPeer, r: &mut TestPeer) {
    let l_fp = l.fingerprint();
    let r_fp = r.fingerprint();

    l.span
        .clone()
        .in_scope(|| l.set_peer_fingerprint(r_fp))
        .unwrap();
    r.span
        .clone()
        .in_scope(|| r.set_peer_fingerprint(l_fp))
        .unwrap();

    l.set_writable(true);
    r.set_writable(true);
}

/// Delivers everything in flight between the peers. Returns the number of
/// datagrams moved.
pub fn progress(l: &mut TestPeer, r: &mut TestPeer) -> usize {
    let to_r = l.take_outbox();
    let to_l = r.take_outbox();
    let moved = to_r.len() + to_l.len();

    for d in to_r {
        r.receive(&d);
    }
    for d in to_l {
        l.receive(&d);
    }

    moved
}

/// Pumps datagrams until `done`, or panics.
pub fn progress_until(
    l: &mut TestPeer,
    r: &mut TestPeer,
    done: impl Fn(&TestPeer, &TestPeer) -> bool,
) {
    for _ in 0..50 {
        if done(l, r) {
            return;
        }
        if progress(l, r) == 0 {
            // Nothing in flight, let OpenSSL retransmit.
            let now = Instant::now() + Duration::from_secs(2);
            l.transport.handle_timeout(now);
            r.transport.handle_timeout(now);
        }
    }
    panic!(
        "Peers didn't get there: L {:?}, R {:?}",
        l.state(),
        r.state()
    );
}

/// Starts and completes the handshake.
pub fn connect(l: &mut TestPeer, r: &mut TestPeer) {
    start(l, r);
    progress_until(l, r, |l, r| l.is_established() && r.is_established());
}

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}
