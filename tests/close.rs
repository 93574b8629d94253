use dtls_transport::{CloseReason, DtlsState, SendFlags, TransportError};

mod common;
use common::{connect, init_log, peer_pair, progress, start};

#[test]
fn close_notifies_peer() {
    init_log();

    let (mut l, mut r) = peer_pair();
    connect(&mut l, &mut r);

    l.close();
    l.close();

    assert_eq!(l.state(), DtlsState::Closed);
    assert_eq!(l.events.borrow().closed, vec![CloseReason::Local]);
    assert_eq!(l.events.borrow().writable, vec![true, false]);
    assert!(!l.is_writable());

    // close_notify reaches R.
    progress(&mut l, &mut r);

    assert_eq!(r.state(), DtlsState::Closed);
    assert_eq!(
        r.events.borrow().closed,
        vec![CloseReason::EngineClosed(None)]
    );
    assert_eq!(r.events.borrow().writable, vec![true, false]);

    assert!(matches!(
        r.send(b"gone", SendFlags::default()),
        Err(TransportError::Closed(CloseReason::EngineClosed(None)))
    ));
}

#[test]
fn close_before_handshake() {
    init_log();

    let (mut l, mut r) = peer_pair();
    start(&mut l, &mut r);

    r.close();

    assert_eq!(r.close_reason(), Some(&CloseReason::Local));
    assert!(r.events.borrow().writable.is_empty());
    assert_eq!(r.poll_timeout(std::time::Instant::now()), None);

    // Records arriving after close are dropped.
    let before = r.stats().dtls_dropped;
    progress(&mut l, &mut r);
    progress(&mut l, &mut r);
    assert!(r.stats().dtls_dropped > before);
    assert_eq!(r.state(), DtlsState::Closed);
}

#[test]
fn underlying_channel_closed() {
    init_log();

    let (mut l, mut r) = peer_pair();
    connect(&mut l, &mut r);

    let sent = l.channel().sent.len();
    l.handle_channel_closed();

    assert_eq!(l.close_reason(), Some(&CloseReason::PeerGone));
    assert_eq!(l.events.borrow().closed, vec![CloseReason::PeerGone]);

    // Nothing more goes out, not even close_notify.
    assert_eq!(l.channel().sent.len(), sent);
    assert!(l.send(b"x", SendFlags::default()).is_err());

    // A later local close changes nothing.
    l.close();
    assert_eq!(l.close_reason(), Some(&CloseReason::PeerGone));
    assert_eq!(l.events.borrow().closed.len(), 1);
}
