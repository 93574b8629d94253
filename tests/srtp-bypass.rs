use dtls_transport::{PacketFlags, SendFlags, SrtpProfile, TransportError};

mod common;
use common::{connect, init_log, peer_pair, progress_until, start};

fn rtp(len: usize) -> Vec<u8> {
    let mut p = vec![0x80, 111, 0, 1, 0, 0, 0, 0, 0x12, 0x34, 0x56, 0x78];
    p.resize(len, 0xaa);
    p
}

const STUN_BINDING: [u8; 20] = [
    0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
];

#[test]
fn bypass_refused_until_established() {
    init_log();

    let (mut l, mut r) = peer_pair();
    let packet = rtp(200);

    assert!(matches!(
        r.send(&packet, SendFlags::bypass()),
        Err(TransportError::NotReady)
    ));

    start(&mut l, &mut r);

    assert!(matches!(
        r.send(&packet, SendFlags::bypass()),
        Err(TransportError::NotReady)
    ));
    assert!(matches!(
        r.send(b"early", SendFlags::default()),
        Err(TransportError::NotReady)
    ));

    // Nothing but handshake on the wire.
    assert!(r.channel().sent.iter().all(|d| d[0] == 22));

    progress_until(&mut l, &mut r, |l, r| {
        l.is_established() && r.is_established()
    });

    assert_eq!(r.send(&packet, SendFlags::bypass()).unwrap(), 200);
    assert_eq!(r.channel().sent.last(), Some(&packet));
}

#[test]
fn inbound_during_handshake() {
    init_log();

    let (mut l, mut r) = peer_pair();
    start(&mut l, &mut r);

    // The ClientHello, twice.
    let hello = r.take_outbox();
    assert!(!hello.is_empty());
    for d in hello.iter().chain(hello.iter()) {
        l.receive(d);
    }

    // Media and STUN racing the handshake.
    l.receive(&rtp(100));
    l.receive(&STUN_BINDING);
    r.receive(&rtp(100));

    // Claims more body than there is.
    let mut junk = vec![22, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];
    junk.extend_from_slice(&[0; 20]);
    l.receive(&junk);

    progress_until(&mut l, &mut r, |l, r| {
        l.is_established() && r.is_established()
    });

    let stats = l.stats();
    assert_eq!(stats.srtp_dropped, 1);
    assert_eq!(stats.other_dropped, 1);
    assert_eq!(stats.malformed_dropped, 1);
    assert!(stats.dtls_received >= 2);
    assert_eq!(r.stats().srtp_dropped, 1);

    assert!(l.events.borrow().packets.is_empty());
    assert!(r.events.borrow().packets.is_empty());

    // Once established, media flows.
    l.receive(&rtp(100));
    assert_eq!(
        l.events.borrow().packets,
        vec![(rtp(100), PacketFlags { bypass: true })]
    );
}

#[test]
fn bypass_refuses_non_media() {
    init_log();

    let (mut l, mut r) = peer_pair();
    connect(&mut l, &mut r);

    assert_eq!(
        l.negotiated_srtp_profile(),
        Some(SrtpProfile::Aes128CmSha1_80)
    );

    let sent = l.channel().sent.len();
    assert!(l.send(&STUN_BINDING, SendFlags::bypass()).is_err());
    assert!(l.send(&[0x80, 0, 0], SendFlags::bypass()).is_err());
    assert_eq!(l.channel().sent.len(), sent);
}

#[test]
fn srtcp_uses_bypass_too() {
    init_log();

    let (mut l, mut r) = peer_pair();
    connect(&mut l, &mut r);

    // Receiver report, PT 201.
    let mut rtcp = vec![0x81, 201, 0, 7];
    rtcp.resize(32, 0);

    assert_eq!(l.send(&rtcp, SendFlags::bypass()).unwrap(), 32);
    let d = l.take_outbox();
    assert_eq!(d, vec![rtcp.clone()]);

    r.receive(&d[0]);
    assert_eq!(
        r.events.borrow().packets,
        vec![(rtcp, PacketFlags { bypass: true })]
    );
}
