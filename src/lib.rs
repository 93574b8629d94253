//! DTLS over an unreliable datagram channel, with SRTP bypass.
//!
//! A [`DtlsTransport`] wraps a best-effort packet channel (typically an ICE
//! connection, see [`UnderlyingChannel`]) and offers
//!
//! * packet send/receive encrypted with DTLS once the handshake is done,
//! * a bypass path for SRTP/SRTCP packets that are already protected, keyed
//!   from the DTLS handshake ([`DtlsTransport::srtp_keying_material`]).
//!
//! DTLS, SRTP and STUN share one 5-tuple. Incoming datagrams are told apart by
//! their first byte as per [RFC 7983][rfc7983]. STUN is expected to be handled
//! before datagrams reach the transport.
//!
//! # Peer authentication
//!
//! There is no PKI. Each end presents a self signed certificate
//! ([`DtlsIdentity`]) and signals its [`Fingerprint`] out of band, usually in
//! SDP. The transport only becomes [`DtlsState::Established`] when the peer's
//! certificate matches the signalled fingerprint.
//!
//! # Roles
//!
//! Which end sends the ClientHello follows from the SDP `a=setup` attributes
//! of offer and answer. See [`negotiate_role`].
//!
//! # Usage
//!
//! ```no_run
//! use dtls_transport::{DtlsConfig, DtlsIdentity, DtlsRole, SendFlags, SrtpProfile};
//! # use dtls_transport::{Fingerprint, UnderlyingChannel};
//! # fn ice_channel() -> Box<dyn UnderlyingChannel> { unimplemented!() }
//! # fn remote_fingerprint() -> Fingerprint { unimplemented!() }
//!
//! let identity = DtlsIdentity::generate().unwrap();
//! let local_fingerprint = identity.fingerprint("sha-256").unwrap();
//! // Send local_fingerprint to the peer in the SDP.
//!
//! let mut transport = DtlsConfig::new()
//!     .set_role(DtlsRole::Client)
//!     .set_srtp_profiles(&[SrtpProfile::Aes128CmSha1_80])
//!     .set_local_identity(identity)
//!     .set_remote_fingerprint(remote_fingerprint())
//!     .build(ice_channel())
//!     .unwrap();
//!
//! transport.on_packet_received(|packet, flags| {
//!     println!("Received {} bytes, SRTP: {}", packet.len(), flags.bypass);
//! });
//!
//! // Relay the ICE channel's signals:
//! // transport.handle_datagram(..), transport.handle_writable_changed(..)
//! // and drive timers with transport.poll_timeout(..)/handle_timeout(..)
//!
//! if transport.is_writable() {
//!     let keys = transport.srtp_keying_material().unwrap();
//!     // Protect media with keys, then send it as is.
//!     # let srtp_packet = [0x80_u8; 100];
//!     transport.send(&srtp_packet, SendFlags::bypass()).unwrap();
//! }
//! ```
//!
//! # Threading
//!
//! A transport lives on the thread that created it. Every entry point
//! asserts this. Nothing blocks, nothing sleeps, there are no internal
//! threads.
//!
//! # Logging
//!
//! The crate logs with [`tracing`][tracing]. State transitions are at
//! `debug`, dropped datagrams at `warn`.
//!
//! [rfc7983]: https://www.rfc-editor.org/rfc/rfc7983
//! [tracing]: https://docs.rs/tracing

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod crypto;
pub use crypto::{DtlsIdentity, Fingerprint, KeyingMaterial, PeerCertificate, SrtpProfile};

mod channel;
pub use channel::{UnderlyingChannel, Worker};

mod config;
pub use config::DtlsConfig;

mod demux;
pub use demux::{is_well_formed_dtls, PacketFamily};
pub use demux::{DTLS_RECORD_HEADER_LEN, MIN_RTP_PACKET_LEN};

mod error;
pub use error::{CloseReason, ConfigError, EngineError, Error, NegotiationError};
pub use error::TransportError;

mod fifo;
pub use fifo::{BoundedFifo, DEFAULT_FIFO_CAPACITY};

mod handshake;
pub use handshake::{DtlsState, MAX_DTLS_PLAINTEXT_LEN};

mod role;
pub use role::{negotiate_role, ContentAction, DtlsRole, Setup};

mod stream;
pub use stream::RecordStream;

mod transport;
pub use transport::{DtlsTransport, PacketFlags, SendFlags, TransportStats};
