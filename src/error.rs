use std::io;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::handshake::DtlsState;

/// Errors for the whole transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration rejected by a setter. The state is left untouched.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The `setup` attributes of offer and answer don't agree.
    #[error("{0}")]
    Negotiation(#[from] NegotiationError),

    /// The record engine failed. This is fatal to the transport.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Sending or receiving failed.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Identity, digest or OpenSSL errors.
    #[error("{0}")]
    Crypto(#[from] CryptoError),
}

/// Errors from configuring a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The session is established with different parameters.
    #[error("DTLS session already established")]
    AlreadyEstablished,

    /// The handshake has started, the value can no longer be changed.
    #[error("too late to change DTLS parameters")]
    TooLate,

    /// A remote fingerprint was given before a local identity.
    #[error("no local DTLS identity")]
    MissingIdentity,

    /// The remote fingerprint has an algorithm but no digest, or vice versa.
    #[error("empty DTLS fingerprint")]
    EmptyFingerprint,

    /// The remote fingerprint can't be used (unknown algorithm or wrong digest length).
    #[error("invalid DTLS fingerprint: {0}")]
    InvalidFingerprint(String),

    /// The setter is not accepted in the current state.
    #[error("not allowed in DTLS state {0:?}")]
    InvalidState(DtlsState),
}

/// Errors negotiating the DTLS role from SDP `setup` attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The offerer must use `actpass`, and the answerer must see it.
    #[error("offerer setup attribute is not actpass")]
    OffererNotActpass,

    /// The answerer must pick `active` or `passive`.
    #[error("answerer setup attribute is invalid")]
    AnswererRoleInvalid,

    /// `holdconn` is not supported.
    #[error("setup attribute holdconn is not supported")]
    NotSupported,
}

/// Errors arising in the record engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Setting up or starting the handshake failed.
    #[error("DTLS engine failed to start: {0}")]
    Start(String),

    /// The handshake failed.
    #[error("DTLS handshake failed: {0}")]
    Handshake(String),

    /// The engine closed, with an error if not cleanly.
    #[error("DTLS engine closed: {}", .0.as_deref().unwrap_or("close notify"))]
    Closed(Option<String>),

    /// Error arising in the crypto
    #[error("{0}")]
    Crypto(#[from] CryptoError),
}

/// Why a transport reached [`DtlsState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloseReason {
    /// Closed by the owner via `close()`.
    #[error("closed locally")]
    Local,

    /// The remote peer didn't offer a fingerprint, i.e. doesn't do DTLS.
    #[error("peer declined DTLS")]
    PeerDeclined,

    /// The underlying channel went away.
    #[error("underlying channel closed")]
    PeerGone,

    /// The remote certificate doesn't match the pinned fingerprint.
    #[error("remote fingerprint mismatch")]
    FingerprintMismatch,

    /// The engine could not be set up or started.
    #[error("DTLS engine start failed: {0}")]
    EngineStart(String),

    /// The handshake failed.
    #[error("DTLS handshake failed: {0}")]
    EngineHandshake(String),

    /// The engine closed after the session was established.
    #[error("DTLS engine closed: {}", .0.as_deref().unwrap_or("close notify"))]
    EngineClosed(Option<String>),
}

/// Errors sending on a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is not established, or the packet can't use the bypass path.
    #[error("DTLS transport not ready")]
    NotReady,

    /// The engine accepted only part of the payload.
    #[error("DTLS transport would block")]
    WouldBlock,

    /// The transport is closed.
    #[error("DTLS transport closed: {0}")]
    Closed(CloseReason),

    /// Bounded FIFO can't take the whole input.
    #[error("FIFO overflow, {len} bytes with {available} available")]
    Overflow {
        /// Bytes attempted.
        len: usize,
        /// Free space at the time.
        available: usize,
    },

    /// The underlying channel refused the datagram as closed.
    #[error("underlying channel closed")]
    UnderlyingClosed,

    /// Other IO errors.
    #[error("{0}")]
    Io(#[from] io::Error),
}
