use std::collections::VecDeque;
use std::io;
use std::time::Instant;

use crate::error::EngineError;
use crate::role::DtlsRole;
use crate::stream::RecordStream;

use super::{DtlsIdentity, Fingerprint, PeerCertificate, SrtpProfile};

/// Events arising from a [`SecureRecordEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// When the handshake has finished.
    Open,

    /// Application data can be read with [`SecureRecordEngine::read`].
    Readable,

    /// The engine closed, with an error if not cleanly.
    Closed(Option<String>),
}

/// Framing mode of the record layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// TLS over a reliable stream.
    Stream,
    /// DTLS over datagrams.
    Datagram,
}

/// Record protocol and handshake, bound to a [`RecordStream`].
///
/// The engine reads DTLS records from the stream and writes records to it.
/// Progress is reported as [`EngineEvent`]s pushed to the caller's queue.
pub trait SecureRecordEngine {
    /// Identity presented to the peer. Must be set before the handshake starts.
    fn set_local_identity(&mut self, identity: DtlsIdentity);

    /// Whether this end sends the ClientHello.
    fn set_role(&mut self, role: DtlsRole);

    /// Framing mode. Only [`SslMode::Datagram`] is used by the transport.
    fn set_mode(&mut self, mode: SslMode) -> Result<(), EngineError>;

    /// Expected digest of the peer certificate.
    fn set_peer_fingerprint(&mut self, fingerprint: &Fingerprint) -> Result<(), EngineError>;

    /// SRTP profiles to offer in the `use_srtp` extension, most preferred first.
    fn set_srtp_cipher_list(&mut self, profiles: &[SrtpProfile]) -> Result<(), EngineError>;

    /// Starts the handshake. A client emits the ClientHello. Idempotent.
    fn start_handshake(&mut self, out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError>;

    /// Consumes readable bytes on the stream and advances the state machine.
    fn drive(&mut self, out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError>;

    /// Writes application data. Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Reads application data. `Ok(0)` is end of stream, `WouldBlock` when nothing is ready.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// The stream the engine is bound to.
    fn stream_mut(&mut self) -> &mut RecordStream;

    /// Certificate presented by the peer, once the handshake is complete.
    fn peer_certificate(&self) -> Option<PeerCertificate>;

    /// The SRTP profile both ends agreed on, if any.
    fn negotiated_srtp_profile(&self) -> Option<SrtpProfile>;

    /// RFC 5705 keying material exporter.
    fn export_keying_material(
        &self,
        label: &str,
        context: Option<&[u8]>,
        len: usize,
    ) -> Result<Vec<u8>, EngineError>;

    /// When the engine next needs [`SecureRecordEngine::handle_timeout`].
    fn poll_timeout(&self, now: Instant) -> Option<Instant>;

    /// Lets the engine retransmit handshake flights.
    fn handle_timeout(
        &mut self,
        now: Instant,
        out: &mut VecDeque<EngineEvent>,
    ) -> Result<(), EngineError>;

    /// Closes the session, notifying the peer if the handshake completed.
    fn close(&mut self);
}

/// Creates record engines for transports.
pub trait EngineFactory {
    /// Creates an engine bound to `stream`.
    fn create(&self, stream: RecordStream) -> Result<Box<dyn SecureRecordEngine>, EngineError>;
}

#[cfg(test)]
pub(crate) mod scripted {
    //! A record engine that pretends to do DTLS, for exercising the transport.
    //!
    //! The handshake completes on the first handshake record (content type 22)
    //! received. Application data records (content type 23) carry plain text
    //! after the record header.

    use std::cell::RefCell;
    use std::io::{Read, Write};
    use std::rc::Rc;

    use super::*;

    const CONTENT_HANDSHAKE: u8 = 22;
    const CONTENT_APPLICATION_DATA: u8 = 23;

    pub fn record(content_type: u8, body: &[u8]) -> Vec<u8> {
        let mut v = vec![content_type, 0xfe, 0xfd, 0, 1, 0, 0, 0, 0, 0, 1];
        v.extend_from_slice(&(body.len() as u16).to_be_bytes());
        v.extend_from_slice(body);
        v
    }

    #[derive(Debug, Default)]
    pub struct EngineLog {
        pub created: usize,
        pub started: usize,
        pub closed: usize,
        pub role: Option<DtlsRole>,
        pub profiles: Vec<SrtpProfile>,
        pub fed: Vec<Vec<u8>>,
    }

    #[derive(Clone, Default)]
    pub struct ScriptedFactory {
        pub log: Rc<RefCell<EngineLog>>,
        pub peer: Option<DtlsIdentity>,
        pub profile: Option<SrtpProfile>,
        pub fail_start: bool,
        pub open_on_handshake: bool,
    }

    impl EngineFactory for ScriptedFactory {
        fn create(
            &self,
            stream: RecordStream,
        ) -> Result<Box<dyn SecureRecordEngine>, EngineError> {
            self.log.borrow_mut().created += 1;
            Ok(Box::new(ScriptedEngine {
                factory: self.clone(),
                stream,
                started: false,
                open: false,
                pending: VecDeque::new(),
            }))
        }
    }

    pub struct ScriptedEngine {
        factory: ScriptedFactory,
        stream: RecordStream,
        started: bool,
        open: bool,
        pending: VecDeque<Vec<u8>>,
    }

    impl SecureRecordEngine for ScriptedEngine {
        fn set_local_identity(&mut self, _identity: DtlsIdentity) {}

        fn set_role(&mut self, role: DtlsRole) {
            self.factory.log.borrow_mut().role = Some(role);
        }

        fn set_mode(&mut self, _mode: SslMode) -> Result<(), EngineError> {
            Ok(())
        }

        fn set_peer_fingerprint(&mut self, _fp: &Fingerprint) -> Result<(), EngineError> {
            Ok(())
        }

        fn set_srtp_cipher_list(&mut self, profiles: &[SrtpProfile]) -> Result<(), EngineError> {
            self.factory.log.borrow_mut().profiles = profiles.to_vec();
            Ok(())
        }

        fn start_handshake(&mut self, _out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError> {
            if self.factory.fail_start {
                return Err(EngineError::Start("scripted failure".into()));
            }
            if !self.started {
                self.started = true;
                self.factory.log.borrow_mut().started += 1;
            }
            Ok(())
        }

        fn drive(&mut self, out: &mut VecDeque<EngineEvent>) -> Result<(), EngineError> {
            self.stream.take_readable();

            let mut buf = vec![0; 1 << 16];
            let n = match self.stream.read(&mut buf) {
                Ok(0) | Err(_) => return Ok(()),
                Ok(n) => n,
            };
            let data = buf[..n].to_vec();
            self.factory.log.borrow_mut().fed.push(data.clone());

            match data[0] {
                CONTENT_HANDSHAKE if !self.open && self.factory.open_on_handshake => {
                    self.open = true;
                    out.push_back(EngineEvent::Open);
                }
                CONTENT_APPLICATION_DATA if self.open => {
                    self.pending.push_back(data[13..].to_vec());
                    out.push_back(EngineEvent::Readable);
                }
                _ => {}
            }
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.stream
                .write(&record(CONTENT_APPLICATION_DATA, data))?;
            Ok(data.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(data) = self.pending.pop_front() else {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "WouldBlock"));
            };
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }

        fn stream_mut(&mut self) -> &mut RecordStream {
            &mut self.stream
        }

        fn peer_certificate(&self) -> Option<PeerCertificate> {
            self.factory.peer.as_ref().map(|p| p.certificate())
        }

        fn negotiated_srtp_profile(&self) -> Option<SrtpProfile> {
            self.factory.profile
        }

        fn export_keying_material(
            &self,
            _label: &str,
            _context: Option<&[u8]>,
            len: usize,
        ) -> Result<Vec<u8>, EngineError> {
            Ok(vec![0x42; len])
        }

        fn poll_timeout(&self, _now: Instant) -> Option<Instant> {
            None
        }

        fn handle_timeout(
            &mut self,
            _now: Instant,
            _out: &mut VecDeque<EngineEvent>,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        fn close(&mut self) {
            self.factory.log.borrow_mut().closed += 1;
            self.stream.close("scripted close");
        }
    }
}
