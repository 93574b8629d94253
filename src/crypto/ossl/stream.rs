use std::panic::UnwindSafe;
use std::{io, mem};

use openssl::ssl::{HandshakeError, MidHandshakeSslStream, Ssl, SslRef, SslStream};

use crate::role::DtlsRole;

/// An OpenSSL session over some byte stream, from before the first flight
/// until the handshake is done.
pub struct TlsStream<S> {
    role: DtlsRole,
    state: State<S>,
}

pub enum State<S> {
    Init(Ssl, S),
    Handshaking(MidHandshakeSslStream<S>),
    Established(SslStream<S>),
    Failed(S),
    Empty,
}

/// No user of the transport can observe a broken invariant in the state when
/// catching a panic, the whole transport goes with it.
impl<S> UnwindSafe for State<S> {}

impl<S> TlsStream<S>
where
    S: io::Read + io::Write + Default + UnwindSafe,
{
    pub fn new(ssl: Ssl, stream: S, role: DtlsRole) -> Self {
        TlsStream {
            role,
            state: State::Init(ssl, stream),
        }
    }

    /// Drives the handshake. Returns `Ok(true)` once established and `Ok(false)`
    /// while waiting for the peer.
    pub fn complete_handshake_until_block(&mut self) -> Result<bool, io::Error> {
        match self.handshaken() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_handshaking(&self) -> bool {
        matches!(self.state, State::Init(_, _) | State::Handshaking(_))
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Established(_))
    }

    pub fn ssl(&self) -> Option<&SslRef> {
        match &self.state {
            State::Init(ssl, _) => Some(&**ssl),
            State::Handshaking(v) => Some(v.ssl()),
            State::Established(v) => Some(v.ssl()),
            State::Failed(_) | State::Empty => None,
        }
    }

    pub fn handshaken(&mut self) -> Result<&mut SslStream<S>, io::Error> {
        let role = self.role;
        self.state.handshaken(role)
    }

    /// Sends close_notify if established.
    pub fn shutdown(&mut self) {
        if let State::Established(v) = &mut self.state {
            if let Err(e) = v.shutdown() {
                // The stream never blocks on write, any error here is final.
                debug!("DTLS shutdown: {}", e);
            }
        }
    }

    pub fn inner_mut(&mut self) -> &mut S {
        match &mut self.state {
            State::Init(_, s) => s,
            State::Handshaking(v) => v.get_mut(),
            State::Established(v) => v.get_mut(),
            State::Failed(s) => s,
            State::Empty => panic!("inner_mut on empty dtls state"),
        }
    }
}

impl<S> State<S>
where
    S: io::Read + io::Write + Default + UnwindSafe,
{
    fn handshaken(&mut self, role: DtlsRole) -> Result<&mut SslStream<S>, io::Error> {
        if let State::Established(v) = self {
            return Ok(v);
        }

        if let State::Failed(_) = self {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "DTLS handshake failed earlier",
            ));
        }

        let taken = mem::replace(self, State::Empty);

        let result = match taken {
            State::Empty | State::Established(_) | State::Failed(_) => unreachable!(),
            State::Init(ssl, stream) => match role {
                DtlsRole::Client => {
                    debug!("Connect");
                    ssl.connect(stream)
                }
                DtlsRole::Server => {
                    debug!("Accept");
                    ssl.accept(stream)
                }
            },
            State::Handshaking(mid) => mid.handshake(),
        };

        match result {
            Ok(v) => {
                debug!("Established version: {:}", v.ssl().version_str());

                let _ = mem::replace(self, State::Established(v));

                // recursively return the &mut SslStream.
                self.handshaken(role)
            }
            Err(e) => Err(match e {
                HandshakeError::WouldBlock(e) => {
                    let _ = mem::replace(self, State::Handshaking(e));
                    io::Error::new(io::ErrorKind::WouldBlock, "WouldBlock")
                }
                HandshakeError::SetupFailure(e) => {
                    debug!("DTLS setup failed: {:?}", e);
                    let _ = mem::replace(self, State::Failed(S::default()));
                    io::Error::new(io::ErrorKind::InvalidInput, e)
                }
                HandshakeError::Failure(mut e) => {
                    let error = e.error().to_string();
                    debug!("DTLS failure: {}", error);
                    // Keep the stream, it may hold a queued alert for the peer.
                    let stream = mem::take(e.get_mut());
                    let _ = mem::replace(self, State::Failed(stream));
                    io::Error::new(io::ErrorKind::InvalidData, error)
                }
            }),
        }
    }
}

impl<S> io::Read for TlsStream<S>
where
    S: io::Read + io::Write + Default + UnwindSafe,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handshaken()?.read(buf)
    }
}

impl<S> io::Write for TlsStream<S>
where
    S: io::Read + io::Write + Default + UnwindSafe,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handshaken()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handshaken()?.flush()
    }
}
