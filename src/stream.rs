use std::collections::VecDeque;
use std::io;

use crate::fifo::{BoundedFifo, DEFAULT_FIFO_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closed,
}

/// Byte stream façade over a datagram channel for the record engine.
///
/// Reads drain incoming DTLS records from a [`BoundedFifo`]. Every write
/// becomes exactly one outgoing datagram, queued until the transport hands it
/// to the underlying channel.
pub struct RecordStream {
    state: StreamState,
    fifo: BoundedFifo,
    outgoing: VecDeque<Vec<u8>>,
    readable: bool,
}

impl RecordStream {
    /// Creates an open stream with a FIFO holding at most `fifo_capacity` bytes.
    pub fn new(fifo_capacity: usize) -> Self {
        RecordStream {
            state: StreamState::Open,
            fifo: BoundedFifo::new(fifo_capacity),
            outgoing: VecDeque::new(),
            readable: false,
        }
    }

    /// Queues a received DTLS datagram for the engine.
    ///
    /// The stream is marked readable even when the FIFO overflows, so the
    /// engine gets to drain what is there. Returns false if the datagram
    /// was dropped.
    pub fn on_datagram(&mut self, datagram: &[u8]) -> bool {
        let accepted = match self.fifo.write_all(datagram) {
            Ok(()) => true,
            Err(e) => {
                warn!("Drop incoming DTLS datagram: {}", e);
                false
            }
        };

        self.readable = true;

        accepted
    }

    /// Next datagram for the underlying channel.
    pub fn pop_outgoing(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    /// Tells if datagrams arrived since the last call, and clears the mark.
    pub fn take_readable(&mut self) -> bool {
        std::mem::take(&mut self.readable)
    }

    /// Closes the stream. Subsequent reads signal end of stream, writes fail.
    pub fn close(&mut self, reason: &str) {
        if self.state == StreamState::Closed {
            return;
        }
        debug!("Record stream closed: {}", reason);
        self.state = StreamState::Closed;
    }
}

impl Default for RecordStream {
    fn default() -> Self {
        RecordStream::new(DEFAULT_FIFO_CAPACITY)
    }
}

impl io::Read for RecordStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == StreamState::Closed {
            return Ok(0);
        }

        if self.fifo.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "WouldBlock"));
        }

        Ok(self.fifo.read(buf))
    }
}

impl io::Write for RecordStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state == StreamState::Closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "Record stream closed",
            ));
        }

        // Lossy media transport. Never block, retransmission is up to the engine.
        self.outgoing.push_back(buf.to_vec());

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
