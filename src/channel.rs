use std::io;
use std::thread::{self, ThreadId};

/// The best-effort packet channel a [`DtlsTransport`][crate::DtlsTransport] wraps.
///
/// Typically an ICE connection. The channel's signals (datagram received,
/// writability changes and close) are relayed by the host through
/// `handle_datagram`, `handle_writable_changed` and `handle_channel_closed`
/// on the transport.
pub trait UnderlyingChannel {
    /// Sends one datagram. Best effort, the datagram may be lost.
    ///
    /// Returns the number of bytes sent.
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<usize>;

    /// Whether the channel can currently send.
    fn is_writable(&self) -> bool;

    /// Whether the channel is receiving. Most channels don't track this.
    fn is_readable(&self) -> bool {
        true
    }
}

impl<C: UnderlyingChannel + ?Sized> UnderlyingChannel for Box<C> {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<usize> {
        (**self).send_datagram(datagram)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn is_readable(&self) -> bool {
        (**self).is_readable()
    }
}

/// The execution context owning a transport.
///
/// All entry points of a transport must run on the thread that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Worker(ThreadId);

impl Worker {
    /// The worker for the calling thread.
    pub fn current() -> Self {
        Worker(thread::current().id())
    }

    /// Tells if the calling thread is this worker.
    pub fn is_current(&self) -> bool {
        self.0 == thread::current().id()
    }

    /// Panics unless called on this worker.
    #[track_caller]
    pub fn assert_current(&self) {
        assert!(
            self.is_current(),
            "DTLS transport used off its worker thread"
        );
    }
}

impl Default for Worker {
    fn default() -> Self {
        Worker::current()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn worker_is_per_thread() {
        let w = Worker::current();
        assert!(w.is_current());
        w.assert_current();

        let other = thread::spawn(move || w.is_current()).join().unwrap();
        assert!(!other);
    }
}
