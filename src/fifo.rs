use std::collections::VecDeque;

use crate::error::TransportError;

/// Default capacity of the FIFO between underlying channel and record engine.
pub const DEFAULT_FIFO_CAPACITY: usize = 8192;

/// Byte queue holding at most `capacity` bytes of DTLS records.
///
/// Producer and consumer both run on the transport's worker, no
/// synchronization is needed.
pub struct BoundedFifo {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl BoundedFifo {
    /// Creates an empty FIFO that holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        BoundedFifo {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends the entire input or nothing.
    ///
    /// A partial write would split a DTLS record across arrival boundaries.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let available = self.available();
        if data.len() > available {
            return Err(TransportError::Overflow {
                len: data.len(),
                available,
            });
        }
        self.buf.extend(data);
        Ok(())
    }

    /// Reads as much as fits in `out`. Returns 0 when empty.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());

        let (a, b) = self.buf.as_slices();
        let from_a = n.min(a.len());
        out[..from_a].copy_from_slice(&a[..from_a]);
        out[from_a..n].copy_from_slice(&b[..n - from_a]);

        self.buf.drain(..n);
        n
    }

    /// Number of bytes queued.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Tells if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Max number of bytes the FIFO holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn available(&self) -> usize {
        self.capacity - self.buf.len()
    }
}

impl Default for BoundedFifo {
    fn default() -> Self {
        BoundedFifo::new(DEFAULT_FIFO_CAPACITY)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut f = BoundedFifo::new(16);
        f.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(f.len(), 3);

        let mut out = [0; 8];
        assert_eq!(f.read(&mut out), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert!(f.is_empty());
        assert_eq!(f.read(&mut out), 0);
    }

    #[test]
    fn overflow_is_all_or_nothing() {
        let mut f = BoundedFifo::new(4);
        f.write_all(&[1, 2, 3]).unwrap();

        let err = f.write_all(&[4, 5]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Overflow {
                len: 2,
                available: 1
            }
        ));
        assert_eq!(f.len(), 3);

        f.write_all(&[4]).unwrap();
        assert_eq!(f.len(), f.capacity());
    }

    #[test]
    fn partial_reads_wrap_around() {
        let mut f = BoundedFifo::new(6);
        let mut out = [0; 4];

        f.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(f.read(&mut out[..3]), 3);
        f.write_all(&[5, 6, 7, 8]).unwrap();

        assert_eq!(f.read(&mut out), 4);
        assert_eq!(out, [4, 5, 6, 7]);
        assert_eq!(f.read(&mut out), 1);
        assert_eq!(out[0], 8);
    }
}
