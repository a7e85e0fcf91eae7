//! Bounded receive pipe
//!
//! A UART interrupt handler pushes received bytes into a [`Pipe`] and the
//! driver drains it from thread context. Pushing never blocks: once the pipe
//! is full the newest bytes are dropped and counted, so the interrupt returns
//! in bounded time and the parser later resynchronises on the next line.
//!
//! ```rust
//! use libcellular::transport::pipe::Pipe;
//!
//! let mut rx: Pipe<8> = Pipe::new();
//! assert_eq!(rx.push(b"\r\nOK\r\n"), 6);
//! assert_eq!(rx.push(b"\r\nRING"), 2);
//! assert_eq!(rx.dropped(), 4);
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(rx.read(&mut buf), 8);
//! assert_eq!(&buf[..8], b"\r\nOK\r\n\r\n");
//! ```

use heapless::Deque;

use super::error::Error;

/// Fixed capacity byte ring buffer.
#[derive(Debug)]
pub struct Pipe<const N: usize> {
    buf: Deque<u8, N>,
    dropped: usize,
}

impl<const N: usize> Default for Pipe<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Pipe<N> {
    /// Create an empty pipe.
    pub const fn new() -> Self {
        Self {
            buf: Deque::new(),
            dropped: 0,
        }
    }

    /// Append bytes, returning how many were stored.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let mut stored = 0;
        for &b in bytes {
            if self.buf.push_back(b).is_err() {
                break;
            }
            stored += 1;
        }
        self.dropped += bytes.len() - stored;
        stored
    }

    /// Move up to `out.len()` bytes out of the pipe.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() {
            match self.buf.pop_front() {
                Some(b) => {
                    out[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Bytes currently stored.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Free space left before bytes start being dropped.
    pub fn free(&self) -> usize {
        N - self.buf.len()
    }

    /// Total bytes dropped because the pipe was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Report and reset the drop counter. `Err(Overflow)` when bytes were
    /// lost since the last check.
    pub fn take_overflow(&mut self) -> Result<(), Error> {
        match core::mem::take(&mut self.dropped) {
            0 => Ok(()),
            n => {
                log::warn!("receive pipe dropped {} bytes", n);
                Err(Error::Overflow)
            }
        }
    }

    /// Discard everything stored.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
