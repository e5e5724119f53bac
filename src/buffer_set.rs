//! Input and output buffers owned by a connection.
//!
//! [`InBuffer`] keeps three offsets into one allocation:
//!
//! ```text
//! 0 ........ start ........ end ........ capacity
//!   consumed   buffered       spare room
//! ```
//!
//! The framer only ever looks at `start..end` and commits by advancing
//! `start`. Everything that must survive a refill is kept as an offset from
//! `start`, so compaction and reallocation never invalidate it.

use crate::error::{Error, Result};

/// Initial size of both buffers.
pub const DEFAULT_CAPACITY: usize = 8192;

/// Growable input buffer.
#[derive(Debug)]
pub struct InBuffer {
    data: Vec<u8>,
    start: usize,
    end: usize,
    limit: usize,
}

impl InBuffer {
    /// Create a buffer that refuses to hold more than `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            data: vec![0; DEFAULT_CAPACITY.min(limit.max(1))],
            start: 0,
            end: 0,
            limit,
        }
    }

    /// Buffered bytes not yet committed.
    #[inline]
    pub fn available(&self) -> &[u8] {
        self.data.get(self.start..self.end).unwrap_or_default()
    }

    /// Number of buffered bytes not yet committed.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether nothing is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Commit `n` bytes.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Drop everything that is buffered.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Move buffered bytes to the front of the allocation.
    fn compact(&mut self) {
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Grow the allocation to at least `size` bytes.
    fn grow_to(&mut self, size: usize) -> Result<()> {
        if size <= self.data.len() {
            return Ok(());
        }
        if size > self.limit {
            return Err(Error::OutOfMemory(format!(
                "message of {} bytes exceeds the {} byte limit",
                size, self.limit
            )));
        }
        let target = size.max(self.data.len().saturating_mul(2)).min(self.limit);
        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|e| Error::OutOfMemory(e.to_string()))?;
        self.data.resize(target, 0);
        Ok(())
    }

    /// Make sure a message of `total` bytes starting at the current commit
    /// point fits without further reallocation.
    pub fn reserve(&mut self, total: usize) -> Result<()> {
        if self.data.len() - self.start >= total {
            return Ok(());
        }
        self.compact();
        self.grow_to(total)
    }

    /// Spare room of at least `min` bytes for the transport to read into.
    ///
    /// Follow with [`advance_read`](Self::advance_read).
    pub fn read_buf(&mut self, min: usize) -> Result<&mut [u8]> {
        let min = min.max(1);
        if self.data.len() - self.end < min {
            self.compact();
            if self.data.len() - self.end < min {
                let wanted = self.end.saturating_add(min.max(DEFAULT_CAPACITY));
                self.grow_to(wanted.min(self.limit.max(self.end + min)))?;
            }
        }
        Ok(self.data.get_mut(self.end..).unwrap_or_default())
    }

    /// Mark `n` bytes of the slice returned by [`read_buf`](Self::read_buf) as filled.
    pub fn advance_read(&mut self, n: usize) {
        self.end = (self.end + n).min(self.data.len());
    }

    /// Append bytes.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        let buf = self.read_buf(bytes.len())?;
        if let Some(dst) = buf.get_mut(..bytes.len()) {
            dst.copy_from_slice(bytes);
        }
        self.advance_read(bytes.len());
        Ok(())
    }
}

/// Outgoing bytes waiting to be written by the transport.
#[derive(Debug, Default)]
pub struct OutBuffer {
    data: Vec<u8>,
    sent: usize,
}

impl OutBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(DEFAULT_CAPACITY),
            sent: 0,
        }
    }

    /// Bytes not yet handed to the transport.
    #[inline]
    pub fn pending(&self) -> &[u8] {
        self.data.get(self.sent..).unwrap_or_default()
    }

    /// Record that the transport wrote `n` bytes.
    pub fn consume(&mut self, n: usize) {
        self.sent = (self.sent + n).min(self.data.len());
        if self.sent == self.data.len() {
            self.data.clear();
            self.sent = 0;
        }
    }

    /// Buffer to append encoded messages to.
    #[inline]
    pub fn buf_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Drop everything, including bytes not yet written.
    pub fn clear(&mut self) {
        self.data.clear();
        self.sent = 0;
    }
}

/// Buffer set for state machine operations.
#[derive(Debug)]
pub struct BufferSet {
    /// Bytes received from the server
    pub input: InBuffer,
    /// Bytes to send to the server
    pub output: OutBuffer,
}

impl BufferSet {
    /// Create a new buffer set with the given input size limit.
    pub fn new(max_message_len: usize) -> Self {
        Self {
            input: InBuffer::new(max_message_len),
            output: OutBuffer::new(),
        }
    }
}
