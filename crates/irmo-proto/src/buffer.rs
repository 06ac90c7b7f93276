use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Errors from a bounded read against a [`PacketBuffer`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BufferError {
    #[error("read past the end of the packet")]
    Underrun,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("string field exceeds the {0}-byte cap")]
    StringTooLong(usize),
}

/// A byte buffer with a read cursor and auto-growing append operations.
///
/// Outbound packets are built by repeated `write_*` calls (append, grows as
/// needed). Inbound packets are read with `read_*` calls that advance an
/// internal cursor and fail with [`BufferError::Underrun`] rather than
/// panicking on short input — this is what lets the atom codec's `verify`
/// step walk a packet read-only and bail out cleanly on malformed input
/// (spec.md §4.5 step 2). The read path itself never allocates; the one
/// allocation is copying the incoming datagram into the buffer at
/// `from_datagram`, which is the packet's entry point, not a per-read cost.
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    buf: BytesMut,
    cursor: usize,
}

impl PacketBuffer {
    pub fn new() -> Self {
        PacketBuffer {
            buf: BytesMut::new(),
            cursor: 0,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        PacketBuffer {
            buf: BytesMut::with_capacity(cap),
            cursor: 0,
        }
    }

    /// Wrap a received datagram for reading. Copies the datagram into an
    /// owned buffer once; no further allocation happens while reading it.
    pub fn from_datagram(data: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(data.len());
        buf.put_slice(data);
        PacketBuffer { buf, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the read cursor to an arbitrary position; used to rewind after
    /// a verification pass so real parsing starts from the top (spec.md
    /// §4.5 step 2).
    pub fn seek(&mut self, pos: usize) {
        self.cursor = pos.min(self.buf.len());
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn take(&mut self, n: usize) -> Result<&[u8], BufferError> {
        if self.remaining() < n {
            return Err(BufferError::Underrun);
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.buf[start..self.cursor])
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, BufferError> {
        Ok(self.take(n)?.to_vec())
    }

    /// Read a NUL-terminated UTF-8 string, failing if no terminator is
    /// found before the buffer ends or if the string (excluding the NUL)
    /// would exceed `max_len` bytes.
    pub fn read_cstring(&mut self, max_len: usize) -> Result<String, BufferError> {
        let start = self.cursor;
        let remaining = &self.buf[start..];
        let nul_pos = remaining
            .iter()
            .position(|&b| b == 0)
            .ok_or(BufferError::Underrun)?;
        if nul_pos > max_len {
            return Err(BufferError::StringTooLong(max_len));
        }
        let bytes = &remaining[..nul_pos];
        let s = std::str::from_utf8(bytes)
            .map_err(|_| BufferError::InvalidUtf8)?
            .to_owned();
        self.cursor = start + nul_pos + 1;
        Ok(s)
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn write_cstring(&mut self, s: &str) {
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
