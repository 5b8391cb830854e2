//! Read and write cursors over physical buffers.
//!
//! A *physical* buffer is a byte array that exists on its own: the root
//! buffer handed to the parser, or a buffer produced by a tunnel (bit
//! unpacking, decompression, a custom transform). Every physical buffer is
//! described by a `StreamRef` with a process-unique id; byte ranges in the
//! metadata are always relative to one of them.
//!
//! `Stream` is a cursor over a window `[pos, end)` of a physical buffer.
//! Framing nodes narrow the window without creating a new physical buffer,
//! so offsets stay absolute within it.
//!
//! Bit-addressed buffers hold one bit per byte (`0` or `1`), most significant
//! bit first. Reading `n` bytes from a bit-addressed stream consumes `8 * n`
//! bits and packs them.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GrammarError;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a physical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    fn next() -> Self {
        StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Shared handle to a physical buffer. Two handles are equal when they
/// refer to the same buffer.
#[derive(Clone)]
pub struct StreamRef {
    id: StreamId,
    data: Arc<[u8]>,
    bit_mode: bool,
    label: &'static str,
}

impl StreamRef {
    pub fn new(label: &'static str, data: impl Into<Arc<[u8]>>, bit_mode: bool) -> Self {
        Self {
            id: StreamId::next(),
            data: data.into(),
            bit_mode,
            label,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_bits(&self) -> bool {
        self.bit_mode
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// A new physical stream identity over the same data.
    pub fn alias(&self, label: &'static str) -> StreamRef {
        Self {
            id: StreamId::next(),
            data: self.data.clone(),
            bit_mode: self.bit_mode,
            label,
        }
    }
}

impl PartialEq for StreamRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StreamRef {}

impl fmt::Debug for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRef")
            .field("id", &self.id.0)
            .field("label", &self.label)
            .field("len", &self.data.len())
            .field("bit_mode", &self.bit_mode)
            .finish()
    }
}

/// Read cursor over a window of a physical buffer.
#[derive(Debug, Clone)]
pub struct Stream {
    source: StreamRef,
    pos: usize,
    end: usize,
}

impl Stream {
    /// Open a root byte stream over `data`.
    pub fn root(data: impl Into<Arc<[u8]>>) -> Self {
        Self::over(StreamRef::new("root", data, false))
    }

    /// Open a cursor over the whole of `source`.
    pub fn over(source: StreamRef) -> Self {
        let end = source.len();
        Self {
            source,
            pos: 0,
            end,
        }
    }

    /// Open a new physical stream (a tunnel) holding `data`.
    pub fn tunnel(label: &'static str, data: Vec<u8>, bit_mode: bool) -> Self {
        Self::over(StreamRef::new(label, data, bit_mode))
    }

    pub fn source(&self) -> &StreamRef {
        &self.source
    }

    pub fn is_bits(&self) -> bool {
        self.source.bit_mode
    }

    /// Current absolute position within the physical buffer.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Units left in the current window.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    /// Move the cursor to an absolute position inside the current window.
    pub fn seek(&mut self, pos: usize) -> Result<(), GrammarError> {
        if pos > self.end {
            return Err(GrammarError::UnexpectedEof {
                offset: pos,
                needed: 0,
                available: self.end,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip `n` units.
    pub fn skip(&mut self, n: usize) -> Result<(), GrammarError> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// A cursor over the next `len` units of this window. The parent cursor
    /// is not advanced.
    pub fn window(&self, len: usize) -> Result<Stream, GrammarError> {
        self.ensure(len)?;
        Ok(Stream {
            source: self.source.clone(),
            pos: self.pos,
            end: self.pos + len,
        })
    }

    /// The same window under a new stream identity. Offsets are unchanged.
    pub fn aliased(&self, label: &'static str) -> Stream {
        Stream {
            source: self.source.alias(label),
            pos: self.pos,
            end: self.end,
        }
    }

    /// A cursor positioned at `offset` spanning to the end of the physical
    /// buffer, independent of the current window. It reads the same data
    /// under a new stream identity named `label`.
    pub fn detached_at(&self, label: &'static str, offset: usize) -> Result<Stream, GrammarError> {
        if offset > self.source.len() {
            return Err(GrammarError::UnexpectedEof {
                offset,
                needed: 0,
                available: self.source.len(),
            });
        }
        Ok(Stream {
            source: self.source.alias(label),
            pos: offset,
            end: self.source.len(),
        })
    }

    fn ensure(&self, n: usize) -> Result<(), GrammarError> {
        if self.pos + n > self.end {
            return Err(GrammarError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Read `n` raw units (bytes, or bits in a bit stream).
    pub fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, GrammarError> {
        self.ensure(n)?;
        let out = self.source.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    /// Read `n` bytes. In a bit stream this consumes `8 * n` bits.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, GrammarError> {
        if self.is_bits() {
            let bits = self.read_raw(n * 8)?;
            pack_bits(&bits)
        } else {
            self.read_raw(n)
        }
    }

    /// Read the rest of the window as bytes.
    pub fn read_rest(&mut self) -> Result<Vec<u8>, GrammarError> {
        if self.is_bits() {
            let n = self.remaining() / 8;
            self.read_bytes(n)
        } else {
            let n = self.remaining();
            self.read_raw(n)
        }
    }

    /// Read `n` bits as an unsigned big-endian number. Only valid on a bit
    /// stream.
    pub fn read_bits(&mut self, n: usize) -> Result<u128, GrammarError> {
        if !self.is_bits() {
            return Err(GrammarError::Other(
                "bit-level read outside of a bitwise stream".into(),
            ));
        }
        if n > 128 {
            return Err(GrammarError::Range(format!("{} bits do not fit", n)));
        }
        let bits = self.read_raw(n)?;
        Ok(bits.iter().fold(0u128, |acc, b| (acc << 1) | (*b & 1) as u128))
    }

    /// The unread part of the current window, in raw units.
    pub fn peek_rest(&self) -> &[u8] {
        &self.source.data[self.pos..self.end]
    }

    /// Look at the next byte without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        if self.pos < self.end && !self.is_bits() {
            Some(self.source.data[self.pos])
        } else {
            None
        }
    }
}

/// Write buffer used while building. Mirrors the bit/byte addressing of the
/// stream it will later be read back from.
///
/// Writes happen at the cursor, overwriting what is already there and
/// extending the buffer as needed.
#[derive(Debug, Clone, Default)]
pub struct Sink {
    buf: Vec<u8>,
    pos: usize,
    bit_mode: bool,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bits() -> Self {
        Self {
            bit_mode: true,
            ..Self::default()
        }
    }

    /// A fresh sink with the same addressing mode as `self`.
    pub fn sibling(&self) -> Self {
        Self {
            bit_mode: self.bit_mode,
            ..Self::default()
        }
    }

    pub fn is_bits(&self) -> bool {
        self.bit_mode
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Move the write cursor, zero-extending the buffer if needed.
    pub fn seek(&mut self, pos: usize) {
        if self.buf.len() < pos {
            self.buf.resize(pos, 0);
        }
        self.pos = pos;
    }

    /// Write raw units (already in this sink's addressing mode).
    pub fn write_raw(&mut self, data: &[u8]) {
        let end = self.pos + data.len();
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
    }

    /// Write bytes. A bit sink stores each byte as eight bits.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.bit_mode {
            self.write_raw(&unpack_bits(data));
        } else {
            self.write_raw(data);
        }
    }

    /// Write the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u128, n: usize) -> Result<(), GrammarError> {
        if !self.bit_mode {
            return Err(GrammarError::Other(
                "bit-level write outside of a bitwise stream".into(),
            ));
        }
        let bits: Vec<u8> = (0..n).rev().map(|i| ((value >> i) & 1) as u8).collect();
        self.write_raw(&bits);
        Ok(())
    }

    /// Write `n` zero units.
    pub fn pad(&mut self, n: usize) {
        self.write_raw(&vec![0; n]);
    }

    /// Write at an absolute position without moving the cursor.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) {
        let pos = self.pos;
        self.pos = offset;
        self.write_raw(data);
        self.pos = pos;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Expand bytes into one byte per bit, most significant bit first.
pub fn unpack_bits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 8);
    for b in data {
        for i in (0..8).rev() {
            out.push((b >> i) & 1);
        }
    }
    out
}

/// Pack one-byte-per-bit data back into bytes.
pub fn pack_bits(bits: &[u8]) -> Result<Vec<u8>, GrammarError> {
    if bits.len() % 8 != 0 {
        return Err(GrammarError::Framing(format!(
            "{} bits is not a whole number of bytes",
            bits.len()
        )));
    }
    Ok(bits
        .chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, b| (acc << 1) | (b & 1)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_keep_absolute_offsets() {
        let mut s = Stream::root(vec![1u8, 2, 3, 4, 5]);
        s.skip(1).unwrap();
        let mut w = s.window(2).unwrap();
        assert_eq!(w.tell(), 1);
        assert_eq!(w.read_raw(2).unwrap(), vec![2, 3]);
        assert!(w.read_raw(1).is_err());
        // parent not advanced
        assert_eq!(s.tell(), 1);
        assert_eq!(w.source(), s.source());
    }

    #[test]
    fn bits_round_trip() {
        let bits = unpack_bits(&[0xA5, 0x01]);
        assert_eq!(&bits[..8], &[1, 0, 1, 0, 0, 1, 0, 1]);
        assert_eq!(pack_bits(&bits).unwrap(), vec![0xA5, 0x01]);
        assert!(pack_bits(&bits[..5]).is_err());
    }

    #[test]
    fn bit_stream_reads() {
        let mut s = Stream::tunnel("bitwise", unpack_bits(&[0b1011_0001]), true);
        assert_eq!(s.read_bits(3).unwrap(), 0b101);
        assert_eq!(s.read_bits(5).unwrap(), 0b10001);
        assert_eq!(s.remaining(), 0);
    }

    #[test]
    fn tunnels_get_distinct_ids() {
        let a = Stream::tunnel("compressed", vec![0], false);
        let b = Stream::tunnel("compressed", vec![0], false);
        assert_ne!(a.source(), b.source());
    }

    #[test]
    fn detached_cursor_reads_same_data_under_new_id() {
        let s = Stream::root(vec![1u8, 2, 3, 4]);
        let mut p = s.detached_at("pointer", 3).unwrap();
        assert_ne!(p.source(), s.source());
        assert_eq!(p.source().label(), "pointer");
        assert_eq!(p.tell(), 3);
        assert_eq!(p.read_raw(1).unwrap(), vec![4]);
        assert!(s.detached_at("pointer", 5).is_err());
    }

    #[test]
    fn sink_write_at_extends() {
        let mut s = Sink::new();
        s.write_bytes(&[1, 2]);
        s.write_at(4, &[9]);
        assert_eq!(s.as_slice(), &[1, 2, 0, 0, 9]);
        // the cursor did not move; sequential writes overwrite the gap
        s.write_bytes(&[3]);
        assert_eq!(s.tell(), 3);
        assert_eq!(s.as_slice(), &[1, 2, 3, 0, 9]);
    }
}
