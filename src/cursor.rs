use crate::boxes::FourCC;
use crate::parser::{ParseError, Result};
use byteorder::{BigEndian, ByteOrder};

/// Big-endian reader over a borrowed byte scope.
///
/// Every read advances the position and fails with
/// [`ParseError::TruncatedInput`] when the scope holds fewer bytes than
/// requested. Slices handed out by [`read_bytes`](Self::read_bytes) and
/// [`remainder`](Self::remainder) borrow from the source buffer.
///
/// In partial mode a short [`read_bytes`](Self::read_bytes) returns whatever
/// is left instead of failing, so a progressively downloaded prefix can still
/// be read up to its end.
#[derive(Debug, Clone)]
pub struct BoxCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
    partial: bool,
}

impl<'a> BoxCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::scoped(data, 0, false)
    }

    /// Cursor over `data`, which starts at absolute offset `base` in the
    /// outermost buffer.
    pub fn scoped(data: &'a [u8], base: u64, partial: bool) -> Self {
        Self {
            data,
            pos: 0,
            base,
            partial,
        }
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Position relative to the start of this scope.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the next byte in the outermost buffer.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(ParseError::TruncatedInput {
                needed: n,
                available: self.remaining(),
            });
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.take(3)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let b = self.take(4)?;
        Ok(FourCC([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Zero-copy view of the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.partial && n > self.remaining() {
            return Ok(self.remainder());
        }
        self.take(n)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Consume and return everything left in this scope.
    pub fn remainder(&mut self) -> &'a [u8] {
        let s = &self.data[self.pos..];
        self.pos = self.data.len();
        s
    }

    /// Everything left in this scope, without consuming it.
    pub fn peek_remainder(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}
