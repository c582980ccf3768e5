use crate::error::{Error, Result};
use bitreader::BitReader;

/// MSB-first bit cursor over an in-memory buffer, with the byte-aligned reads
/// needed for OBU framing.
pub struct BitCursor<'a> {
    data: &'a [u8],
    bits: BitReader<'a>,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bits: BitReader::new(data) }
    }

    /// Reads an `n`-bit unsigned value, the `f(n)` descriptor of the AV1 syntax tables.
    pub fn f(&mut self, n: u8) -> Result<u32> {
        Ok(self.bits.read_u32(n)?)
    }

    pub fn flag(&mut self) -> Result<bool> {
        Ok(self.bits.read_bool()?)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.remaining() == 0
    }

    fn byte_position(&self) -> Result<usize> {
        if !self.bits.is_aligned(1) {
            return Err(Error::Bitstream(format!(
                "byte read at unaligned bit position {}",
                self.bits.position()
            )));
        }
        Ok((self.bits.position() / 8) as usize)
    }

    /// Reads a LEB128 value. The cursor must be byte aligned.
    pub fn leb128(&mut self) -> Result<u64> {
        let pos = self.byte_position()?;
        let mut rest = &self.data[pos..];
        let before = rest.len();
        let value = leb128::read::unsigned(&mut rest)?;
        self.bits.skip(((before - rest.len()) * 8) as u64)?;
        Ok(value)
    }

    /// Takes the next `n` bytes. The cursor must be byte aligned.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let pos = self.byte_position()?;
        let data = self.data;
        let slice = pos
            .checked_add(n)
            .and_then(|end| data.get(pos..end))
            .ok_or_else(|| {
                Error::Bitstream(format!("need {n} bytes but only {} remain", data.len() - pos))
            })?;
        self.bits.skip((n * 8) as u64)?;
        Ok(slice)
    }
}
