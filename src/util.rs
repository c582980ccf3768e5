use crate::boxes::FourCC;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

const COPY_CHUNK: usize = 32 * 1024;

/// Random-access reader over the source file.
pub struct SourceReader<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> SourceReader<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads `len` bytes at `offset` and restores the current position.
    pub fn read_slice(&mut self, offset: u64, len: u64) -> io::Result<Vec<u8>> {
        let pos = self.position()?;
        let data = read_slice(&mut self.inner, offset, len);
        self.seek_to(pos)?;
        data
    }

    /// Streams `len` bytes at `offset` into `out` without buffering the whole range.
    pub fn copy_range_to<W: Write>(&mut self, out: &mut W, offset: u64, len: u64) -> io::Result<()> {
        let pos = self.position()?;
        self.seek_to(offset)?;
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(COPY_CHUNK as u64) as usize;
            self.inner.read_exact(&mut buf[..n])?;
            out.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        self.seek_to(pos)
    }
}

pub fn read_slice<R: Read + Seek>(r: &mut R, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    r.seek(SeekFrom::Start(offset))?;
    let mut v = vec![0u8; len as usize];
    r.read_exact(&mut v)?;
    Ok(v)
}

// ---------- Body cursor helpers ----------

pub type BodyCursor<'a> = Cursor<&'a [u8]>;

pub fn remaining(cur: &BodyCursor<'_>) -> usize {
    cur.get_ref().len().saturating_sub(cur.position() as usize)
}

pub fn read_fourcc(cur: &mut BodyCursor<'_>) -> io::Result<FourCC> {
    let mut b = [0u8; 4];
    cur.read_exact(&mut b)?;
    Ok(FourCC(b))
}

pub fn read_bytes(cur: &mut BodyCursor<'_>, len: usize) -> io::Result<Vec<u8>> {
    let mut v = vec![0u8; len];
    cur.read_exact(&mut v)?;
    Ok(v)
}

pub fn read_to_end(cur: &mut BodyCursor<'_>) -> Vec<u8> {
    let mut v = Vec::new();
    // reading from an in-memory cursor cannot fail
    let _ = cur.read_to_end(&mut v);
    v
}

/// Reads a NUL-terminated string. A missing terminator ends the string at the end of the body.
pub fn read_cstring(cur: &mut BodyCursor<'_>) -> String {
    let mut buf = Vec::new();
    while let Ok(b) = cur.read_u8() {
        if b == 0 {
            break;
        }
        buf.push(b);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Reads a big-endian unsigned integer of `width` bytes (0, 1, 2, 4 or 8).
pub fn read_sized(cur: &mut BodyCursor<'_>, width: u8) -> io::Result<u64> {
    Ok(match width {
        0 => 0,
        1 => cur.read_u8()? as u64,
        2 => cur.read_u16::<BigEndian>()? as u64,
        4 => cur.read_u32::<BigEndian>()? as u64,
        8 => cur.read_u64::<BigEndian>()?,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported field width")),
    })
}

/// Writes `value` as a big-endian unsigned integer of `width` bytes.
pub fn write_sized(out: &mut Vec<u8>, value: u64, width: u8) -> io::Result<()> {
    let max = if width >= 8 { u64::MAX } else { (1u64 << (width as u32 * 8)) - 1 };
    if value > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("value {value} does not fit in {width} bytes"),
        ));
    }
    match width {
        0 => {}
        1 => out.write_u8(value as u8)?,
        2 => out.write_u16::<BigEndian>(value as u16)?,
        4 => out.write_u32::<BigEndian>(value as u32)?,
        8 => out.write_u64::<BigEndian>(value)?,
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported field width")),
    }
    Ok(())
}

pub fn write_cstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}
