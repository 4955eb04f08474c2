//! Primitive encodings used by the container: little-endian `i32` counts and
//! strings prefixed with a 7-bit variable-length byte count.

use std::io::{self, Read, Write};

use crate::error::{ArchiverError, Result};

pub fn write_i32<W: Write>(w: &mut W, value: i32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes a length or count, which must fit a non-negative `i32`.
pub fn write_len<W: Write>(w: &mut W, len: usize) -> Result<()> {
    let value = i32::try_from(len)
        .map_err(|_| {
            ArchiverError::Corrupt(format!("length {len} does not fit the archive format"))
        })?;
    write_i32(w, value)?;
    Ok(())
}

pub fn write_u8<W: Write>(w: &mut W, value: u8) -> io::Result<()> {
    w.write_all(&[value])
}

pub fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let mut len = s.len() as u64;
    while len >= 0x80 {
        w.write_all(&[(len as u8) | 0x80])?;
        len >>= 7;
    }
    w.write_all(&[len as u8])?;
    w.write_all(s.as_bytes())
}

fn eof_to_corrupt(e: io::Error, what: &str) -> ArchiverError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ArchiverError::Corrupt(format!("unexpected end of archive while reading {what}"))
    } else {
        ArchiverError::from(e)
    }
}

pub fn read_u8<R: Read>(r: &mut R, what: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(|e| eof_to_corrupt(e, what))?;
    Ok(buf[0])
}

pub fn read_i32<R: Read>(r: &mut R, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| eof_to_corrupt(e, what))?;
    Ok(i32::from_le_bytes(buf))
}

/// Reads an `i32` that must not be negative.
pub fn read_len<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let value = read_i32(r, what)?;
    usize::try_from(value).map_err(|_| ArchiverError::Corrupt(format!("negative {what}: {value}")))
}

pub fn read_string<R: Read>(r: &mut R, what: &str) -> Result<String> {
    let mut len: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = read_u8(r, what)?;
        if shift == 28 && byte & 0xF0 != 0 {
            return Err(ArchiverError::Corrupt(format!("bad length prefix for {what}")));
        }
        len |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let len = i32::try_from(len)
        .map_err(|_| ArchiverError::Corrupt(format!("bad length prefix for {what}")))? as usize;

    let mut bytes = Vec::with_capacity(len.min(4096));
    r.take(len as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| eof_to_corrupt(e, what))?;
    if bytes.len() != len {
        return Err(ArchiverError::Corrupt(format!(
            "unexpected end of archive while reading {what}"
        )));
    }
    String::from_utf8(bytes)
        .map_err(|_| ArchiverError::Corrupt(format!("{what} is not valid UTF-8")))
}
