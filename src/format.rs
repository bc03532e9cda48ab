//! Wire format shared by both index variants.
//!
//! # Layout
//!
//! Both variants share a framed header; the first four bytes select the
//! variant:
//! - magic (4 bytes, `"MVEC"` or `"MHNS"`)
//! - format_version (u16)
//! - dimensions (i32)
//! - chunk_count (i32)
//! - model_hash (i64, sign-extended 32-bit string hash of the model id)
//! - model_id (u16 length + UTF-8 bytes)
//! - chunks_json_len (i32) + chunks_json (a JSON array of chunks)
//!
//! The MVEC body then carries `chunk_count * dimensions` raw f32s in
//! insertion order; the MHNS body carries a length-prefixed opaque graph
//! image. All integers and floats are big-endian.

use std::io::{Read, Write};

use crate::chunk::CodeChunk;
use crate::error::{IndexError, Result};

/// Magic bytes of the brute-force variant.
pub const MAGIC_MVEC: [u8; 4] = *b"MVEC";

/// Magic bytes of the proximity-graph variant.
pub const MAGIC_MHNS: [u8; 4] = *b"MHNS";

/// Current format version, covering the header, the chunk JSON keys and
/// the graph image layout. Any change to one of those bumps this.
pub const FORMAT_VERSION: u16 = 1;

/// Decoded common header, everything between the magic and the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub dimensions: usize,
    pub chunk_count: usize,
    pub model_hash: i64,
    pub model_id: String,
}

/// 64-bit model identity hash: the sign-extended 32-bit Java string hash
/// (`h = 31*h + unit` over UTF-16 units). Kept bit-compatible so `.mvec`
/// artifacts interchange with the reference implementation.
#[must_use]
pub fn model_hash(model_id: &str) -> i64 {
    let mut hash: i32 = 0;
    for unit in model_id.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    i64::from(hash)
}

// Primitive big-endian framing. The stream is fully trusted to be a
// private format; every truncation shows up as an Io(UnexpectedEof).

pub fn write_u16(w: &mut (impl Write + ?Sized), value: u16) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_i32(w: &mut (impl Write + ?Sized), value: i32) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_u32(w: &mut (impl Write + ?Sized), value: u32) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_i64(w: &mut (impl Write + ?Sized), value: i64) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn write_f32(w: &mut (impl Write + ?Sized), value: f32) -> Result<()> {
    w.write_all(&value.to_be_bytes())?;
    Ok(())
}

pub fn read_u16(r: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_i32(r: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_i64(r: &mut impl Read) -> Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

pub fn read_f32(r: &mut impl Read) -> Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

/// Writes a string as a u16 byte length followed by UTF-8 bytes.
pub fn write_string(w: &mut (impl Write + ?Sized), value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("string too long for u16 length prefix: {} bytes", bytes.len()),
        )));
    }
    write_u16(w, bytes.len() as u16)?;
    w.write_all(bytes)?;
    Ok(())
}

pub fn read_string(r: &mut impl Read) -> Result<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| {
        IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid UTF-8 in string field: {e}"),
        ))
    })
}

/// Writes the shared header for the given variant.
pub fn write_header(
    w: &mut (impl Write + ?Sized),
    magic: &[u8; 4],
    dimensions: usize,
    chunk_count: usize,
    model_id: &str,
) -> Result<()> {
    w.write_all(magic)?;
    write_u16(w, FORMAT_VERSION)?;
    write_i32(w, dimensions as i32)?;
    write_i32(w, chunk_count as i32)?;
    write_i64(w, model_hash(model_id))?;
    write_string(w, model_id)?;
    Ok(())
}

/// Reads the shared header, assuming the 4 magic bytes were already
/// consumed and matched by the caller.
pub fn read_header(r: &mut impl Read) -> Result<Header> {
    let version = read_u16(r)?;
    if version != FORMAT_VERSION {
        return Err(IndexError::UnsupportedFormat { version });
    }
    let dimensions = read_i32(r)?;
    let chunk_count = read_i32(r)?;
    if dimensions <= 0 || chunk_count < 0 {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("implausible header: dimensions={dimensions}, chunks={chunk_count}"),
        )));
    }
    let hash = read_i64(r)?;
    let model_id = read_string(r)?;
    if hash != model_hash(&model_id) {
        tracing::warn!(
            model_id = %model_id,
            stored = hash,
            computed = model_hash(&model_id),
            "model hash does not match model id; continuing with the id"
        );
    }
    Ok(Header {
        dimensions: dimensions as usize,
        chunk_count: chunk_count as usize,
        model_hash: hash,
        model_id,
    })
}

/// Writes the chunk list as a length-prefixed JSON array.
pub fn write_chunks(w: &mut (impl Write + ?Sized), chunks: &[CodeChunk]) -> Result<()> {
    let json = serde_json::to_vec(chunks)?;
    write_i32(w, json.len() as i32)?;
    w.write_all(&json)?;
    Ok(())
}

/// Reads a length-prefixed JSON chunk array.
pub fn read_chunks(r: &mut impl Read) -> Result<Vec<CodeChunk>> {
    let len = read_i32(r)?;
    if len < 0 {
        return Err(IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("negative chunk payload length: {len}"),
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Writes a vector as raw big-endian f32s.
pub fn write_vector(w: &mut (impl Write + ?Sized), vector: &[f32]) -> Result<()> {
    for &value in vector {
        write_f32(w, value)?;
    }
    Ok(())
}

/// Reads `dimensions` big-endian f32s.
pub fn read_vector(r: &mut impl Read, dimensions: usize) -> Result<Vec<f32>> {
    let mut vector = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        vector.push(read_f32(r)?);
    }
    Ok(vector)
}
