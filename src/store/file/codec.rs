//! Frame codec for store files.
//!
//! Every entry is one self-checking frame:
//!
//! ```text
//! [version: u8][payload length: u32 LE][payload: JSON][crc32(payload): u32 LE]
//! ```
//!
//! A store file opens with [`MAGIC`] followed by the same version byte.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use serde::{de::DeserializeOwned, Serialize};

/// Frame and file format version.
pub const CODEC_VERSION: u8 = 1;

/// First four bytes of every store file.
pub const MAGIC: [u8; 4] = *b"CAFR";

/// Magic plus version.
pub const HEADER_LEN: u64 = MAGIC.len() as u64 + 1;

/// Bytes a frame adds around its payload.
pub const FRAME_OVERHEAD: u64 = 1 + 4 + 4;

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

fn read_array<const N: usize>(reader: &mut impl Read) -> IoResult<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn check_version(version: u8, what: &str) -> IoResult<()> {
    if version == CODEC_VERSION {
        Ok(())
    } else {
        Err(invalid(format!("unsupported {what} version {version}, this build reads {CODEC_VERSION}")))
    }
}

/// Serialize `value` into a complete frame.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let payload = serde_json::to_vec(value).map_err(|e| invalid(format!("cannot serialize entry: {e}")))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| invalid(format!("entry of {} bytes does not fit a frame", payload.len())))?;

    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD as usize);
    frame.push(CODEC_VERSION);
    frame.extend(len.to_le_bytes());
    frame.extend(&payload);
    frame.extend(checksum(&payload).to_le_bytes());
    Ok(frame)
}

/// Read one frame and deserialize its payload.
///
/// # Errors
/// `InvalidData` for a foreign version, a payload over `max_entry_size`, a
/// checksum mismatch or undecodable JSON; `UnexpectedEof` for a cut-off frame.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read, max_entry_size: usize) -> IoResult<T> {
    let [version] = read_array::<1>(reader)?;
    check_version(version, "frame")?;

    let len = u32::from_le_bytes(read_array::<4>(reader)?) as usize;
    if len > max_entry_size {
        return Err(invalid(format!("entry size {len} exceeds maximum {max_entry_size}")));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let stored = u32::from_le_bytes(read_array::<4>(reader)?);
    let actual = checksum(&payload);
    if stored != actual {
        return Err(invalid(format!("CRC mismatch (stored {stored:08x}, computed {actual:08x})")));
    }

    serde_json::from_slice(&payload).map_err(|e| invalid(format!("cannot deserialize entry: {e}")))
}

/// Write [`MAGIC`] and the version byte.
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])
}

/// Check the file header, returning its version.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let magic = read_array::<4>(reader)?;
    if magic != MAGIC {
        return Err(invalid(format!(
            "invalid magic bytes {:?}, not a record store",
            String::from_utf8_lossy(&magic)
        )));
    }
    let [version] = read_array::<1>(reader)?;
    check_version(version, "store")?;
    Ok(version)
}
