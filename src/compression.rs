//! Gzip detection and bounded in-memory decompression.

use crate::importer::ImportError;
use flate2::read::MultiGzDecoder;
use std::io::{self, Read, Seek, SeekFrom};

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest buffer the importer will hold: a 32-bit signed length.
pub const DEFAULT_SIZE_LIMIT: u64 = i32::MAX as u64;

/// Restores a stream's position when dropped.
struct RestorePosition<'a, S: Seek> {
    stream: &'a mut S,
    position: u64,
}

impl<'a, S: Seek> RestorePosition<'a, S> {
    fn new(stream: &'a mut S) -> io::Result<Self> {
        let position = stream.stream_position()?;
        Ok(RestorePosition { stream, position })
    }
}

impl<S: Seek> Drop for RestorePosition<'_, S> {
    fn drop(&mut self) {
        let _ = self.stream.seek(SeekFrom::Start(self.position));
    }
}

pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

/// Peeks at the first two bytes of `stream` for the gzip magic.
///
/// The stream is left at the position it had on entry, whatever the outcome.
pub fn sniff_gzip<S: Read + Seek>(stream: &mut S) -> io::Result<bool> {
    let mut guard = RestorePosition::new(stream)?;

    let mut magic = [0u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        match guard.stream.read(&mut magic[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(is_gzip(&magic[..filled]))
}

/// Reads `declared_len` bytes from `reader` into memory.
///
/// Short reads are retried until the length is consumed; an early EOF ends
/// the read with whatever arrived.
pub fn read_all_bounded<R: Read>(
    reader: &mut R,
    declared_len: u64,
    limit: u64,
) -> Result<Vec<u8>, ImportError> {
    if declared_len > limit {
        return Err(ImportError::SizeLimitExceeded {
            size: declared_len,
            limit,
        });
    }

    let mut bytes = vec![0u8; declared_len as usize];
    let mut index = 0;
    while index < bytes.len() {
        match reader.read(&mut bytes[index..]) {
            Ok(0) => break,
            Ok(n) => index += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ImportError::Io(e)),
        }
    }
    bytes.truncate(index);

    Ok(bytes)
}

/// Expands a gzip buffer, including every member of a concatenated stream.
/// Output beyond `limit` bytes is an error.
pub fn gunzip(data: &[u8], limit: u64) -> Result<Vec<u8>, ImportError> {
    let mut decoder = MultiGzDecoder::new(data).take(limit.saturating_add(1));
    let mut expanded = Vec::new();
    decoder
        .read_to_end(&mut expanded)
        .map_err(ImportError::Decompress)?;

    if expanded.len() as u64 > limit {
        return Err(ImportError::SizeLimitExceeded {
            size: expanded.len() as u64,
            limit,
        });
    }

    Ok(expanded)
}
