//! Utility functions and structures.

use crate::{HalError, Result};

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

//-----------------------------------------------------------------------------

// Utilities for working with files.

const SIZE_UNITS: [(f64, &str); 6] = [
    (1.0, "B"),
    (1024.0, "KiB"),
    (1024.0 * 1024.0, "MiB"),
    (1024.0 * 1024.0 * 1024.0, "GiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0, "PiB"),
];

/// Returns a human-readable representation of the given number of bytes.
pub fn human_readable_size(bytes: usize) -> String {
    let mut unit = 0;
    let value = bytes as f64;
    while unit + 1 < SIZE_UNITS.len() && value >= SIZE_UNITS[unit + 1].0 {
        unit += 1;
    }
    format!("{:.3} {}", value / SIZE_UNITS[unit].0, SIZE_UNITS[unit].1)
}

/// Returns a human-readable size of the file.
pub fn file_size<P: AsRef<Path>>(filename: P) -> Option<String> {
    let metadata = fs::metadata(filename).ok()?;
    Some(human_readable_size(metadata.len() as usize))
}

/// Returns `true` if the file exists.
pub fn file_exists<P: AsRef<Path>>(filename: P) -> bool {
    fs::metadata(filename).is_ok()
}

//-----------------------------------------------------------------------------

// DNA chunks.

/// Compresses a chunk of DNA with zlib at the given compression level (0 to 9).
pub fn compress_chunk(chunk: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(chunk.len() / 4 + 16), Compression::new(level));
    encoder.write_all(chunk)?;
    let result = encoder.finish()?;
    Ok(result)
}

/// Decompresses a chunk compressed with [`compress_chunk`].
///
/// Returns an error if the decompressed chunk is not of the expected length.
pub fn decompress_chunk(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::with_capacity(expected_len);
    decoder.read_to_end(&mut result)?;
    if result.len() != expected_len {
        return Err(HalError::storage(format!(
            "DNA chunk has length {} (expected {})", result.len(), expected_len
        )));
    }
    Ok(result)
}

//-----------------------------------------------------------------------------

// Bases.

/// Returns the complement of a base, preserving case.
///
/// Bases other than `ACGTacgt` are returned unchanged.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T', b'C' => b'G', b'G' => b'C', b'T' => b'A',
        b'a' => b't', b'c' => b'g', b'g' => b'c', b't' => b'a',
        _ => base,
    }
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
