//! (De)compression support for gzip-wrapped image files.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Decompresses gzip data and returns the uncompressed bytes.
///
/// # Arguments
///
/// * `data`: Compressed data
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    // Compressed images typically shrink by a factor of 2-4.
    let mut buf = Vec::with_capacity(data.len() * 4);
    decoder.read_to_end(&mut buf)?;
    buf.shrink_to_fit();
    Ok(buf)
}

/// Compresses data with gzip using the default compression level.
///
/// # Arguments
///
/// * `data`: Uncompressed data
pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Returns whether the data starts with the gzip magic number.
#[cfg(test)]
fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&[0x1f, 0x8b])
}
