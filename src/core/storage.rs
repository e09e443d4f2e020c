use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 8] = b"BRAINS01";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

/// Chunk holding the LZ4-compressed JSON model export.
pub const EXPORT_TAG: [u8; 4] = *b"EXPT";

/// Upper bound on the LZ4 block expansion ratio.
const MAX_LZ4_RATIO: usize = 255;

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    // Raw LZ4 block; the uncompressed size is stored alongside.
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

/// Sink that only counts bytes, for exact image sizing.
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Default for CountingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

/// Write an LZ4 chunk: payload is compressed and preceded by its uncompressed length.
///
/// Layout:
/// - tag: [u8;4]
/// - len: u32 (bytes following, including the 4-byte uncompressed length)
/// - uncompressed_len: u32
/// - compressed payload bytes
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

/// Read the body of an LZ4 chunk whose header has already been consumed.
pub fn read_chunk_lz4_body<R: Read>(r: &mut R, len: u32) -> io::Result<Vec<u8>> {
    if len < 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "lz4 chunk too short"));
    }
    let uncompressed_len = read_u32_le(r)? as usize;

    // Sizes come from the stream: grow with the bytes actually present.
    let body_len = u64::from(len - 4);
    let mut compressed = Vec::new();
    Read::take(&mut *r, body_len).read_to_end(&mut compressed)?;
    if compressed.len() as u64 != body_len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated lz4 chunk"));
    }
    if uncompressed_len > compressed.len().saturating_mul(MAX_LZ4_RATIO) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "lz4 chunk size out of range"));
    }
    decompress_lz4(&compressed, uncompressed_len)
}

/// Skip `len` bytes of an unknown chunk.
pub fn skip_chunk<R: Read>(r: &mut R, len: u32) -> io::Result<()> {
    let mut limited = Read::take(&mut *r, u64::from(len));
    let skipped = io::copy(&mut limited, &mut io::sink())?;
    if skipped != u64::from(len) {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_chunk_round_trips() {
        let payload = b"{\"version\":\"1\"}".repeat(20);
        let mut buf = Vec::new();
        write_chunk_lz4(&mut buf, EXPORT_TAG, &payload).unwrap();

        let mut r = buf.as_slice();
        let (tag, len) = read_chunk_header(&mut r).unwrap();
        assert_eq!(tag, EXPORT_TAG);
        assert_eq!(read_chunk_lz4_body(&mut r, len).unwrap(), payload);
        assert!(r.is_empty());
    }

    #[test]
    fn counting_writer_matches_buffer_length() {
        let mut buf = Vec::new();
        let mut cw = CountingWriter::new();
        write_chunk_lz4(&mut buf, *b"TEST", b"hello hello hello").unwrap();
        write_chunk_lz4(&mut cw, *b"TEST", b"hello hello hello").unwrap();
        assert_eq!(cw.written(), buf.len());
    }

    #[test]
    fn corrupt_chunk_sizes_are_rejected() {
        // Claims ~4 GiB of body but carries three bytes.
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 16).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        let err = read_chunk_lz4_body(&mut buf.as_slice(), u32::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        // Claims an uncompressed size no LZ4 block of this length can produce.
        let mut chunk = Vec::new();
        write_chunk_lz4(&mut chunk, EXPORT_TAG, b"tiny").unwrap();
        chunk[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut r = chunk.as_slice();
        let (_, len) = read_chunk_header(&mut r).unwrap();
        let err = read_chunk_lz4_body(&mut r, len).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn skip_chunk_detects_truncation() {
        let data = [1u8, 2, 3];
        let mut r = &data[..];
        assert!(skip_chunk(&mut r, 2).is_ok());
        assert!(skip_chunk(&mut r, 5).is_err());
    }
}
