//! Netpbm raster input (PGM and PPM, plain and binary)
//!
//! Grayscale files load as one band, color files as three. Samples wider
//! than a byte (maxval above 255) are read big-endian.

use std::path::Path;

use outline_common::{Error, Result};
use outline_geometry::MemRaster;

struct Header {
    binary: bool,
    bands: usize,
    width: usize,
    height: usize,
    maxval: u32,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn skip_space(&mut self) {
        while let Some(&b) = self.data.get(self.pos) {
            if b == b'#' {
                while self.data.get(self.pos).is_some_and(|&c| c != b'\n') {
                    self.pos += 1;
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn token(&mut self) -> Option<&'a [u8]> {
        self.skip_space();
        let data = self.data;
        let start = self.pos;
        while data
            .get(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace() && *b != b'#')
        {
            self.pos += 1;
        }
        let end = self.pos;
        (end > start).then(|| &data[start..end])
    }

    fn number(&mut self, what: &str) -> Result<u32> {
        let tok = self
            .token()
            .ok_or_else(|| Error::invalid_input(format!("netpbm: missing {what}")))?;
        std::str::from_utf8(tok)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "netpbm: bad {what} '{}'",
                    String::from_utf8_lossy(tok)
                ))
            })
    }
}

fn read_header(cur: &mut Cursor<'_>) -> Result<Header> {
    let (binary, bands) = match cur.token() {
        Some(b"P2") => (false, 1),
        Some(b"P3") => (false, 3),
        Some(b"P5") => (true, 1),
        Some(b"P6") => (true, 3),
        _ => {
            return Err(Error::invalid_input(
                "not a PGM or PPM file (expected P2, P3, P5 or P6)",
            ))
        }
    };
    let width = cur.number("width")? as usize;
    let height = cur.number("height")? as usize;
    let maxval = cur.number("maxval")?;
    if !(1..=65535).contains(&maxval) {
        return Err(Error::invalid_input(format!(
            "netpbm: maxval {maxval} outside 1..=65535"
        )));
    }
    Ok(Header {
        binary,
        bands,
        width,
        height,
        maxval,
    })
}

/// Decode a PGM/PPM image held in memory.
pub fn parse_pnm(data: &[u8]) -> Result<MemRaster> {
    let mut cur = Cursor { data, pos: 0 };
    let header = read_header(&mut cur)?;
    let Header {
        binary,
        bands,
        width,
        height,
        maxval,
    } = header;
    let count = width
        .checked_mul(height)
        .and_then(|c| c.checked_mul(bands))
        .ok_or_else(|| {
            Error::invalid_input(format!("netpbm: {width}x{height} raster is too large"))
        })?;

    let mut samples = Vec::new();
    if binary {
        // exactly one whitespace byte separates the header from the raster
        let start = cur.pos + 1;
        let wide = maxval > 255;
        let truncated = || Error::invalid_input("netpbm: truncated raster data");
        let need = count
            .checked_mul(if wide { 2 } else { 1 })
            .filter(|&n| n <= data.len().saturating_sub(start))
            .ok_or_else(truncated)?;
        let body = data.get(start..start + need).ok_or_else(truncated)?;
        samples.reserve_exact(count);
        if wide {
            samples.extend(
                body.chunks_exact(2)
                    .map(|c| f64::from(u16::from_be_bytes([c[0], c[1]]))),
            );
        } else {
            samples.extend(body.iter().map(|&b| f64::from(b)));
        }
    } else {
        for _ in 0..count {
            let v = cur.number("sample")?;
            if v > maxval {
                return Err(Error::invalid_input(format!(
                    "netpbm: sample {v} above maxval {maxval}"
                )));
            }
            samples.push(f64::from(v));
        }
    }

    // interleaved samples to band-sequential planes
    let planes = (0..bands)
        .map(|b| samples.iter().skip(b).step_by(bands).copied().collect())
        .collect();
    let raster = MemRaster::new(width, height, planes)?;
    tracing::debug!(width, height, bands, maxval, "decoded netpbm raster");
    Ok(raster)
}

pub fn read_pnm(path: &Path) -> Result<MemRaster> {
    let data = std::fs::read(path)?;
    parse_pnm(&data)
}
