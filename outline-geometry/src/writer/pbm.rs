//! Mask export as binary PBM (`P4`)
//!
//! Rows are packed most significant bit first and padded to whole bytes;
//! a set bit is a black (foreground) pixel.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use outline_common::Result;

use crate::bitgrid::BitGrid;

pub fn write_pbm<W: Write>(grid: &BitGrid, mut out: W) -> Result<()> {
    let (w, h) = (grid.width(), grid.height());
    write!(out, "P4\n{w} {h}\n")?;
    let mut row = vec![0u8; w.div_ceil(8)];
    for y in 0..h {
        row.fill(0);
        for x in 0..w {
            if grid.bit(x, y) {
                row[x / 8] |= 0x80 >> (x % 8);
            }
        }
        out.write_all(&row)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_pbm_file(grid: &BitGrid, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_pbm(grid, BufWriter::new(file))?;
    tracing::debug!(path = %path.display(), "wrote mask");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packing() {
        let grid = BitGrid::from_rows(&["#........#", ".#........"]).unwrap();
        let mut buf = Vec::new();
        write_pbm(&grid, &mut buf).unwrap();
        let header = b"P4\n10 2\n";
        assert_eq!(&buf[..header.len()], header);
        assert_eq!(&buf[header.len()..], &[0x80, 0x40, 0x40, 0x00]);
    }

    #[test]
    fn test_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.pbm");
        write_pbm_file(&BitGrid::from_rows(&["##"]).unwrap(), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"P4\n2 1\n\xc0");
    }
}
