//! Dense one-bit-per-pixel raster mask
//!
//! Rows are packed into `u64` words, least significant bit first, like the
//! tile bitmaps of the sparse contour builder. Bits past the right edge of a
//! row are always zero so that equality and population counts are exact.

use outline_common::{Error, Result};

/// 8-neighborhood in circular order, starting north and turning clockwise
/// (in image orientation, y down).
const RING8: [(i64, i64); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Boolean raster mask, row-major, `w x h` pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct BitGrid {
    w: usize,
    h: usize,
    words_per_row: usize,
    bits: Vec<u64>,
}

impl BitGrid {
    /// An all-background grid.
    pub fn new(w: usize, h: usize) -> Self {
        let words_per_row = w.div_ceil(64);
        Self {
            w,
            h,
            words_per_row,
            bits: vec![0u64; words_per_row * h],
        }
    }

    /// Build a grid by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(w: usize, h: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut grid = Self::new(w, h);
        for y in 0..h {
            for x in 0..w {
                if f(x, y) {
                    grid.set_bit(x, y);
                }
            }
        }
        grid
    }

    /// Parse a picture of the mask: `#` (or `1`) is foreground, `.` (or `0`)
    /// is background. All rows must have the same length.
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let h = rows.len();
        let w = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        let mut grid = Self::new(w, h);
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != w {
                return Err(Error::invalid_input(format!(
                    "row {y} has {} pixels, expected {w}",
                    row.chars().count()
                )));
            }
            for (x, c) in row.chars().enumerate() {
                match c {
                    '#' | '1' => grid.set_bit(x, y),
                    '.' | '0' => {}
                    other => {
                        return Err(Error::invalid_input(format!(
                            "unexpected mask character {other:?} at ({x}, {y})"
                        )))
                    }
                }
            }
        }
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    /// True when the grid has zero pixels.
    pub fn is_degenerate(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    fn check(&self, x: usize, y: usize) -> Result<()> {
        if x >= self.w || y >= self.h {
            return Err(Error::invalid_input(format!(
                "pixel ({x}, {y}) outside {}x{} grid",
                self.w, self.h
            )));
        }
        Ok(())
    }

    pub fn get(&self, x: usize, y: usize) -> Result<bool> {
        self.check(x, y)?;
        Ok(self.bit(x, y))
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) -> Result<()> {
        self.check(x, y)?;
        if value {
            self.set_bit(x, y);
        } else {
            self.clear_bit(x, y);
        }
        Ok(())
    }

    /// Pixel value with everything outside the grid reading as background.
    #[inline]
    pub fn value_at(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x as usize >= self.w || y as usize >= self.h {
            return false;
        }
        self.bit(x as usize, y as usize)
    }

    #[inline]
    pub(crate) fn bit(&self, x: usize, y: usize) -> bool {
        debug_assert!(x < self.w && y < self.h);
        (self.bits[y * self.words_per_row + x / 64] >> (x % 64)) & 1 != 0
    }

    #[inline]
    pub(crate) fn set_bit(&mut self, x: usize, y: usize) {
        debug_assert!(x < self.w && y < self.h);
        self.bits[y * self.words_per_row + x / 64] |= 1u64 << (x % 64);
    }

    #[inline]
    fn clear_bit(&mut self, x: usize, y: usize) {
        self.bits[y * self.words_per_row + x / 64] &= !(1u64 << (x % 64));
    }

    /// Packed words of row `y` (LSB first).
    pub fn row_words(&self, y: usize) -> &[u64] {
        &self.bits[y * self.words_per_row..(y + 1) * self.words_per_row]
    }

    /// Number of foreground pixels.
    pub fn count_set(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True when no pixel is foreground.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Flip every pixel.
    pub fn invert(&mut self) {
        let tail = self.w % 64;
        let tail_mask = if tail == 0 { u64::MAX } else { (1u64 << tail) - 1 };
        for row in self.bits.chunks_mut(self.words_per_row.max(1)) {
            for word in row.iter_mut() {
                *word = !*word;
            }
            if let Some(last) = row.last_mut() {
                *last &= tail_mask;
            }
        }
    }

    /// Clear every foreground pixel that lacks two mutually adjacent
    /// foreground neighbors (two consecutive pixels in its 8-ring).
    ///
    /// Isolated pixels, pixels hanging on by a diagonal and one pixel wide
    /// lines go away. The decision for every pixel is made against the
    /// unmodified input.
    pub fn erode(&mut self) {
        let mut out = BitGrid::new(self.w, self.h);
        for y in 0..self.h {
            for x in 0..self.w {
                if !self.bit(x, y) {
                    continue;
                }
                let ring: [bool; 8] = std::array::from_fn(|i| {
                    let (dx, dy) = RING8[i];
                    self.value_at(x as i64 + dx, y as i64 + dy)
                });
                let keep = (0..8).any(|i| ring[i] && ring[(i + 1) % 8]);
                if keep {
                    out.set_bit(x, y);
                }
            }
        }
        *self = out;
    }
}

impl std::fmt::Debug for BitGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "BitGrid {}x{}", self.w, self.h)?;
        for y in 0..self.h {
            let row: String = (0..self.w)
                .map(|x| if self.bit(x, y) { '#' } else { '.' })
                .collect();
            writeln!(f, "  {row}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_and_bounds() {
        let mut grid = BitGrid::new(70, 3);
        grid.set(69, 2, true).unwrap();
        assert!(grid.get(69, 2).unwrap());
        assert!(!grid.get(0, 0).unwrap());
        assert!(grid.get(70, 0).is_err());
        assert!(grid.set(0, 3, true).is_err());
        assert_eq!(grid.count_set(), 1);
    }

    #[test]
    fn test_invert_keeps_padding_clear() {
        let mut grid = BitGrid::new(5, 2);
        grid.invert();
        assert_eq!(grid.count_set(), 10);
        grid.invert();
        assert!(grid.is_empty());
        assert_eq!(grid, BitGrid::new(5, 2));
    }

    #[test]
    fn test_erode_removes_isolated_and_diagonal_pixels() {
        let mut grid = BitGrid::from_rows(&[
            "#.....",
            ".#.###",
            "...###",
            "...###",
        ])
        .unwrap();
        grid.erode();
        let expected = BitGrid::from_rows(&[
            "......",
            "...###",
            "...###",
            "...###",
        ])
        .unwrap();
        assert_eq!(grid, expected);
    }

    #[test]
    fn test_erode_removes_thin_lines() {
        let mut grid = BitGrid::from_rows(&[".....", "#####", "....."]).unwrap();
        grid.erode();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        assert!(BitGrid::from_rows(&["##", "#"]).is_err());
        assert!(BitGrid::from_rows(&["#x"]).is_err());
    }

    #[test]
    fn test_zero_size_grid() {
        let mut grid = BitGrid::new(0, 0);
        assert!(grid.is_degenerate());
        assert!(grid.is_empty());
        grid.invert();
        grid.erode();
        assert_eq!(grid.count_set(), 0);
    }
}
