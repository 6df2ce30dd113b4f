//! Scan conversion of ring sets back into a mask
//!
//! A pixel is foreground when its center lies inside an odd number of rings.
//! Rings of one Mpoly never overlap except through nesting, so this is the
//! same as being inside an exterior ring and outside its holes, with islands
//! inside holes counting again.

use outline_common::{Error, Result};

use crate::bitgrid::BitGrid;
use crate::ring::{CoordSpace, Mpoly};

/// Rasterize a pixel-space Mpoly into a `w x h` grid.
pub fn fill(mpoly: &Mpoly, w: usize, h: usize) -> Result<BitGrid> {
    if mpoly.space() != CoordSpace::Pixel {
        return Err(Error::CoordSpace {
            expected: CoordSpace::Pixel.name(),
            found: mpoly.space().name(),
        });
    }

    let mut grid = BitGrid::new(w, h);
    if grid.is_degenerate() || mpoly.is_empty() {
        return Ok(grid);
    }

    let edges: Vec<_> = mpoly
        .rings()
        .iter()
        .flat_map(|ring| ring.edges())
        .filter(|(a, b)| a.y != b.y)
        .collect();

    let mut xs = Vec::new();
    for y in 0..h {
        let yc = y as f64 + 0.5;
        xs.clear();
        for (a, b) in &edges {
            if (a.y <= yc) != (b.y <= yc) {
                xs.push(a.x + (yc - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
        xs.sort_by(f64::total_cmp);

        for span in xs.chunks_exact(2) {
            // pixels whose center x + 0.5 falls in [left, right)
            let first = (span[0] - 0.5).ceil().max(0.0) as usize;
            let end = ((span[1] - 0.5).ceil().max(0.0) as usize).min(w);
            for x in first..end {
                grid.set_bit(x, y);
            }
        }
    }

    tracing::trace!(w, h, pixels = grid.count_set(), "rasterized rings");
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Point, Ring, RingId};
    use crate::tracer::trace;

    fn grid(rows: &[&str]) -> BitGrid {
        BitGrid::from_rows(rows).unwrap()
    }

    #[test]
    fn test_round_trip_fixtures() {
        for rows in [
            &[".....", ".###.", ".#.#.", ".###.", "....."][..],
            &["#.", ".#"][..],
            &["####", "#.##", "##.#", "####"][..],
            &[
                "#######",
                "#.....#",
                "#.###.#",
                "#.#.#.#",
                "#.###.#",
                "#.....#",
                "#######",
            ][..],
        ] {
            let mask = grid(rows);
            let mp = trace(&mask, 0.0, false).unwrap();
            assert_eq!(fill(&mp, mask.width(), mask.height()).unwrap(), mask);
        }
    }

    #[test]
    fn test_fill_clips_to_grid() {
        let square = Ring::new(
            vec![
                Point::new(-2.0, -2.0),
                Point::new(2.0, -2.0),
                Point::new(2.0, 2.0),
                Point::new(-2.0, 2.0),
            ],
            false,
            None,
        );
        let hole = Ring::new(
            vec![
                Point::new(1.0, 1.0),
                Point::new(1.0, 1.75),
                Point::new(1.75, 1.75),
                Point::new(1.75, 1.0),
            ],
            true,
            Some(RingId(0)),
        );
        let mp = Mpoly::from_rings(vec![square, hole]).unwrap();
        let out = fill(&mp, 3, 3).unwrap();
        // the hole covers the center of pixel (1, 1)
        assert_eq!(out, grid(&["##.", "#..", "..."]));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(fill(&Mpoly::new(), 4, 4).unwrap().is_empty());
        let mp = trace(&grid(&["#"]), 0.0, false).unwrap();
        assert!(fill(&mp, 0, 0).unwrap().is_degenerate());
    }
}
