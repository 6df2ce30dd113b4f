//! Excursion pinching
//!
//! Lossy compressed rasters leave narrow spikes and notches ("mouse bites")
//! along region boundaries once thresholded. An excursion is a short run of
//! ring vertices that leaves a point, goes some distance away and comes
//! back close to where it started. The run is replaced by the chord between
//! its two ends.
//!
//! The thresholds are heuristic, in pixel units, and pinned by the fixtures
//! in the tests below.
//!
//! A run is only collapsed when the region between it and its chord holds
//! no vertex of any other ring and none of the ring's own vertices outside
//! the run, so nesting and contacts survive.

use serde::{Deserialize, Serialize};

use crate::ring::{signed_area, Mpoly, Point, Ring};
use crate::topology::{region_covers, VertexIndex};

/// What counts as an excursion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinchParams {
    /// Largest distance between the two ends of the run
    pub max_neck: f64,
    /// Smallest distance the run must reach away from its start
    pub min_depth: f64,
    /// Largest number of vertices strictly inside the run
    pub max_run: usize,
    /// Largest unsigned area enclosed by the run and its chord
    pub max_area: f64,
}

impl Default for PinchParams {
    fn default() -> Self {
        Self {
            max_neck: 1.5,
            min_depth: 2.0,
            max_run: 24,
            max_area: 16.0,
        }
    }
}

/// Pinch excursions with the default thresholds.
pub fn pinch(mpoly: &Mpoly) -> Mpoly {
    pinch_with(mpoly, &PinchParams::default())
}

/// Pinch excursions of every ring. Ring kinds and parents are untouched;
/// rings without excursions come back point for point identical.
pub fn pinch_with(mpoly: &Mpoly, params: &PinchParams) -> Mpoly {
    let index = VertexIndex::new(mpoly);
    let mut pinched = 0usize;
    let rings = mpoly
        .rings()
        .iter()
        .enumerate()
        .map(|(r, ring)| {
            let scope = Scope {
                params,
                index: &index,
                ring: r,
            };
            let (pts, count) = pinch_ring(&ring.pts, &scope);
            let flipped = (signed_area(&pts) < 0.0) != (ring.signed_area() < 0.0);
            if count == 0 || pts.len() < 3 || flipped {
                return ring.clone();
            }
            pinched += count;
            Ring::new(pts, ring.is_hole, ring.parent)
        })
        .collect();
    tracing::debug!(excursions = pinched, "pinched excursions");
    mpoly.with_rings(rings)
}

/// Thresholds plus the geometry a ring must not swallow.
struct Scope<'a> {
    params: &'a PinchParams,
    index: &'a VertexIndex,
    ring: usize,
}

impl Scope<'_> {
    /// The area between `pts[i..=j]` and its chord holds a vertex of another
    /// ring, or one of this ring's vertices outside the run.
    fn encloses_other(&self, pts: &[Point], i: usize, j: usize) -> bool {
        let run = &pts[i..=j];
        self.index.any_within(run, Some(self.ring), &[])
            || pts[..i]
                .iter()
                .chain(&pts[j + 1..])
                .any(|&q| region_covers(run, q))
    }
}

/// Two greedy scans, the second over the ring rotated by half its length
/// so that runs wrapping past the first vertex are found too. Returns the
/// new points and the number of runs removed.
fn pinch_ring(pts: &[Point], scope: &Scope<'_>) -> (Vec<Point>, usize) {
    let (mut out, mut count) = scan(pts, scope);
    let half = out.len() / 2;
    out.rotate_left(half);
    let (mut again, more) = scan(&out, scope);
    if more > 0 {
        if let Some(pos) = again.iter().position(|p| Some(p) == pts.first()) {
            again.rotate_left(pos);
        }
        out = again;
        count += more;
    } else {
        out.rotate_right(half);
    }

    if count > 0 {
        out.dedup();
        while out.len() > 1 && out.first() == out.last() {
            out.pop();
        }
    }
    (out, count)
}

/// From each kept vertex, collapse the longest qualifying run starting there.
fn scan(pts: &[Point], scope: &Scope<'_>) -> (Vec<Point>, usize) {
    let n = pts.len();
    let mut out = Vec::with_capacity(n);
    let mut count = 0;
    let mut i = 0;
    while i < n {
        out.push(pts[i]);
        match excursion_end(pts, i, scope) {
            Some(j) => {
                count += 1;
                i = j;
            }
            None => i += 1,
        }
    }
    (out, count)
}

fn excursion_end(pts: &[Point], i: usize, scope: &Scope<'_>) -> Option<usize> {
    let params = scope.params;
    let start = pts[i];
    let last = (i + params.max_run + 1).min(pts.len() - 1);
    (i + 2..=last).rev().find(|&j| {
        if start.dist(pts[j]) > params.max_neck {
            return false;
        }
        let depth = pts[i + 1..j]
            .iter()
            .map(|p| p.dist(start))
            .fold(0.0, f64::max);
        depth >= params.min_depth
            && signed_area(&pts[i..=j]).abs() <= params.max_area
            && !scope.encloses_other(pts, i, j)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitgrid::BitGrid;
    use crate::rasterize::fill;
    use crate::ring::RingId;
    use crate::tracer::trace;

    fn ring(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&c| Point::from(c)).collect()
    }

    fn single(coords: &[(f64, f64)]) -> Mpoly {
        Mpoly::from_rings(vec![Ring::new(ring(coords), false, None)]).unwrap()
    }

    #[test]
    fn test_spike_collapsed_to_chord() {
        let mp = single(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, -3.0),
            (5.0, -3.0),
            (5.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        let out = pinch(&mp);
        assert_eq!(
            out.rings()[0].pts,
            ring(&[
                (0.0, 0.0),
                (4.0, 0.0),
                (5.0, 0.0),
                (10.0, 0.0),
                (10.0, 10.0),
                (0.0, 10.0)
            ])
        );
        assert_eq!(out.signed_area(), 100.0);
    }

    #[test]
    fn test_notch_filled() {
        let mp = single(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 2.0),
            (5.0, 2.0),
            (5.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        let out = pinch(&mp);
        assert_eq!(out.rings()[0].len(), 6);
        assert_eq!(out.signed_area(), 100.0);
    }

    #[test]
    fn test_wide_or_shallow_runs_untouched() {
        let wide = single(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, -3.0),
            (7.0, -3.0),
            (7.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        assert_eq!(pinch(&wide), wide);

        let shallow = single(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, -1.0),
            (5.0, -1.0),
            (5.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        assert_eq!(pinch(&shallow), shallow);
    }

    #[test]
    fn test_traced_spike_and_hole_kept() {
        let mask = BitGrid::from_rows(&[
            "..#.....",
            "..#.....",
            "..#.....",
            "########",
            "########",
            "###..###",
            "###..###",
            "########",
        ])
        .unwrap();
        let mp = trace(&mask, 0.0, false).unwrap();
        assert_eq!(mp.summary().holes, 1);

        let out = pinch(&mp);
        assert_eq!(out.len(), mp.len());
        for (before, after) in mp.rings().iter().zip(out.rings()) {
            assert_eq!(before.is_hole, after.is_hole);
            assert_eq!(before.parent, after.parent);
        }
        let hole = out.rings().iter().position(|r| r.is_hole).unwrap();
        assert_eq!(out.rings()[hole], mp.rings()[hole]);
        assert_eq!(out.rings()[hole].parent, Some(RingId(0)));

        // the 1x3 spike is gone: 8x5 block minus the 2x2 hole
        assert_eq!(out.signed_area(), 36.0);
    }

    #[test]
    fn test_custom_params() {
        let mp = single(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, -3.0),
            (7.0, -3.0),
            (7.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]);
        let params = PinchParams {
            max_neck: 3.0,
            ..PinchParams::default()
        };
        assert_eq!(pinch_with(&mp, &params).rings()[0].len(), 6);
    }

    #[test]
    fn test_notch_holding_an_island_kept() {
        // the cavity opens to the bottom edge through a one pixel mouth
        let rows = [
            "#########",
            "#########",
            "###...###",
            "###.#.###",
            "###...###",
            "####.####",
        ];
        let mask = BitGrid::from_rows(&rows).unwrap();
        let mp = trace(&mask, 0.0, false).unwrap();
        assert_eq!(mp.len(), 2);

        let out = pinch(&mp);
        assert_eq!(out, mp);
        assert_eq!(fill(&out, 9, 6).unwrap(), mask);
        assert!(fill(&out, 9, 6).unwrap().get(4, 3).unwrap());
    }

    #[test]
    fn test_island_clear_of_the_run_does_not_block() {
        let mp = Mpoly::from_rings(vec![
            Ring::new(
                ring(&[
                    (0.0, 0.0),
                    (4.0, 0.0),
                    (4.0, 4.0),
                    (5.0, 4.0),
                    (5.0, 0.0),
                    (10.0, 0.0),
                    (10.0, 10.0),
                    (0.0, 10.0),
                ]),
                false,
                None,
            ),
            Ring::new(
                ring(&[(4.0, -3.0), (5.0, -3.0), (5.0, -2.0), (4.0, -2.0)]),
                false,
                None,
            ),
        ])
        .unwrap();
        let out = pinch(&mp);
        assert_eq!(out.rings()[0].len(), 6);
        assert_eq!(out.rings()[1], mp.rings()[1]);
    }
}
