//! Douglas-Peucker point reduction for closed rings
//!
//! A ring is split at two anchors, its first vertex and the vertex farthest
//! from it, and each half is reduced independently. Inside a half the point
//! farthest from the current chord is kept when it is more than `tolerance`
//! away, otherwise the whole span collapses onto the chord. Ties keep the
//! earliest point.
//!
//! Rings are reduced independently, so a chord can cut through a
//! neighbouring ring or swallow it. After each pass every chord that
//! crosses or touches other edges, that turns a shared vertex into a
//! crossing, or whose skipped region holds another vertex, gets its
//! farthest skipped point back, until no such chord is left. Passes repeat
//! until the result no longer changes, which makes the reduction
//! idempotent.

use outline_common::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ring::{Mpoly, Point, Ring};
use crate::topology::{self, Corner, Defect, VertexIndex, VertexRef};

/// Reduce every ring of `mpoly` without changing how rings touch, cross
/// or nest. Rings left with fewer than three points are dropped together
/// with the rings nested inside them.
///
/// `tolerance == 0` returns the input unchanged.
pub fn reduce(mpoly: &Mpoly, tolerance: f64) -> Result<Mpoly> {
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(Error::invalid_parameter(format!(
            "reduction tolerance must be >= 0, got {tolerance}"
        )));
    }
    if tolerance == 0.0 {
        return Ok(mpoly.clone());
    }

    let before = mpoly.summary();
    let mut reduced = reduce_pass(mpoly, tolerance);
    let mut passes = 1;
    loop {
        let again = reduce_pass(&reduced, tolerance);
        if again == reduced {
            break;
        }
        reduced = again;
        passes += 1;
    }
    let after = reduced.summary();
    tracing::debug!(
        tolerance,
        passes,
        rings_before = mpoly.len(),
        rings_after = reduced.len(),
        points_before = before.points,
        points_after = after.points,
        "reduced point set"
    );
    Ok(reduced)
}

/// Douglas-Peucker over every ring, then chords re-split until none of
/// them changes the topology of `mpoly`.
fn reduce_pass(mpoly: &Mpoly, tolerance: f64) -> Mpoly {
    let mut keep: Vec<Vec<bool>> = mpoly
        .rings()
        .iter()
        .map(|ring| kept_vertices(&ring.pts, tolerance))
        .collect();
    let mut restored = 0usize;
    loop {
        let draft = Draft::new(mpoly, &keep);
        let splits = draft.bad_chords();
        if splits.is_empty() {
            break;
        }
        for &(ring, index) in &splits {
            keep[ring][index] = true;
        }
        restored += splits.len();
    }
    if restored > 0 {
        tracing::trace!(restored, "kept vertices to preserve topology");
    }

    let mut masks = keep.into_iter();
    mpoly.filter_map_rings(|ring| {
        let mask = masks.next()?;
        let pts: Vec<Point> = ring
            .pts
            .iter()
            .zip(mask)
            .filter_map(|(p, k)| k.then_some(*p))
            .collect();
        (pts.len() >= 3).then_some(pts)
    })
}

/// The reduced rings of one pass. Rings that will be dropped are left
/// empty, so ring ids are those of the input.
struct Draft<'a> {
    input: &'a Mpoly,
    reduced: Mpoly,
    /// Input index of every reduced vertex
    origin: Vec<Vec<usize>>,
}

impl<'a> Draft<'a> {
    fn new(input: &'a Mpoly, keep: &[Vec<bool>]) -> Self {
        let rings = input.rings();
        let kept: Vec<usize> = keep
            .iter()
            .map(|mask| mask.iter().filter(|&&k| k).count())
            .collect();
        let alive = |r: usize| {
            let mut cursor = Some(r);
            let mut steps = 0;
            while let Some(i) = cursor {
                if kept[i] < 3 || steps > rings.len() {
                    return false;
                }
                steps += 1;
                cursor = rings[i].parent.map(|p| p.0);
            }
            true
        };

        let mut origin = Vec::with_capacity(rings.len());
        let reduced = rings
            .iter()
            .enumerate()
            .map(|(r, ring)| {
                let idx: Vec<usize> = if alive(r) {
                    (0..ring.len()).filter(|&i| keep[r][i]).collect()
                } else {
                    Vec::new()
                };
                let pts = idx.iter().map(|&i| ring.pts[i]).collect();
                origin.push(idx);
                Ring::new(pts, ring.is_hole, ring.parent)
            })
            .collect();
        Self {
            input,
            reduced: input.with_rings(reduced),
            origin,
        }
    }

    /// Input vertices from the start of reduced edge `e` to its end.
    fn span(&self, e: VertexRef) -> Vec<Point> {
        let pts = &self.input.ring(e.ring).pts;
        let n = pts.len();
        let (lo, gap) = self.gap(e);
        (0..=gap).map(|s| pts[(lo + s) % n]).collect()
    }

    fn gap(&self, e: VertexRef) -> (usize, usize) {
        let n = self.input.ring(e.ring).len();
        let origin = &self.origin[e.ring.0];
        let lo = origin[e.index];
        let hi = origin[(e.index + 1) % origin.len()];
        (lo, (hi + n - lo) % n)
    }

    /// The skipped input vertex farthest from edge `e`, if it skips any.
    fn split_point(&self, e: VertexRef) -> Option<usize> {
        let (lo, gap) = self.gap(e);
        if gap < 2 {
            return None;
        }
        let pts = &self.input.ring(e.ring).pts;
        let n = pts.len();
        let (a, b) = (pts[lo], pts[(lo + gap) % n]);
        let mut best = (lo + 1) % n;
        let mut best_dist = perpendicular_distance(pts[best], a, b);
        for s in 2..gap {
            let i = (lo + s) % n;
            let dist = perpendicular_distance(pts[i], a, b);
            if dist > best_dist {
                best = i;
                best_dist = dist;
            }
        }
        Some(best)
    }

    /// `(ring, input vertex)` to keep for every chord that changes the
    /// topology.
    fn bad_chords(&self) -> Vec<(usize, usize)> {
        let reduced = &self.reduced;
        let mut bad: FxHashSet<VertexRef> = FxHashSet::default();
        let mut contacts: FxHashMap<(u64, u64), Vec<VertexRef>> = FxHashMap::default();
        for defect in topology::find_defects(reduced) {
            match defect {
                Defect::Crossing { a, b, .. } => bad.extend([a, b]),
                Defect::Touch { edge, .. } => {
                    bad.insert(edge);
                }
                Defect::SharedVertex { a, b, at } => {
                    let group = contacts.entry(topology::location_key(at)).or_default();
                    for v in [a, b] {
                        if !group.contains(&v) {
                            group.push(v);
                        }
                    }
                }
            }
        }

        // boundaries meeting at a kept vertex must not pass through each other
        for group in contacts.values() {
            let corners: Vec<Corner> = group
                .iter()
                .map(|&v| Corner::at_vertex(reduced, v))
                .collect();
            for (k, &v) in group.iter().enumerate() {
                let others: Vec<Corner> = corners
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != k)
                    .map(|(_, &c)| c)
                    .collect();
                if corners[k].conflicts(&others) {
                    let m = reduced.ring(v.ring).len();
                    bad.insert(VertexRef {
                        ring: v.ring,
                        index: (v.index + m - 1) % m,
                    });
                    bad.insert(v);
                }
            }
        }

        let index = VertexIndex::new(reduced);
        for (r, ring) in reduced.rings().iter().enumerate() {
            for k in 0..ring.len() {
                let e = VertexRef::new(r, k);
                if self.gap(e).1 < 2 || bad.contains(&e) {
                    continue;
                }
                let region = self.span(e);
                let ends = [region[0], region[region.len() - 1]];
                if index.any_within(&region, None, &ends) {
                    bad.insert(e);
                }
            }
        }

        let mut splits: Vec<(usize, usize)> = bad
            .into_iter()
            .filter_map(|e| self.split_point(e).map(|i| (e.ring.0, i)))
            .collect();
        splits.sort_unstable();
        splits.dedup();
        splits
    }
}

/// Douglas-Peucker over a closed ring (no repeated closing point).
pub fn reduce_ring(pts: &[Point], tolerance: f64) -> Vec<Point> {
    pts.iter()
        .zip(kept_vertices(pts, tolerance))
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Which vertices of `pts` survive [`reduce_ring`].
pub fn kept_vertices(pts: &[Point], tolerance: f64) -> Vec<bool> {
    let n = pts.len();
    if n < 3 {
        return vec![true; n];
    }

    let origin = pts[0];
    let mut far = 1;
    for i in 2..n {
        if pts[i].dist(origin) > pts[far].dist(origin) {
            far = i;
        }
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[far] = true;

    // Index `n` stands for the first point again, closing the ring.
    let at = |i: usize| pts[i % n];
    let mut stack = vec![(0usize, far), (far, n)];
    while let Some((lo, hi)) = stack.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let (a, b) = (at(lo), at(hi));
        let mut max_dist = 0.0;
        let mut max_idx = lo;
        for i in lo + 1..hi {
            let dist = perpendicular_distance(at(i), a, b);
            if dist > max_dist {
                max_dist = dist;
                max_idx = i;
            }
        }
        if max_dist > tolerance {
            keep[max_idx % n] = true;
            stack.push((max_idx, hi));
            stack.push((lo, max_idx));
        }
    }
    keep
}

/// Distance from a point to the segment `line_start..line_end`.
pub fn perpendicular_distance(point: Point, line_start: Point, line_end: Point) -> f64 {
    let dx = line_end.x - line_start.x;
    let dy = line_end.y - line_start.y;

    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return point.dist(line_start);
    }

    let t = ((point.x - line_start.x) * dx + (point.y - line_start.y) * dy) / len_sq;
    let t = t.clamp(0.0, 1.0);

    point.dist(Point::new(line_start.x + t * dx, line_start.y + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::RingId;
    use crate::topology::find_defects;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
        coords.iter().map(|&c| Point::from(c)).collect()
    }

    /// A 10x10 square with a one pixel staircase on its top edge.
    fn bumpy_square() -> Vec<Point> {
        pts(&[
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 1.0),
            (6.0, 1.0),
            (6.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ])
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let mp = Mpoly::from_rings(vec![Ring::new(bumpy_square(), false, None)]).unwrap();
        assert_eq!(reduce(&mp, 0.0).unwrap(), mp);
        assert!(reduce(&mp, -1.0).is_err());
    }

    #[test]
    fn test_bump_removed_within_tolerance() {
        let reduced = reduce_ring(&bumpy_square(), 1.5);
        assert_eq!(
            reduced,
            pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)])
        );
        let kept = reduce_ring(&bumpy_square(), 0.5);
        assert_eq!(kept, bumpy_square());
    }

    #[test]
    fn test_removed_points_within_tolerance_of_chord() {
        let staircase: Vec<Point> = (0..20)
            .flat_map(|i| {
                let i = i as f64;
                [Point::new(i, i), Point::new(i + 1.0, i)]
            })
            .chain([Point::new(20.0, 30.0), Point::new(0.0, 30.0)])
            .collect();
        let tol = 1.0;
        let reduced = reduce_ring(&staircase, tol);
        assert!(reduced.len() < staircase.len());

        // every dropped point lies within tol of the retained edge spanning it
        let keep = kept_vertices(&staircase, tol);
        let kept_idx: Vec<usize> = (0..staircase.len()).filter(|&i| keep[i]).collect();
        for w in 0..kept_idx.len() {
            let lo = kept_idx[w];
            let hi = kept_idx.get(w + 1).copied().unwrap_or(staircase.len());
            for i in lo + 1..hi {
                let d = perpendicular_distance(
                    staircase[i],
                    staircase[lo],
                    staircase[hi % staircase.len()],
                );
                assert!(d <= tol, "point {i} is {d} away from its chord");
            }
        }

        assert_eq!(reduce_ring(&reduced, tol), reduced);
    }

    #[test]
    fn test_degenerate_ring_dropped_with_holes() {
        let sliver = Ring::new(
            pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 1.0), (0.0, 1.0)]),
            false,
            None,
        );
        let square = Ring::new(
            pts(&[(20.0, 0.0), (30.0, 0.0), (30.0, 10.0), (20.0, 10.0)]),
            false,
            None,
        );
        let hole = Ring::new(
            pts(&[(22.0, 2.0), (22.0, 8.0), (28.0, 8.0), (28.0, 2.0)]),
            true,
            Some(RingId(1)),
        );
        let mp = Mpoly::from_rings(vec![sliver, square, hole]).unwrap();
        let reduced = reduce(&mp, 2.0).unwrap();
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced.rings()[1].parent, Some(RingId(0)));
        assert!(reduced.validate_forest().is_ok());
    }

    #[test]
    fn test_chords_keep_clear_of_neighbours() {
        // the notch in the square's top edge holds the tooth of the ring
        // above it; the notch is shallower than the tolerance, the tooth
        // is not
        let square = Ring::new(bumpy_square(), false, None);
        let comb = Ring::new(
            pts(&[
                (3.0, -5.0),
                (7.0, -5.0),
                (7.0, -1.0),
                (5.5, -1.0),
                (5.5, 0.5),
                (4.5, 0.5),
                (4.5, -1.0),
                (3.0, -1.0),
            ]),
            false,
            None,
        );
        let mp = Mpoly::from_rings(vec![square, comb]).unwrap();
        assert!(find_defects(&mp).is_empty());

        let independent = mp.filter_map_rings(|ring| Some(reduce_ring(&ring.pts, 1.2)));
        assert!(!find_defects(&independent).is_empty());

        let reduced = reduce(&mp, 1.2).unwrap();
        assert_eq!(reduced.len(), 2);
        assert!(find_defects(&reduced).is_empty(), "{:?}", find_defects(&reduced));
        assert!(reduced.rings()[0].len() < mp.rings()[0].len());
        assert!(reduced.rings()[0].pts.contains(&Point::new(4.0, 1.0)));
        assert_eq!(reduce(&reduced, 1.2).unwrap(), reduced);
    }
}
