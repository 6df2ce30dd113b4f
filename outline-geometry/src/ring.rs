//! Rings, multipolygons and their parent/hole forest
//!
//! Rings live in an arena (`Mpoly::rings`) and refer to their enclosing ring
//! by index. A ring's `parent` is the innermost ring that encloses it, which
//! is always of the opposite kind: holes sit in exterior rings, islands sit
//! in holes. Top-level rings are exterior rings without a parent.

use outline_common::{Error, Result};
use serde::Serialize;

/// A vertex. The coordinate space is a property of the owning [`Mpoly`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dist(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

/// Index of a ring inside its [`Mpoly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RingId(pub usize);

/// Coordinate space of every vertex of an [`Mpoly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CoordSpace {
    /// Pixel grid coordinates, x right, y down, pixel `(x, y)` spans
    /// `[x, x+1] x [y, y+1]`
    #[default]
    Pixel,
    /// Easting/northing after the affine geotransform
    Projected,
    /// Longitude/latitude
    Geographic,
}

impl CoordSpace {
    pub fn name(self) -> &'static str {
        match self {
            CoordSpace::Pixel => "pixel",
            CoordSpace::Projected => "projected",
            CoordSpace::Geographic => "geographic",
        }
    }
}

/// Closed ring. The closing edge from the last point back to the first is
/// implicit; the first point is never repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ring {
    pub pts: Vec<Point>,
    pub is_hole: bool,
    pub parent: Option<RingId>,
}

impl Ring {
    pub fn new(pts: Vec<Point>, is_hole: bool, parent: Option<RingId>) -> Self {
        Self {
            pts,
            is_hole,
            parent,
        }
    }

    pub fn len(&self) -> usize {
        self.pts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pts.is_empty()
    }

    /// Shoelace area. Positive for exterior rings, negative for holes.
    pub fn signed_area(&self) -> f64 {
        signed_area(&self.pts)
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Edges `(pts[i], pts[i+1])`, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.pts.len();
        (0..n).map(move |i| (self.pts[i], self.pts[(i + 1) % n]))
    }

    /// Even-odd containment. Points exactly on the boundary are undefined.
    pub fn contains_point(&self, p: Point) -> bool {
        point_in_ring(&self.pts, p)
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bbox(&self) -> Option<(Point, Point)> {
        let first = *self.pts.first()?;
        Some(self.pts.iter().fold((first, first), |(lo, hi), p| {
            (
                Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        }))
    }
}

pub(crate) fn point_in_ring(pts: &[Point], p: Point) -> bool {
    let n = pts.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (pts[i], pts[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

pub(crate) fn signed_area(pts: &[Point]) -> f64 {
    let n = pts.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// An exterior ring with the holes directly inside it.
#[derive(Debug, Clone)]
pub struct PolygonRef<'a> {
    pub id: RingId,
    pub exterior: &'a Ring,
    pub holes: Vec<&'a Ring>,
}

/// Ring and vertex counts, for reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MpolySummary {
    pub outer: usize,
    pub holes: usize,
    pub points: usize,
}

/// One feature's geometry: an arena of rings forming a parent forest.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mpoly {
    rings: Vec<Ring>,
    space: CoordSpace,
}

impl Mpoly {
    /// Empty pixel-space multipolygon.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel-space multipolygon from rings whose parents are indices into
    /// `rings`. The forest is validated.
    pub fn from_rings(rings: Vec<Ring>) -> Result<Self> {
        let mp = Self {
            rings,
            space: CoordSpace::Pixel,
        };
        mp.validate_forest()?;
        Ok(mp)
    }

    /// Replace the ring list, keeping the coordinate space. Stages that keep
    /// ring membership and parents intact use this.
    pub(crate) fn with_rings(&self, rings: Vec<Ring>) -> Mpoly {
        Mpoly {
            rings,
            space: self.space,
        }
    }

    pub(crate) fn with_space(rings: Vec<Ring>, space: CoordSpace) -> Mpoly {
        Mpoly { rings, space }
    }

    /// Rebuild every ring's point list with `f`. A ring for which `f`
    /// returns `None` is dropped together with everything nested inside it;
    /// surviving rings keep their order and get remapped parent ids.
    pub(crate) fn filter_map_rings(&self, mut f: impl FnMut(&Ring) -> Option<Vec<Point>>) -> Mpoly {
        let mapped: Vec<Option<Vec<Point>>> = self.rings.iter().map(&mut f).collect();
        let alive = |idx: usize| {
            let mut cursor = Some(idx);
            let mut steps = 0;
            while let Some(i) = cursor {
                if mapped[i].is_none() || steps > self.rings.len() {
                    return false;
                }
                steps += 1;
                cursor = self.rings[i].parent.map(|p| p.0);
            }
            true
        };
        let keep: Vec<bool> = (0..self.rings.len()).map(alive).collect();

        let mut new_id = vec![usize::MAX; self.rings.len()];
        let mut next = 0;
        for (idx, &k) in keep.iter().enumerate() {
            if k {
                new_id[idx] = next;
                next += 1;
            }
        }

        let rings = mapped
            .into_iter()
            .zip(&self.rings)
            .enumerate()
            .filter(|(idx, _)| keep[*idx])
            .filter_map(|(_, (pts, ring))| {
                Some(Ring::new(
                    pts?,
                    ring.is_hole,
                    ring.parent.map(|p| RingId(new_id[p.0])),
                ))
            })
            .collect();
        self.with_rings(rings)
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn ring(&self, id: RingId) -> &Ring {
        &self.rings[id.0]
    }

    pub fn into_rings(self) -> Vec<Ring> {
        self.rings
    }

    pub fn space(&self) -> CoordSpace {
        self.space
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn summary(&self) -> MpolySummary {
        let mut s = MpolySummary::default();
        for ring in &self.rings {
            if ring.is_hole {
                s.holes += 1;
            } else {
                s.outer += 1;
            }
            s.points += ring.len();
        }
        s
    }

    /// Sum of signed ring areas (exterior positive, holes negative).
    pub fn signed_area(&self) -> f64 {
        self.rings.iter().map(Ring::signed_area).sum()
    }

    /// Check that parent links form a forest of alternating ring kinds in
    /// which every parent is strictly larger than its children.
    pub fn validate_forest(&self) -> Result<()> {
        let n = self.rings.len();
        for (idx, ring) in self.rings.iter().enumerate() {
            match ring.parent {
                None if ring.is_hole => {
                    return Err(Error::topology(format!("hole {idx} has no parent")));
                }
                None => {}
                Some(RingId(p)) => {
                    if p >= n || p == idx {
                        return Err(Error::topology(format!(
                            "ring {idx} has invalid parent {p}"
                        )));
                    }
                    let parent = &self.rings[p];
                    if parent.is_hole == ring.is_hole {
                        return Err(Error::topology(format!(
                            "ring {idx} and its parent {p} are of the same kind"
                        )));
                    }
                    if parent.area() <= ring.area() {
                        return Err(Error::topology(format!(
                            "ring {idx} is not smaller than its parent {p}"
                        )));
                    }
                }
            }
        }
        // parents are strictly larger unless areas are NaN
        for idx in 0..n {
            let mut cursor = self.rings[idx].parent;
            let mut steps = 0;
            while let Some(RingId(p)) = cursor {
                steps += 1;
                if steps > n {
                    return Err(Error::topology(format!(
                        "parent chain of ring {idx} does not terminate"
                    )));
                }
                cursor = self.rings[p].parent;
            }
        }
        Ok(())
    }

    /// Exterior rings with their direct holes, in ring order.
    pub fn polygons(&self) -> Vec<PolygonRef<'_>> {
        let mut holes_of: Vec<Vec<&Ring>> = vec![Vec::new(); self.rings.len()];
        for ring in &self.rings {
            if let (true, Some(RingId(p))) = (ring.is_hole, ring.parent) {
                holes_of[p].push(ring);
            }
        }
        self.rings
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_hole)
            .map(|(idx, exterior)| PolygonRef {
                id: RingId(idx),
                exterior,
                holes: std::mem::take(&mut holes_of[idx]),
            })
            .collect()
    }

    /// One multipolygon per exterior ring, each holding that ring (as ring 0)
    /// and its direct holes.
    pub fn split_polygons(&self) -> Vec<Mpoly> {
        self.polygons()
            .into_iter()
            .map(|poly| {
                let mut rings = Vec::with_capacity(1 + poly.holes.len());
                rings.push(Ring::new(poly.exterior.pts.clone(), false, None));
                rings.extend(
                    poly.holes
                        .iter()
                        .map(|h| Ring::new(h.pts.clone(), true, Some(RingId(0)))),
                );
                Mpoly::with_space(rings, self.space)
            })
            .collect()
    }

    /// Keep only the ring with the largest area. The largest ring of a
    /// traced mask is always top level; anything else is a tracer bug.
    pub fn major_ring(self) -> Result<Mpoly> {
        if self.rings.len() <= 1 {
            return Ok(self);
        }
        let mut best_idx = 0;
        let mut best_area = 0.0;
        for (idx, ring) in self.rings.iter().enumerate() {
            let area = ring.area();
            if area > best_area {
                best_area = area;
                best_idx = idx;
            }
        }
        tracing::debug!(
            ring = best_idx,
            points = self.rings[best_idx].len(),
            area = best_area,
            "selected major ring"
        );
        if self.rings[best_idx].parent.is_some() {
            return Err(Error::topology("largest ring should not have a parent"));
        }
        let space = self.space;
        let ring = self.rings.into_iter().nth(best_idx);
        Ok(Mpoly::with_space(ring.into_iter().collect(), space))
    }

    /// Convert to a `geo` multipolygon (one polygon per exterior ring).
    pub fn to_geo(&self) -> geo::MultiPolygon<f64> {
        let to_ls = |ring: &Ring| {
            geo::LineString::from(
                ring.pts
                    .iter()
                    .map(|p| geo::Coord { x: p.x, y: p.y })
                    .collect::<Vec<_>>(),
            )
        };
        geo::MultiPolygon::new(
            self.polygons()
                .into_iter()
                .map(|poly| {
                    geo::Polygon::new(
                        to_ls(poly.exterior),
                        poly.holes.iter().map(|&h| to_ls(h)).collect(),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, s: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + s, y),
            Point::new(x + s, y + s),
            Point::new(x, y + s),
        ]
    }

    fn reversed(mut pts: Vec<Point>) -> Vec<Point> {
        pts.reverse();
        pts
    }

    #[test]
    fn test_signed_area_orientation() {
        let ring = Ring::new(square(0.0, 0.0, 3.0), false, None);
        assert_eq!(ring.signed_area(), 9.0);
        let hole = Ring::new(reversed(square(1.0, 1.0, 1.0)), true, Some(RingId(0)));
        assert_eq!(hole.signed_area(), -1.0);
    }

    #[test]
    fn test_contains_point() {
        let ring = Ring::new(square(0.0, 0.0, 2.0), false, None);
        assert!(ring.contains_point(Point::new(0.5, 1.5)));
        assert!(!ring.contains_point(Point::new(2.5, 0.5)));
    }

    #[test]
    fn test_validate_forest_rejects_bad_parents() {
        let outer = Ring::new(square(0.0, 0.0, 3.0), false, None);
        let hole = Ring::new(reversed(square(1.0, 1.0, 1.0)), true, Some(RingId(0)));
        assert!(Mpoly::from_rings(vec![outer.clone(), hole.clone()]).is_ok());

        let orphan = Ring::new(hole.pts.clone(), true, None);
        assert!(Mpoly::from_rings(vec![outer.clone(), orphan]).is_err());

        let dangling = Ring::new(hole.pts.clone(), true, Some(RingId(7)));
        assert!(Mpoly::from_rings(vec![outer.clone(), dangling]).is_err());

        let big_hole = Ring::new(reversed(square(-1.0, -1.0, 5.0)), true, Some(RingId(0)));
        let err = Mpoly::from_rings(vec![outer, big_hole]).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_split_and_polygons() {
        let rings = vec![
            Ring::new(square(0.0, 0.0, 4.0), false, None),
            Ring::new(reversed(square(1.0, 1.0, 2.0)), true, Some(RingId(0))),
            Ring::new(square(10.0, 0.0, 1.0), false, None),
        ];
        let mp = Mpoly::from_rings(rings).unwrap();
        let polys = mp.polygons();
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[0].holes.len(), 1);
        assert!(polys[1].holes.is_empty());

        let split = mp.split_polygons();
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].len(), 2);
        assert_eq!(split[0].rings()[1].parent, Some(RingId(0)));
        assert!(split[0].validate_forest().is_ok());
    }

    #[test]
    fn test_major_ring() {
        let rings = vec![
            Ring::new(square(10.0, 0.0, 1.0), false, None),
            Ring::new(square(0.0, 0.0, 4.0), false, None),
            Ring::new(reversed(square(1.0, 1.0, 2.0)), true, Some(RingId(1))),
        ];
        let mp = Mpoly::from_rings(rings).unwrap().major_ring().unwrap();
        assert_eq!(mp.len(), 1);
        assert_eq!(mp.rings()[0].area(), 16.0);
        assert_eq!(mp.rings()[0].parent, None);
    }

    #[test]
    fn test_to_geo() {
        use geo::Area;
        let rings = vec![
            Ring::new(square(0.0, 0.0, 4.0), false, None),
            Ring::new(reversed(square(1.0, 1.0, 2.0)), true, Some(RingId(0))),
        ];
        let mp = Mpoly::from_rings(rings).unwrap();
        let g = mp.to_geo();
        assert_eq!(g.0.len(), 1);
        assert_eq!(g.0[0].interiors().len(), 1);
        assert!((g.unsigned_area() - 12.0).abs() < 1e-9);
    }
}
