//! Validity checks for ring sets
//!
//! Finds the places where an Mpoly is not a valid simple-features geometry:
//! two vertices at the same location, a vertex lying on another edge, and
//! two edges crossing each other. Candidate edge pairs come from an R-tree
//! over edge bounding boxes.
//!
//! The repair stages also ask two local questions here: does a region
//! about to be cut off or filled in hold any other vertex, and can the
//! boundaries meeting at a point be pulled apart by cutting a corner.

use std::cmp::Ordering;

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use rustc_hash::FxHashMap;

use crate::ring::{point_in_ring, Mpoly, Point, RingId};

/// Vertex `index` of ring `ring`. Edge `index` runs from that vertex to the
/// next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexRef {
    pub ring: RingId,
    pub index: usize,
}

impl VertexRef {
    pub const fn new(ring: usize, index: usize) -> Self {
        Self {
            ring: RingId(ring),
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Defect {
    /// Two non-consecutive vertices at the same location
    SharedVertex { a: VertexRef, b: VertexRef, at: Point },
    /// A vertex lying inside another edge
    Touch {
        vertex: VertexRef,
        edge: VertexRef,
        at: Point,
    },
    /// Two edges crossing at a point interior to both
    Crossing { a: VertexRef, b: VertexRef, at: Point },
}

impl Defect {
    pub fn location(&self) -> Point {
        match *self {
            Defect::SharedVertex { at, .. }
            | Defect::Touch { at, .. }
            | Defect::Crossing { at, .. } => at,
        }
    }

    /// Every vertex taking part: shared vertices, the touching vertex and
    /// the ends of touched or crossing edges.
    pub fn involved(&self, mpoly: &Mpoly) -> Vec<VertexRef> {
        let end = |e: VertexRef| VertexRef {
            ring: e.ring,
            index: (e.index + 1) % mpoly.ring(e.ring).len(),
        };
        match *self {
            Defect::SharedVertex { a, b, .. } => vec![a, b],
            Defect::Touch { vertex, edge, .. } => vec![vertex, edge, end(edge)],
            Defect::Crossing { a, b, .. } => vec![a, end(a), b, end(b)],
        }
    }
}

/// Summary counts of [`find_defects`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DefectCounts {
    pub shared_vertices: usize,
    pub touches: usize,
    pub crossings: usize,
}

impl DefectCounts {
    pub fn of(defects: &[Defect]) -> Self {
        let mut counts = Self::default();
        for d in defects {
            match d {
                Defect::SharedVertex { .. } => counts.shared_vertices += 1,
                Defect::Touch { .. } => counts.touches += 1,
                Defect::Crossing { .. } => counts.crossings += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.shared_vertices + self.touches + self.crossings
    }
}

type EdgeBox = GeomWithData<Rectangle<[f64; 2]>, VertexRef>;

/// Every self-intersection of `mpoly`, within and across rings.
pub fn find_defects(mpoly: &Mpoly) -> Vec<Defect> {
    let mut defects = shared_vertices(mpoly);

    let edges: Vec<EdgeBox> = mpoly
        .rings()
        .iter()
        .enumerate()
        .flat_map(|(r, ring)| {
            ring.edges().enumerate().map(move |(i, (a, b))| {
                GeomWithData::new(
                    Rectangle::from_corners([a.x, a.y], [b.x, b.y]),
                    VertexRef::new(r, i),
                )
            })
        })
        .collect();
    let tree = RTree::bulk_load(edges);

    let endpoints = |e: VertexRef| {
        let pts = &mpoly.ring(e.ring).pts;
        (pts[e.index], pts[(e.index + 1) % pts.len()])
    };

    for edge in tree.iter() {
        let e = edge.data;
        let (a0, a1) = endpoints(e);
        let envelope = AABB::from_corners([a0.x, a0.y], [a1.x, a1.y]);
        for other in tree.locate_in_envelope_intersecting(&envelope) {
            let f = other.data;
            if f <= e || adjacent(mpoly, e, f) {
                continue;
            }
            let (b0, b1) = endpoints(f);
            classify_pair(e, (a0, a1), f, (b0, b1), &mut defects);
        }
    }
    defects
}

/// No shared vertices, touches or crossings.
pub fn is_simple(mpoly: &Mpoly) -> bool {
    find_defects(mpoly).is_empty()
}

/// Exact hash key of a location.
pub(crate) fn location_key(p: Point) -> (u64, u64) {
    // + 0.0 folds -0.0 into 0.0
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

fn shared_vertices(mpoly: &Mpoly) -> Vec<Defect> {
    let mut at: FxHashMap<(u64, u64), Vec<VertexRef>> = FxHashMap::default();
    for (r, ring) in mpoly.rings().iter().enumerate() {
        for (i, &p) in ring.pts.iter().enumerate() {
            at.entry(location_key(p)).or_default().push(VertexRef::new(r, i));
        }
    }

    let mut defects = Vec::new();
    let mut groups: Vec<Vec<VertexRef>> = at.into_values().filter(|g| g.len() > 1).collect();
    groups.sort_unstable();
    for group in groups {
        for (k, &a) in group.iter().enumerate() {
            for &b in &group[k + 1..] {
                if consecutive(mpoly, a, b) {
                    continue;
                }
                let at = mpoly.ring(a.ring).pts[a.index];
                defects.push(Defect::SharedVertex { a, b, at });
            }
        }
    }
    defects
}

/// Same ring, neighbouring indices (zero-length edges are not defects).
fn consecutive(mpoly: &Mpoly, a: VertexRef, b: VertexRef) -> bool {
    if a.ring != b.ring {
        return false;
    }
    let n = mpoly.ring(a.ring).len();
    (a.index + 1) % n == b.index || (b.index + 1) % n == a.index
}

/// Edges sharing a vertex by construction.
fn adjacent(mpoly: &Mpoly, e: VertexRef, f: VertexRef) -> bool {
    e.ring == f.ring && consecutive(mpoly, e, f)
}

fn classify_pair(
    e: VertexRef,
    (a0, a1): (Point, Point),
    f: VertexRef,
    (b0, b1): (Point, Point),
    out: &mut Vec<Defect>,
) {
    let d0 = orient(a0, a1, b0);
    let d1 = orient(a0, a1, b1);
    let d2 = orient(b0, b1, a0);
    let d3 = orient(b0, b1, a1);

    if d0 * d1 < 0.0 && d2 * d3 < 0.0 {
        let t = d2 / (d2 - d3);
        out.push(Defect::Crossing {
            a: e,
            b: f,
            at: a0.lerp(a1, t),
        });
        return;
    }

    // Only start vertices are checked; every vertex starts some edge and
    // that edge's box meets the touched edge's box.
    for (p, vertex, (q0, q1), edge) in [(b0, f, (a0, a1), e), (a0, e, (b0, b1), f)] {
        if orient(q0, q1, p) == 0.0 && strictly_inside(p, q0, q1) {
            out.push(Defect::Touch { vertex, edge, at: p });
        }
    }
}

/// Whether `q` lies inside the closed ring `region` or on its boundary.
pub(crate) fn region_covers(region: &[Point], q: Point) -> bool {
    let n = region.len();
    let on_boundary = (0..n).any(|i| {
        let (a, b) = (region[i], region[(i + 1) % n]);
        orient(a, b, q) == 0.0 && within_box(q, a, b)
    });
    on_boundary || point_in_ring(region, q)
}

type VertexPoint = GeomWithData<[f64; 2], usize>;

/// Every vertex of a ring set, tagged with its ring, for region queries.
pub(crate) struct VertexIndex {
    tree: RTree<VertexPoint>,
}

impl VertexIndex {
    pub(crate) fn new(mpoly: &Mpoly) -> Self {
        let points = mpoly
            .rings()
            .iter()
            .enumerate()
            .flat_map(|(r, ring)| {
                ring.pts
                    .iter()
                    .map(move |p| GeomWithData::new([p.x, p.y], r))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Is there a vertex in `region` (boundary included) that belongs to a
    /// ring other than `skip` and is not located at one of `except`?
    pub(crate) fn any_within(
        &self,
        region: &[Point],
        skip: Option<usize>,
        except: &[Point],
    ) -> bool {
        let Some(first) = region.first() else {
            return false;
        };
        let (lo, hi) = region.iter().fold((*first, *first), |(lo, hi), p| {
            (
                Point::new(lo.x.min(p.x), lo.y.min(p.y)),
                Point::new(hi.x.max(p.x), hi.y.max(p.y)),
            )
        });
        let envelope = AABB::from_corners([lo.x, lo.y], [hi.x, hi.y]);
        self.tree.locate_in_envelope(&envelope).any(|v| {
            let [x, y] = *v.geom();
            let q = Point::new(x, y);
            Some(v.data) != skip && !except.contains(&q) && region_covers(region, q)
        })
    }
}

/// A boundary passing through a point: the two neighbours it arrives from
/// and leaves to. For a vertex lying inside an edge these are the edge ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Corner {
    pub at: Point,
    pub prev: Point,
    pub next: Point,
}

impl Corner {
    pub(crate) fn at_vertex(mpoly: &Mpoly, v: VertexRef) -> Self {
        let pts = &mpoly.ring(v.ring).pts;
        let n = pts.len();
        Self {
            at: pts[v.index],
            prev: pts[(v.index + n - 1) % n],
            next: pts[(v.index + 1) % n],
        }
    }

    pub(crate) fn inside_edge(mpoly: &Mpoly, edge: VertexRef, at: Point) -> Self {
        let pts = &mpoly.ring(edge.ring).pts;
        Self {
            at,
            prev: pts[edge.index],
            next: pts[(edge.index + 1) % pts.len()],
        }
    }

    fn arms(&self) -> Option<(Vector, Vector)> {
        let u = Vector::between(self.at, self.prev);
        let w = Vector::between(self.at, self.next);
        (!u.is_zero() && !w.is_zero()).then_some((u, w))
    }

    /// Which of the two sides of the corner hold no edge of `others`: the
    /// side swept counter-clockwise from `prev` to `next`, then the other
    /// one. Edges along an arm block both sides.
    fn free_sides(&self, others: &[Corner]) -> Option<(bool, bool)> {
        let (u, w) = self.arms()?;
        let dirs: Vec<Vector> = others
            .iter()
            .filter_map(|c| c.arms())
            .flat_map(|(a, b)| [a, b])
            .collect();
        Some((
            !dirs.iter().any(|&p| on_arc(u, w, p)),
            !dirs.iter().any(|&p| on_arc(w, u, p)),
        ))
    }

    /// Cutting the convex side of this corner stays clear of `others`.
    pub(crate) fn can_cut(&self, others: &[Corner]) -> bool {
        let (Some((u, w)), Some((first, second))) = (self.arms(), self.free_sides(others)) else {
            return false;
        };
        let turn = u.cross(w);
        (turn > 0.0 && first) || (turn < 0.0 && second)
    }

    /// This boundary and one of `others` cross through the point or run
    /// along each other out of it.
    pub(crate) fn conflicts(&self, others: &[Corner]) -> bool {
        self.free_sides(others) == Some((false, false))
    }
}

#[derive(Debug, Clone, Copy)]
struct Vector {
    x: f64,
    y: f64,
}

impl Vector {
    fn between(from: Point, to: Point) -> Self {
        Self {
            x: to.x - from.x,
            y: to.y - from.y,
        }
    }

    fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    fn cross(self, o: Vector) -> f64 {
        self.x * o.y - self.y * o.x
    }

    fn dot(self, o: Vector) -> f64 {
        self.x * o.x + self.y * o.y
    }

    /// 0 for directions in `[0, pi)` counter-clockwise from `base`, 1 for
    /// `[pi, 2pi)`.
    fn half(self, base: Vector) -> u8 {
        let c = base.cross(self);
        if c > 0.0 || (c == 0.0 && base.dot(self) > 0.0) {
            0
        } else {
            1
        }
    }
}

/// `p` lies on the arc swept counter-clockwise from `u` to `w`, ends
/// included. Exact for integer coordinates.
fn on_arc(u: Vector, w: Vector, p: Vector) -> bool {
    match p.half(u).cmp(&w.half(u)) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => p.cross(w) >= 0.0,
    }
}

fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// `p` is on the line through `q0`, `q1`; is it between them, excluding
/// the endpoints?
fn strictly_inside(p: Point, q0: Point, q1: Point) -> bool {
    p != q0 && p != q1 && within_box(p, q0, q1)
}

fn within_box(p: Point, q0: Point, q1: Point) -> bool {
    p.x >= q0.x.min(q1.x) && p.x <= q0.x.max(q1.x) && p.y >= q0.y.min(q1.y) && p.y <= q0.y.max(q1.y)
}
