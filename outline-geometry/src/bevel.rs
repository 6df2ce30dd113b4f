//! Self-intersection repair by chamfering
//!
//! Pixel tracing lets diagonally touching regions meet in a single vertex,
//! which GIS engines reject. A vertex involved in such a contact is cut
//! into two vertices placed on its two adjacent edges, a short distance
//! away from the contact point. Only corners whose cut side holds none of
//! the other boundaries at that point are cut; at a contact between two
//! boundaries at least one of them qualifies.
//!
//! A long chamfer can clip a nearby corner. The result is checked again and
//! chamfers taking part in a new defect are halved, a bounded number of
//! times. Defects that remain after that, such as crossing edges or edges
//! running along each other, fail the run.

use outline_common::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ring::{Mpoly, Point, Ring};
use crate::topology::{self, Corner, Defect, DefectCounts, VertexRef};

/// Displacement cap as a fraction of the shorter adjacent edge. Kept below
/// one half so chamfers of the two ends of an edge never meet.
pub const MAX_BEVEL_FRACTION: f64 = 0.45;

/// Halving rounds for chamfers that clip other geometry
const MAX_SHRINK_ROUNDS: usize = 16;

/// Chamfer every shared or touching vertex of `mpoly`.
///
/// The chamfer points sit `bevel_fraction` times the shorter adjacent edge
/// length away from the vertex, along each adjacent edge. A fraction of zero
/// returns the input unchanged. Fails with [`Error::Topology`] when the
/// result still intersects itself.
pub fn bevel(mpoly: &Mpoly, bevel_fraction: f64) -> Result<Mpoly> {
    if !(0.0..1.0).contains(&bevel_fraction) {
        return Err(Error::invalid_parameter(format!(
            "bevel fraction must be in [0, 1), got {bevel_fraction}"
        )));
    }
    if bevel_fraction == 0.0 || mpoly.is_empty() {
        return Ok(mpoly.clone());
    }

    let defects = topology::find_defects(mpoly);
    if defects.is_empty() {
        return Ok(mpoly.clone());
    }
    let counts = DefectCounts::of(&defects);
    let fraction = bevel_fraction.min(MAX_BEVEL_FRACTION);
    let mut chamfers: FxHashMap<VertexRef, f64> = cuttable_vertices(mpoly, &defects)
        .into_iter()
        .map(|v| (v, fraction))
        .collect();

    let mut round = 0;
    let out = loop {
        let (out, origin) = chamfer(mpoly, &chamfers);
        let introduced: FxHashSet<VertexRef> = topology::find_defects(&out)
            .iter()
            .flat_map(|d| d.involved(&out))
            .map(|v| VertexRef {
                ring: v.ring,
                index: origin[v.ring.0][v.index],
            })
            .filter(|v| chamfers.contains_key(v))
            .collect();
        if introduced.is_empty() || round == MAX_SHRINK_ROUNDS {
            break out;
        }
        for v in &introduced {
            if let Some(f) = chamfers.get_mut(v) {
                *f /= 2.0;
            }
        }
        round += 1;
    };

    tracing::debug!(
        shared = counts.shared_vertices,
        touches = counts.touches,
        crossings = counts.crossings,
        chamfered = chamfers.len(),
        shrink_rounds = round,
        "bevelled self-intersections"
    );

    let left = DefectCounts::of(&topology::find_defects(&out));
    if left.total() > 0 {
        return Err(Error::topology(format!(
            "bevelling left {} shared vertices, {} touches and {} crossings",
            left.shared_vertices, left.touches, left.crossings
        )));
    }
    Ok(out)
}

#[derive(Clone, Copy, PartialEq)]
enum Site {
    Vertex(VertexRef),
    Edge(VertexRef),
}

/// Vertices of shared-vertex and touch contacts whose convex side is clear
/// of every other boundary through the same point.
fn cuttable_vertices(mpoly: &Mpoly, defects: &[Defect]) -> Vec<VertexRef> {
    let mut contacts: FxHashMap<(u64, u64), Vec<(Site, Corner)>> = FxHashMap::default();
    let mut add = |at: Point, site: Site, corner: Corner| {
        let group = contacts.entry(topology::location_key(at)).or_default();
        if !group.iter().any(|(s, _)| *s == site) {
            group.push((site, corner));
        }
    };
    for defect in defects {
        match *defect {
            Defect::SharedVertex { a, b, at } => {
                add(at, Site::Vertex(a), Corner::at_vertex(mpoly, a));
                add(at, Site::Vertex(b), Corner::at_vertex(mpoly, b));
            }
            Defect::Touch { vertex, edge, at } => {
                add(at, Site::Vertex(vertex), Corner::at_vertex(mpoly, vertex));
                add(at, Site::Edge(edge), Corner::inside_edge(mpoly, edge, at));
            }
            Defect::Crossing { .. } => {}
        }
    }

    let mut cut = Vec::new();
    for group in contacts.values() {
        for (k, &(site, corner)) in group.iter().enumerate() {
            let Site::Vertex(v) = site else {
                continue;
            };
            let others: Vec<Corner> = group
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .map(|(_, &(_, c))| c)
                .collect();
            if corner.can_cut(&others) {
                cut.push(v);
            }
        }
    }
    cut
}

/// Apply `chamfers` (vertex -> fraction). Also returns, per ring and output
/// vertex, the input vertex it came from.
fn chamfer(mpoly: &Mpoly, chamfers: &FxHashMap<VertexRef, f64>) -> (Mpoly, Vec<Vec<usize>>) {
    let mut origins = Vec::with_capacity(mpoly.len());
    let rings = mpoly
        .rings()
        .iter()
        .enumerate()
        .map(|(r, ring)| {
            let n = ring.pts.len();
            let mut pts = Vec::with_capacity(n + 4);
            let mut origin = Vec::with_capacity(n + 4);
            for (i, &v) in ring.pts.iter().enumerate() {
                let cut = chamfers
                    .get(&VertexRef::new(r, i))
                    .and_then(|&f| cut_corner(ring.pts[(i + n - 1) % n], v, ring.pts[(i + 1) % n], f));
                match cut {
                    Some((a, b)) => {
                        pts.extend([a, b]);
                        origin.extend([i, i]);
                    }
                    None => {
                        pts.push(v);
                        origin.push(i);
                    }
                }
            }
            origins.push(origin);
            Ring::new(pts, ring.is_hole, ring.parent)
        })
        .collect();
    (mpoly.with_rings(rings), origins)
}

/// The two chamfer points of corner `v`, or `None` next to a zero-length
/// edge.
fn cut_corner(prev: Point, v: Point, next: Point, fraction: f64) -> Option<(Point, Point)> {
    let (lp, ln) = (v.dist(prev), v.dist(next));
    let shorter = lp.min(ln);
    if shorter == 0.0 {
        return None;
    }
    let d = shorter * fraction;
    Some((v.lerp(prev, d / lp), v.lerp(next, d / ln)))
}
