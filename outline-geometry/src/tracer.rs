//! Boundary tracing: BitGrid -> forest of closed rings
//!
//! Every foreground pixel is a unit square. Pixel sides separating
//! foreground from background (or from the outside of the grid) become
//! directed unit edges with the foreground on the left (positive shoelace
//! area). Walking the edges vertex to vertex yields closed loops; a loop with
//! positive area is an exterior ring, a loop with negative area is a hole.
//!
//! At a saddle vertex (two foreground pixels touching only diagonally) the
//! walk always turns towards the foreground pixel across the diagonal, so
//! diagonally touching foreground is traced as one ring that revisits the
//! shared corner, and background is 4-connected. The beveler later splits
//! those shared corners apart.
//!
//! Pipeline:
//! 1. Mark outgoing edges of every grid vertex
//! 2. Walk closed loops in row-major order of their start vertex
//! 3. Drop collinear unit steps, keep corners only
//! 4. Resolve parents: innermost ring containing a pixel beside the loop
//! 5. Filter by area / nesting and compact ring ids in one pass

use std::time::Instant;

use outline_common::{Error, Result};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde::Serialize;

use crate::bitgrid::BitGrid;
use crate::ring::{point_in_ring, Mpoly, Point, Ring, RingId};

/// Edge directions: east, south, west, north (image orientation, y down).
const DX: [i64; 4] = [1, 0, -1, 0];
const DY: [i64; 4] = [0, 1, 0, -1];

const EAST: u8 = 0;
const SOUTH: u8 = 1;
const WEST: u8 = 2;
const NORTH: u8 = 3;

/// Tracer parameters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TraceOptions {
    /// Rings with a smaller unsigned area (square pixels) are dropped
    /// together with everything nested inside them
    pub min_ring_area: f64,
    /// Keep top-level rings only
    pub suppress_holes: bool,
}

/// Tracer statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct TraceStats {
    pub grid_cols: usize,
    pub grid_rows: usize,
    pub foreground_pixels: usize,
    pub rings_traced: usize,
    pub rings_dropped_by_area: usize,
    pub rings_dropped_as_nested: usize,
    pub rings_kept: usize,
    pub points: usize,
    pub elapsed_ms: u64,
}

/// Trace `mask` into an Mpoly. An empty or zero-size mask gives an empty
/// Mpoly.
pub fn trace(mask: &BitGrid, min_ring_area: f64, suppress_holes: bool) -> Result<Mpoly> {
    let opts = TraceOptions {
        min_ring_area,
        suppress_holes,
    };
    trace_with_stats(mask, &opts).map(|(mp, _)| mp)
}

/// [`trace`] that also reports what happened.
pub fn trace_with_stats(mask: &BitGrid, opts: &TraceOptions) -> Result<(Mpoly, TraceStats)> {
    let start = Instant::now();
    if opts.min_ring_area.is_nan() || opts.min_ring_area < 0.0 {
        return Err(Error::invalid_parameter(format!(
            "min_ring_area must be >= 0, got {}",
            opts.min_ring_area
        )));
    }

    let mut stats = TraceStats {
        grid_cols: mask.width(),
        grid_rows: mask.height(),
        ..Default::default()
    };
    if mask.is_degenerate() || mask.is_empty() {
        return Ok((Mpoly::new(), stats));
    }
    stats.foreground_pixels = mask.count_set();

    let loops = walk_loops(mask)?;
    stats.rings_traced = loops.len();

    let parents = resolve_parents(&loops);

    // Parents are strictly larger than their children, so visiting by
    // decreasing area settles every parent before its children.
    let mut order: Vec<usize> = (0..loops.len()).collect();
    order.sort_by(|&a, &b| loops[b].area2.abs().cmp(&loops[a].area2.abs()));

    let min_area2 = opts.min_ring_area * 2.0;
    let mut keep = vec![false; loops.len()];
    for &idx in &order {
        let lp = &loops[idx];
        if (lp.area2.abs() as f64) < min_area2 {
            stats.rings_dropped_by_area += 1;
            continue;
        }
        match parents[idx] {
            None => keep[idx] = true,
            Some(_) if opts.suppress_holes => stats.rings_dropped_as_nested += 1,
            Some(p) if keep[p] => keep[idx] = true,
            Some(_) => stats.rings_dropped_as_nested += 1,
        }
    }

    // Single compacting pass, ids remapped in trace order
    let mut new_id = vec![usize::MAX; loops.len()];
    let mut rings = Vec::with_capacity(loops.len());
    for (idx, lp) in loops.into_iter().enumerate() {
        if !keep[idx] {
            continue;
        }
        let parent = match parents[idx] {
            None => None,
            Some(p) if new_id[p] != usize::MAX => Some(RingId(new_id[p])),
            Some(p) if keep[p] => {
                return Err(Error::topology(format!(
                    "ring {idx} was traced before its parent {p}"
                )))
            }
            Some(p) => {
                return Err(Error::topology(format!(
                    "kept ring {idx} whose parent {p} was dropped"
                )))
            }
        };
        new_id[idx] = rings.len();
        stats.points += lp.pts.len();
        rings.push(Ring::new(lp.pts, lp.area2 < 0, parent));
    }
    stats.rings_kept = rings.len();
    stats.elapsed_ms = start.elapsed().as_millis() as u64;

    tracing::debug!(
        traced = stats.rings_traced,
        kept = stats.rings_kept,
        by_area = stats.rings_dropped_by_area,
        nested = stats.rings_dropped_as_nested,
        points = stats.points,
        "traced mask"
    );

    Ok((Mpoly::from_rings(rings)?, stats))
}

/// A closed boundary loop before filtering
struct Loop {
    pts: Vec<Point>,
    /// Twice the signed area (exact on the pixel lattice)
    area2: i64,
    /// Center of a pixel inside the loop's own polygon, next to its first edge
    sample: Point,
}

/// Outgoing edge bits of every vertex of the `(w+1) x (h+1)` lattice.
fn edge_field(mask: &BitGrid) -> (usize, Vec<u8>) {
    let vw = mask.width() + 1;
    let vh = mask.height() + 1;
    let mut out = vec![0u8; vw * vh];
    for vy in 0..vh {
        for vx in 0..vw {
            let (x, y) = (vx as i64, vy as i64);
            let nw = mask.value_at(x - 1, y - 1);
            let ne = mask.value_at(x, y - 1);
            let sw = mask.value_at(x - 1, y);
            let se = mask.value_at(x, y);
            let mut bits = 0u8;
            if se && !ne {
                bits |= 1 << EAST;
            }
            if sw && !se {
                bits |= 1 << SOUTH;
            }
            if nw && !sw {
                bits |= 1 << WEST;
            }
            if ne && !nw {
                bits |= 1 << NORTH;
            }
            out[vy * vw + vx] = bits;
        }
    }
    (vw, out)
}

/// Direction to leave a vertex with outgoing bits `out` after arriving
/// in direction `incoming`. Saddles have two outgoing edges; turning
/// towards `incoming + 3` keeps the diagonal foreground connected.
#[inline]
fn leave_dir(out: u8, incoming: u8) -> u8 {
    if out.count_ones() == 2 {
        (incoming + 3) % 4
    } else {
        out.trailing_zeros() as u8
    }
}

/// Pixels on the foreground (left) and background (right) side of the unit
/// edge leaving lattice vertex `(x, y)` in direction `d`.
fn side_pixels(x: i64, y: i64, d: u8) -> ((i64, i64), (i64, i64)) {
    match d {
        EAST => ((x, y), (x, y - 1)),
        SOUTH => ((x - 1, y), (x, y)),
        WEST => ((x - 1, y - 1), (x - 1, y)),
        _ => ((x, y - 1), (x - 1, y - 1)),
    }
}

fn walk_loops(mask: &BitGrid) -> Result<Vec<Loop>> {
    let (vw, orig) = edge_field(mask);
    let mut remaining = orig.clone();
    let mut loops = Vec::new();
    let mut steps: Vec<(usize, u8)> = Vec::new();

    for v0 in 0..remaining.len() {
        while remaining[v0] != 0 {
            let d0 = remaining[v0].trailing_zeros() as u8;
            steps.clear();

            let (mut v, mut d) = (v0, d0);
            loop {
                remaining[v] &= !(1 << d);
                steps.push((v, d));
                let nx = (v % vw) as i64 + DX[d as usize];
                let ny = (v / vw) as i64 + DY[d as usize];
                let nv = ny as usize * vw + nx as usize;
                let nd = leave_dir(orig[nv], d);
                if nv == v0 && nd == d0 {
                    break;
                }
                if remaining[nv] & (1 << nd) == 0 {
                    return Err(Error::topology(format!(
                        "boundary walk from vertex {v0} reached used edge at vertex {nv}"
                    )));
                }
                v = nv;
                d = nd;
            }

            loops.push(close_loop(&steps, vw, d0, v0));
        }
    }
    Ok(loops)
}

fn close_loop(steps: &[(usize, u8)], vw: usize, d0: u8, v0: usize) -> Loop {
    let n = steps.len();
    let mut corners: Vec<(i64, i64)> = Vec::new();
    for i in 0..n {
        let (v, d) = steps[i];
        let incoming = steps[(i + n - 1) % n].1;
        if d != incoming {
            corners.push(((v % vw) as i64, (v / vw) as i64));
        }
    }

    let m = corners.len();
    let mut area2 = 0i64;
    for i in 0..m {
        let (x0, y0) = corners[i];
        let (x1, y1) = corners[(i + 1) % m];
        area2 += x0 * y1 - x1 * y0;
    }

    let (fg, bg) = side_pixels((v0 % vw) as i64, (v0 / vw) as i64, d0);
    let (sx, sy) = if area2 > 0 { fg } else { bg };

    Loop {
        pts: corners
            .into_iter()
            .map(|(x, y)| Point::new(x as f64, y as f64))
            .collect(),
        area2,
        sample: Point::new(sx as f64 + 0.5, sy as f64 + 0.5),
    }
}

/// Innermost enclosing loop of every loop. Only loops with a larger area
/// can enclose, and of those the smallest one containing the sample pixel
/// is the direct parent.
fn resolve_parents(loops: &[Loop]) -> Vec<Option<usize>> {
    let boxes: Vec<GeomWithData<Rectangle<[f64; 2]>, usize>> = loops
        .iter()
        .enumerate()
        .filter_map(|(idx, lp)| {
            let first = lp.pts.first()?;
            let (lo, hi) = lp.pts.iter().fold(
                ([first.x, first.y], [first.x, first.y]),
                |(lo, hi), p| {
                    (
                        [lo[0].min(p.x), lo[1].min(p.y)],
                        [hi[0].max(p.x), hi[1].max(p.y)],
                    )
                },
            );
            Some(GeomWithData::new(Rectangle::from_corners(lo, hi), idx))
        })
        .collect();
    let tree = RTree::bulk_load(boxes);

    loops
        .iter()
        .enumerate()
        .map(|(idx, lp)| {
            let area = lp.area2.abs();
            tree.locate_all_at_point(&[lp.sample.x, lp.sample.y])
                .map(|cand| cand.data)
                .filter(|&j| j != idx && loops[j].area2.abs() > area)
                .filter(|&j| point_in_ring(&loops[j].pts, lp.sample))
                .min_by_key(|&j| loops[j].area2.abs())
        })
        .collect()
}
