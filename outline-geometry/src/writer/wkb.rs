//! WKB (Well-Known Binary) output
//!
//! Little-endian ISO WKB, one record per geometry, records concatenated.
//!
//! ```text
//! byte order: 1 byte (little-endian = 1)
//! type: 4 bytes (polygon = 3, multipolygon = 6)
//! polygon:
//!   num_rings: 4 bytes
//!   for each ring:
//!     num_points: 4 bytes
//!     for each point: x, y as f64
//! multipolygon:
//!   num_polygons: 4 bytes
//!   for each polygon: a complete polygon record (with its own header)
//! ```

use std::io::Write;

use outline_common::Result;

use super::{output_rings, FeatureProps, GeometryWriter};
use crate::ring::{Mpoly, Point, PolygonRef};

const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOLYGON: u32 = 6;

/// Twice the signed area in x-right, y-up terms: positive means clockwise.
fn signed_area_2(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            (b.x - a.x) * (b.y + a.y)
        })
        .sum()
}

/// Make a ring counter-clockwise (exterior rings).
pub fn ensure_ccw(ring: &mut [Point]) {
    if signed_area_2(ring) > 0.0 {
        ring.reverse();
    }
}

/// Make a ring clockwise (holes).
pub fn ensure_cw(ring: &mut [Point]) {
    if signed_area_2(ring) < 0.0 {
        ring.reverse();
    }
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn encode_polygon_into(buf: &mut Vec<u8>, poly: &PolygonRef<'_>) {
    let rings = output_rings(poly);
    buf.push(1u8);
    put_u32(buf, WKB_POLYGON);
    put_u32(buf, rings.len() as u32);
    for ring in &rings {
        put_u32(buf, ring.len() as u32);
        for p in ring {
            buf.extend_from_slice(&p.x.to_le_bytes());
            buf.extend_from_slice(&p.y.to_le_bytes());
        }
    }
}

/// Encode one polygon.
pub fn encode_polygon_wkb(poly: &PolygonRef<'_>) -> Vec<u8> {
    let points: usize = 1 + poly.exterior.len() + poly.holes.iter().map(|h| h.len() + 1).sum::<usize>();
    let mut buf = Vec::with_capacity(9 + 4 * (1 + poly.holes.len()) + 16 * points);
    encode_polygon_into(&mut buf, poly);
    buf
}

/// Encode a whole Mpoly as a multipolygon.
pub fn encode_multipolygon_wkb(mpoly: &Mpoly) -> Vec<u8> {
    let polygons = mpoly.polygons();
    let mut buf = Vec::with_capacity(9 + 16 * mpoly.summary().points);
    buf.push(1u8);
    put_u32(&mut buf, WKB_MULTIPOLYGON);
    put_u32(&mut buf, polygons.len() as u32);
    for poly in &polygons {
        encode_polygon_into(&mut buf, poly);
    }
    buf
}

/// Streams WKB records to `W`.
pub struct WkbWriter<W: Write> {
    out: W,
    records: usize,
}

impl<W: Write> WkbWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> GeometryWriter for WkbWriter<W> {
    fn write_multipolygon(&mut self, mpoly: &Mpoly, _props: &FeatureProps) -> Result<()> {
        self.out.write_all(&encode_multipolygon_wkb(mpoly))?;
        self.records += 1;
        Ok(())
    }

    fn write_polygon(&mut self, polygon: &PolygonRef<'_>, _props: &FeatureProps) -> Result<()> {
        self.out.write_all(&encode_polygon_wkb(polygon))?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
