//! WKT output, one geometry per line

use std::fmt::Write as _;
use std::io::Write;

use outline_common::Result;

use super::{output_rings, FeatureProps, GeometryWriter};
use crate::ring::{Mpoly, PolygonRef};

fn push_polygon_body(out: &mut String, poly: &PolygonRef<'_>) {
    out.push('(');
    for (r, ring) in output_rings(poly).iter().enumerate() {
        if r > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (i, p) in ring.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            // writing into a String cannot fail
            let _ = write!(out, "{} {}", p.x, p.y);
        }
        out.push(')');
    }
    out.push(')');
}

pub fn polygon_wkt(poly: &PolygonRef<'_>) -> String {
    let mut out = String::from("POLYGON ");
    push_polygon_body(&mut out, poly);
    out
}

pub fn multipolygon_wkt(mpoly: &Mpoly) -> String {
    let polygons = mpoly.polygons();
    if polygons.is_empty() {
        return "MULTIPOLYGON EMPTY".to_string();
    }
    let mut out = String::from("MULTIPOLYGON (");
    for (i, poly) in polygons.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_polygon_body(&mut out, poly);
    }
    out.push(')');
    out
}

/// Streams WKT lines to `W`.
pub struct WktWriter<W: Write> {
    out: W,
}

impl<W: Write> WktWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> GeometryWriter for WktWriter<W> {
    fn write_multipolygon(&mut self, mpoly: &Mpoly, _props: &FeatureProps) -> Result<()> {
        writeln!(self.out, "{}", multipolygon_wkt(mpoly))?;
        Ok(())
    }

    fn write_polygon(&mut self, polygon: &PolygonRef<'_>, _props: &FeatureProps) -> Result<()> {
        writeln!(self.out, "{}", polygon_wkt(polygon))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
