//! Geometry writers
//!
//! Writers receive finished features in their output coordinate space and
//! serialize them. All of them emit exterior rings counter-clockwise and
//! holes clockwise, with the first point repeated at the end of each ring.

use outline_common::Result;

use crate::ring::{Mpoly, Point, PolygonRef};

pub mod geojson;
pub mod pbm;
pub mod wkb;
pub mod wkt;

pub use geojson::GeoJsonWriter;
pub use pbm::{write_pbm, write_pbm_file};
pub use wkb::WkbWriter;
pub use wkt::WktWriter;

/// Attributes carried by a feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureProps {
    /// Class value in classify mode
    pub class: Option<u8>,
    /// Palette color of the class
    pub color: Option<[u8; 4]>,
}

/// One multipolygon per feature, or one polygon per exterior ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    #[default]
    MultiPolygon,
    SplitPolygons,
}

pub trait GeometryWriter {
    /// Emit `mpoly` as a single multipolygon record.
    fn write_multipolygon(&mut self, mpoly: &Mpoly, props: &FeatureProps) -> Result<()>;

    /// Emit one exterior ring with its holes as a polygon record.
    fn write_polygon(&mut self, polygon: &PolygonRef<'_>, props: &FeatureProps) -> Result<()>;

    /// Emit a feature in the requested layout.
    fn write_feature(&mut self, mpoly: &Mpoly, props: &FeatureProps, layout: Layout) -> Result<()> {
        match layout {
            Layout::MultiPolygon => self.write_multipolygon(mpoly, props),
            Layout::SplitPolygons => mpoly
                .polygons()
                .iter()
                .try_for_each(|poly| self.write_polygon(poly, props)),
        }
    }

    /// Flush buffered output. Writers that stream need nothing here.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Exterior ring and holes of `poly`, oriented and explicitly closed.
pub(crate) fn output_rings(poly: &PolygonRef<'_>) -> Vec<Vec<Point>> {
    let mut rings = Vec::with_capacity(1 + poly.holes.len());
    let mut exterior = poly.exterior.pts.clone();
    wkb::ensure_ccw(&mut exterior);
    rings.push(close(exterior));
    for hole in &poly.holes {
        let mut pts = hole.pts.clone();
        wkb::ensure_cw(&mut pts);
        rings.push(close(pts));
    }
    rings
}

fn close(mut ring: Vec<Point>) -> Vec<Point> {
    if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}
