//! Coordinate mapping: pixel -> projected -> geographic
//!
//! The affine geotransform is linear and maps every vertex exactly. The
//! geographic step is not: a straight pixel edge becomes a curve in
//! longitude/latitude, so edges are bisected until the straight line
//! between two geographic vertices stays within a tolerance (in pixels) of
//! the true image of the edge.

use std::str::FromStr;

use outline_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::ring::{CoordSpace, Mpoly, Point, Ring};

/// Maximum bisection depth per edge
pub const MAX_SUBDIVISION_DEPTH: u32 = 24;

/// Six-coefficient geotransform:
/// `E = c[0] + x*c[1] + y*c[2]`, `N = c[3] + x*c[4] + y*c[5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [f64; 6]);

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// North-up transform with square pixels of `size` units and the top
    /// left corner at `(origin_e, origin_n)`.
    pub fn north_up(origin_e: f64, origin_n: f64, size: f64) -> Self {
        Affine([origin_e, size, 0.0, origin_n, 0.0, -size])
    }

    #[inline]
    pub fn apply(&self, p: Point) -> Point {
        let c = &self.0;
        Point::new(c[0] + p.x * c[1] + p.y * c[2], c[3] + p.x * c[4] + p.y * c[5])
    }

    pub fn inverse(&self) -> Result<Affine> {
        let [a0, a1, a2, a3, a4, a5] = self.0;
        let det = a1 * a5 - a2 * a4;
        if det == 0.0 || !det.is_finite() {
            return Err(Error::Projection(format!(
                "geotransform {:?} is not invertible",
                self.0
            )));
        }
        let (b1, b2, b4, b5) = (a5 / det, -a2 / det, -a4 / det, a1 / det);
        Ok(Affine([
            -(b1 * a0 + b2 * a3),
            b1,
            b2,
            -(b4 * a0 + b5 * a3),
            b4,
            b5,
        ]))
    }
}

impl FromStr for Affine {
    type Err = Error;

    /// Six numbers separated by commas and/or whitespace.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|e| Error::invalid_input(format!("bad geotransform value {t:?}: {e}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        let coeffs: [f64; 6] = values.try_into().map_err(|v: Vec<f64>| {
            Error::invalid_input(format!("geotransform needs 6 values, got {}", v.len()))
        })?;
        Ok(Affine(coeffs))
    }
}

/// Projected <-> geographic conversion.
pub trait Projection: Send + Sync {
    fn name(&self) -> &str;

    /// Easting/northing to longitude/latitude (degrees).
    fn to_geographic(&self, en: Point) -> Result<Point>;

    /// Longitude/latitude (degrees) to easting/northing.
    fn to_projected(&self, ll: Point) -> Result<Point>;
}

/// Spherical Web Mercator (EPSG:3857)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl WebMercator {
    const EARTH_RADIUS: f64 = 6378137.0;
}

impl Projection for WebMercator {
    fn name(&self) -> &str {
        "web-mercator"
    }

    fn to_geographic(&self, en: Point) -> Result<Point> {
        let lon = (en.x / Self::EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (en.y / Self::EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
            .to_degrees();
        finite(Point::new(lon, lat), en)
    }

    fn to_projected(&self, ll: Point) -> Result<Point> {
        let x = ll.x.to_radians() * Self::EARTH_RADIUS;
        let y = (std::f64::consts::FRAC_PI_4 + ll.y.to_radians() / 2.0).tan().ln()
            * Self::EARTH_RADIUS;
        finite(Point::new(x, y), ll)
    }
}

fn finite(out: Point, input: Point) -> Result<Point> {
    if out.x.is_finite() && out.y.is_finite() {
        Ok(out)
    } else {
        Err(Error::Projection(format!(
            "({}, {}) has no finite image",
            input.x, input.y
        )))
    }
}

fn expect_space(mpoly: &Mpoly, expected: CoordSpace) -> Result<()> {
    if mpoly.space() != expected {
        return Err(Error::CoordSpace {
            expected: expected.name(),
            found: mpoly.space().name(),
        });
    }
    Ok(())
}

/// Map a pixel-space Mpoly through `affine`. Exact, vertex for vertex.
pub fn to_projected(mpoly: &Mpoly, affine: &Affine) -> Result<Mpoly> {
    expect_space(mpoly, CoordSpace::Pixel)?;
    let rings = mpoly
        .rings()
        .iter()
        .map(|r| Ring::new(r.pts.iter().map(|&p| affine.apply(p)).collect(), r.is_hole, r.parent))
        .collect();
    Ok(Mpoly::with_space(rings, CoordSpace::Projected))
}

/// Map a pixel-space Mpoly to longitude/latitude, subdividing edges so the
/// result deviates from the exact image by at most `toler` pixels.
pub fn to_geographic(
    mpoly: &Mpoly,
    affine: &Affine,
    projection: &dyn Projection,
    toler: f64,
) -> Result<Mpoly> {
    expect_space(mpoly, CoordSpace::Pixel)?;
    if toler.is_nan() || toler <= 0.0 {
        return Err(Error::invalid_parameter(format!(
            "geographic tolerance must be > 0, got {toler}"
        )));
    }
    let mapper = GeoMapper {
        affine,
        inverse: affine.inverse()?,
        projection,
        toler,
    };

    let mut added = 0usize;
    let mut rings = Vec::with_capacity(mpoly.len());
    for ring in mpoly.rings() {
        let ll: Vec<Point> = ring
            .pts
            .iter()
            .map(|&p| mapper.forward(p))
            .collect::<Result<_>>()?;
        let n = ring.pts.len();
        let mut pts = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + 1) % n;
            pts.push(ll[i]);
            let before = pts.len();
            mapper.subdivide(ring.pts[i], ring.pts[j], ll[i], ll[j], 0, &mut pts)?;
            added += pts.len() - before;
        }
        rings.push(Ring::new(pts, ring.is_hole, ring.parent));
    }
    tracing::debug!(
        projection = projection.name(),
        toler,
        added_vertices = added,
        "mapped to geographic"
    );
    Ok(Mpoly::with_space(rings, CoordSpace::Geographic))
}

struct GeoMapper<'a> {
    affine: &'a Affine,
    inverse: Affine,
    projection: &'a dyn Projection,
    toler: f64,
}

impl GeoMapper<'_> {
    fn forward(&self, px: Point) -> Result<Point> {
        self.projection.to_geographic(self.affine.apply(px))
    }

    fn backward(&self, ll: Point) -> Result<Point> {
        Ok(self.inverse.apply(self.projection.to_projected(ll)?))
    }

    /// Push the interior vertices needed between `a` and `b` (exclusive).
    fn subdivide(
        &self,
        a: Point,
        b: Point,
        ll_a: Point,
        ll_b: Point,
        depth: u32,
        out: &mut Vec<Point>,
    ) -> Result<()> {
        if depth >= MAX_SUBDIVISION_DEPTH {
            return Ok(());
        }
        let mid = a.lerp(b, 0.5);
        let straight = self.backward(ll_a.lerp(ll_b, 0.5))?;
        if straight.dist(mid) <= self.toler {
            return Ok(());
        }
        let ll_mid = self.forward(mid)?;
        self.subdivide(a, mid, ll_a, ll_mid, depth + 1, out)?;
        out.push(ll_mid);
        self.subdivide(mid, b, ll_mid, ll_b, depth + 1, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitgrid::BitGrid;
    use crate::simplify::perpendicular_distance;
    use crate::tracer::trace;

    fn close(a: Point, b: Point, eps: f64) -> bool {
        a.dist(b) <= eps
    }

    #[test]
    fn test_affine_inverse() {
        let affine = Affine([100.0, 2.0, 0.5, 200.0, -0.25, -3.0]);
        let inv = affine.inverse().unwrap();
        let p = Point::new(12.5, -7.0);
        assert!(close(inv.apply(affine.apply(p)), p, 1e-9));

        assert!(matches!(
            Affine([0.0, 1.0, 2.0, 0.0, 2.0, 4.0]).inverse(),
            Err(Error::Projection(_))
        ));
    }

    #[test]
    fn test_affine_parse() {
        let a: Affine = "10, 1, 0, 20 0 -1".parse().unwrap();
        assert_eq!(a, Affine([10.0, 1.0, 0.0, 20.0, 0.0, -1.0]));
        assert!("1,2,3".parse::<Affine>().is_err());
        assert!("1,2,3,4,5,x".parse::<Affine>().is_err());
    }

    #[test]
    fn test_web_mercator_known_points() {
        let wm = WebMercator;
        let origin = wm.to_geographic(Point::new(0.0, 0.0)).unwrap();
        assert!(close(origin, Point::new(0.0, 0.0), 1e-12));

        let paris = Point::new(2.3522, 48.8566);
        let back = wm.to_geographic(wm.to_projected(paris).unwrap()).unwrap();
        assert!(close(back, paris, 1e-9));

        assert!(wm.to_projected(Point::new(0.0, 90.0)).is_err());
    }

    #[test]
    fn test_projected_is_exact() {
        let mask = BitGrid::from_rows(&["##", "#."]).unwrap();
        let mp = trace(&mask, 0.0, false).unwrap();
        let affine = Affine::north_up(1000.0, 5000.0, 10.0);
        let en = to_projected(&mp, &affine).unwrap();
        assert_eq!(en.space(), CoordSpace::Projected);
        assert_eq!(en.summary().points, mp.summary().points);
        assert!(en.rings()[0].pts.contains(&Point::new(1000.0, 5000.0)));
        assert!(en.rings()[0].pts.contains(&Point::new(1010.0, 4990.0)));

        // a second mapping is a space mismatch
        assert!(matches!(
            to_projected(&en, &affine),
            Err(Error::CoordSpace { .. })
        ));
    }

    #[test]
    fn test_geographic_subdivision_bound() {
        // a diagonal edge spanning most of the Mercator world
        let ring = Ring::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 100.0),
                Point::new(0.0, 100.0),
            ],
            false,
            None,
        );
        let mp = Mpoly::from_rings(vec![ring]).unwrap();
        let affine = Affine::north_up(0.0, 19_000_000.0, 190_000.0);
        let toler = 0.5;
        let ll = to_geographic(&mp, &affine, &WebMercator, toler).unwrap();
        assert_eq!(ll.space(), CoordSpace::Geographic);
        let pts = &ll.rings()[0].pts;
        assert!(pts.len() > 3);

        // the vertical and horizontal edges stay straight in lon/lat
        let inv = affine.inverse().unwrap();
        let back = |p: Point| inv.apply(WebMercator.to_projected(p).unwrap());
        let diagonal_end = pts
            .iter()
            .position(|&p| close(back(p), Point::new(100.0, 100.0), 1e-6))
            .unwrap();
        assert_eq!(pts.len(), diagonal_end + 2);

        for w in pts[..=diagonal_end].windows(2) {
            let mid = back(w[0].lerp(w[1], 0.5));
            let d = perpendicular_distance(mid, Point::new(0.0, 0.0), Point::new(100.0, 100.0));
            assert!(d <= toler, "deviation {d} above tolerance");
        }
    }

    #[test]
    fn test_geographic_rejects_bad_tolerance() {
        let mp = trace(&BitGrid::from_rows(&["#"]).unwrap(), 0.0, false).unwrap();
        assert!(to_geographic(&mp, &Affine::IDENTITY, &WebMercator, 0.0).is_err());
    }
}
