//! GeoJSON output
//!
//! Features are collected and written as one `FeatureCollection` by
//! [`GeometryWriter::finish`]. In classify mode the properties carry the
//! class `value` and, for palette rasters, the color as `c1`..`c4`.

use std::io::Write;

use outline_common::Result;
use serde_json::{json, Map, Value};

use super::{output_rings, FeatureProps, GeometryWriter};
use crate::ring::{Mpoly, PolygonRef};

fn polygon_coords(poly: &PolygonRef<'_>) -> Value {
    Value::Array(
        output_rings(poly)
            .iter()
            .map(|ring| ring.iter().map(|p| json!([p.x, p.y])).collect())
            .collect(),
    )
}

fn properties(props: &FeatureProps) -> Value {
    let mut map = Map::new();
    if let Some(class) = props.class {
        map.insert("value".into(), json!(class));
    }
    if let Some(color) = props.color {
        for (i, c) in color.iter().enumerate() {
            map.insert(format!("c{}", i + 1), json!(c));
        }
    }
    Value::Object(map)
}

pub struct GeoJsonWriter<W: Write> {
    out: W,
    features: Vec<Value>,
}

impl<W: Write> GeoJsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            features: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn push(&mut self, geometry: Value, props: &FeatureProps) {
        self.features.push(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties(props),
        }));
    }
}

impl<W: Write> GeometryWriter for GeoJsonWriter<W> {
    fn write_multipolygon(&mut self, mpoly: &Mpoly, props: &FeatureProps) -> Result<()> {
        let coords: Vec<Value> = mpoly.polygons().iter().map(polygon_coords).collect();
        self.push(json!({ "type": "MultiPolygon", "coordinates": coords }), props);
        Ok(())
    }

    fn write_polygon(&mut self, polygon: &PolygonRef<'_>, props: &FeatureProps) -> Result<()> {
        self.push(
            json!({ "type": "Polygon", "coordinates": polygon_coords(polygon) }),
            props,
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let collection = json!({
            "type": "FeatureCollection",
            "features": std::mem::take(&mut self.features),
        });
        serde_json::to_writer(&mut self.out, &collection).map_err(std::io::Error::from)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitgrid::BitGrid;
    use crate::tracer::trace;
    use crate::writer::Layout;

    #[test]
    fn test_feature_collection() {
        let mp = trace(&BitGrid::from_rows(&["###", "#.#", "###"]).unwrap(), 0.0, false).unwrap();
        let mut w = GeoJsonWriter::new(Vec::new());
        let props = FeatureProps {
            class: Some(7),
            color: Some([10, 20, 30, 255]),
        };
        w.write_feature(&mp, &props, Layout::MultiPolygon).unwrap();
        w.finish().unwrap();

        let doc: Value = serde_json::from_slice(&w.into_inner()).unwrap();
        assert_eq!(doc["type"], "FeatureCollection");
        let feature = &doc["features"][0];
        assert_eq!(feature["geometry"]["type"], "MultiPolygon");
        assert_eq!(feature["properties"]["value"], 7);
        assert_eq!(feature["properties"]["c4"], 255);
        let polygon = &feature["geometry"]["coordinates"][0];
        assert_eq!(polygon.as_array().unwrap().len(), 2);
        assert_eq!(polygon[0][0], polygon[0][4]);
    }

    #[test]
    fn test_split_without_props() {
        let mp = trace(&BitGrid::from_rows(&["#.#"]).unwrap(), 0.0, false).unwrap();
        let mut w = GeoJsonWriter::new(Vec::new());
        w.write_feature(&mp, &FeatureProps::default(), Layout::SplitPolygons)
            .unwrap();
        w.finish().unwrap();
        let doc: Value = serde_json::from_slice(&w.into_inner()).unwrap();
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1]["geometry"]["type"], "Polygon");
        assert!(features[1]["properties"].as_object().unwrap().is_empty());
    }
}
