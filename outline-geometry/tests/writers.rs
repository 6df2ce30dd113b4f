//! Writers into real files

use std::fs::File;
use std::io::BufWriter;

use outline_geometry::writer::{write_pbm_file, GeoJsonWriter, WkbWriter, WktWriter};
use outline_geometry::{
    fill, run_classified, to_projected, Affine, BitGrid, FeatureProps, GeometryWriter, Layout,
    MaskBuilder, MemRaster, PipelineOptions,
};

fn exact() -> PipelineOptions {
    PipelineOptions {
        dp_toler: 0.0,
        bevel_size: 0.0,
        ..PipelineOptions::default()
    }
}

#[test]
fn classified_geojson_file() {
    let src = MemRaster::from_u8(4, 3, &[1, 1, 0, 2, 1, 1, 0, 2, 0, 0, 0, 2])
        .unwrap()
        .with_palette(vec![[0, 0, 0, 255], [255, 0, 0, 255], [0, 0, 255, 255]]);
    let classes = MaskBuilder::new(&src, &[1]).unwrap().classes().unwrap();
    let features = run_classified(&classes, &exact()).unwrap();
    assert_eq!(features.len(), 3);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classes.geojson");
    let mut writer = GeoJsonWriter::new(BufWriter::new(File::create(&path).unwrap()));
    let affine = Affine::north_up(0.0, 3.0, 1.0);
    for f in &features {
        let en = to_projected(&f.mpoly, &affine).unwrap();
        let props = FeatureProps {
            class: f.class,
            color: f.color,
        };
        writer.write_feature(&en, &props, Layout::MultiPolygon).unwrap();
    }
    writer.finish().unwrap();
    drop(writer);

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let features = doc["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);
    assert_eq!(features[1]["properties"]["value"], 1);
    assert_eq!(features[1]["properties"]["c1"], 255);
    assert_eq!(features[2]["properties"]["c3"], 255);
    // class 2 is the right column: x 3..4, northing 0..3
    let ring = features[2]["geometry"]["coordinates"][0][0].as_array().unwrap();
    assert_eq!(ring.len(), 5);
    assert!(ring.iter().any(|p| p[0] == 4.0 && p[1] == 0.0));
}

#[test]
fn wkt_and_wkb_files() {
    let mask = BitGrid::from_rows(&["##..##", "##..##"]).unwrap();
    let src = MemRaster::from_u8(6, 2, &[9, 9, 0, 0, 9, 9, 9, 9, 0, 0, 9, 9])
        .unwrap()
        .with_nodata(1, 0.0);
    let data = MaskBuilder::new(&src, &[]).unwrap().data_mask(None).unwrap();
    assert_eq!(data, mask);

    let (mp, _) = outline_geometry::run_pipeline(data, &exact()).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let wkt_path = dir.path().join("out.wkt");
    let mut wkt = WktWriter::new(File::create(&wkt_path).unwrap());
    wkt.write_feature(&mp, &FeatureProps::default(), Layout::SplitPolygons)
        .unwrap();
    wkt.finish().unwrap();
    let text = std::fs::read_to_string(&wkt_path).unwrap();
    assert_eq!(text.lines().count(), 2);

    let wkb_path = dir.path().join("out.wkb");
    let mut wkb = WkbWriter::new(File::create(&wkb_path).unwrap());
    wkb.write_feature(&mp, &FeatureProps::default(), Layout::MultiPolygon)
        .unwrap();
    wkb.finish().unwrap();
    let bytes = std::fs::read(&wkb_path).unwrap();
    // header, 2 polygons of one closed 5 point ring each
    assert_eq!(bytes.len(), 9 + 2 * (9 + 4 + 5 * 16));

    let pbm_path = dir.path().join("mask.pbm");
    write_pbm_file(&fill(&mp, 6, 2).unwrap(), &pbm_path).unwrap();
    assert_eq!(
        std::fs::read(&pbm_path).unwrap(),
        b"P4\n6 2\n\xcc\xcc".to_vec()
    );
}
