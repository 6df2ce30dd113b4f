//! Stage orchestration for one mask or one class pass
//!
//! invert -> erode -> trace -> (grid released) -> major ring -> pinch ->
//! pixel outline hook -> simplify -> bevel -> defect count.
//!
//! Each stage builds a new Mpoly from the previous one. Coordinate mapping
//! and writing are left to the caller, which may need several output spaces.

use std::time::Instant;

use outline_common::Result;
use rayon::prelude::*;
use serde::Serialize;

use crate::bevel::bevel;
use crate::bitgrid::BitGrid;
use crate::config::TraceConfig;
use crate::mask::ClassRaster;
use crate::pinch::{pinch_with, PinchParams};
use crate::ring::Mpoly;
use crate::simplify::reduce;
use crate::topology::{find_defects, DefectCounts};
use crate::tracer::{trace_with_stats, TraceOptions, TraceStats};

/// Stage switches and parameters of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub invert: bool,
    pub erosion: bool,
    pub min_ring_area: f64,
    pub suppress_holes: bool,
    pub major_ring: bool,
    /// `None` disables excursion pinching
    pub pinch: Option<PinchParams>,
    pub dp_toler: f64,
    pub bevel_size: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&TraceConfig::default())
    }
}

impl From<&TraceConfig> for PipelineOptions {
    fn from(config: &TraceConfig) -> Self {
        Self {
            invert: config.invert,
            erosion: config.erosion,
            min_ring_area: config.min_ring_area,
            suppress_holes: config.no_donuts,
            major_ring: config.major_ring,
            pinch: config.pinch_excursions.then_some(config.pinch),
            dp_toler: config.dp_toler,
            bevel_size: config.bevel_size,
        }
    }
}

/// What a pass did, stage by stage
#[derive(Debug, Default, Clone, Serialize)]
pub struct PipelineReport {
    pub trace: TraceStats,
    pub points_traced: usize,
    pub points_after_pinch: usize,
    pub points_after_simplify: usize,
    pub points_after_bevel: usize,
    pub outer_rings: usize,
    pub holes: usize,
    /// Defects left in the final geometry
    pub defects: DefectCounts,
    pub elapsed_ms: u64,
}

/// One output feature: the whole data mask, or one class value.
#[derive(Debug, Clone)]
pub struct Feature {
    pub class: Option<u8>,
    pub color: Option<[u8; 4]>,
    pub mpoly: Mpoly,
    pub report: PipelineReport,
}

/// Run every stage on `mask`.
pub fn run_pipeline(mask: BitGrid, opts: &PipelineOptions) -> Result<(Mpoly, PipelineReport)> {
    run_pipeline_with(mask, opts, |_, _, _| Ok(()))
}

/// [`run_pipeline`] with a hook that sees the pixel-space outline (after
/// pinching, before simplification) together with the grid size, for mask
/// export.
pub fn run_pipeline_with(
    mut mask: BitGrid,
    opts: &PipelineOptions,
    pixel_outline: impl FnOnce(&Mpoly, usize, usize) -> Result<()>,
) -> Result<(Mpoly, PipelineReport)> {
    let start = Instant::now();
    let mut report = PipelineReport::default();

    if opts.invert {
        mask.invert();
    }
    if opts.erosion {
        mask.erode();
    }

    let trace_opts = TraceOptions {
        min_ring_area: opts.min_ring_area,
        suppress_holes: opts.suppress_holes || opts.major_ring,
    };
    let (mut mpoly, stats) = trace_with_stats(&mask, &trace_opts)?;
    let (w, h) = (mask.width(), mask.height());
    drop(mask);
    report.trace = stats;
    report.points_traced = mpoly.summary().points;

    if opts.major_ring {
        mpoly = mpoly.major_ring()?;
    }

    if let Some(params) = &opts.pinch {
        mpoly = pinch_with(&mpoly, params);
    }
    report.points_after_pinch = mpoly.summary().points;

    pixel_outline(&mpoly, w, h)?;

    if opts.dp_toler > 0.0 {
        mpoly = reduce(&mpoly, opts.dp_toler)?;
    }
    report.points_after_simplify = mpoly.summary().points;

    if opts.bevel_size > 0.0 && !mpoly.is_empty() {
        mpoly = bevel(&mpoly, opts.bevel_size)?;
    }
    let summary = mpoly.summary();
    report.points_after_bevel = summary.points;
    report.outer_rings = summary.outer;
    report.holes = summary.holes;

    report.defects = DefectCounts::of(&find_defects(&mpoly));
    if report.defects.total() > 0 {
        tracing::debug!(
            shared = report.defects.shared_vertices,
            touches = report.defects.touches,
            crossings = report.defects.crossings,
            "output keeps its pixel corner contacts"
        );
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        outer = report.outer_rings,
        holes = report.holes,
        points = report.points_after_bevel,
        elapsed_ms = report.elapsed_ms,
        "traced outline"
    );
    Ok((mpoly, report))
}

/// Single feature for the data mask.
pub fn run_feature(mask: BitGrid, opts: &PipelineOptions) -> Result<Feature> {
    let (mpoly, report) = run_pipeline(mask, opts)?;
    Ok(Feature {
        class: None,
        color: None,
        mpoly,
        report,
    })
}

/// One feature per class value present in `classes`, in ascending class
/// order. Classes are traced in parallel, each on its own grid.
pub fn run_classified(classes: &ClassRaster, opts: &PipelineOptions) -> Result<Vec<Feature>> {
    let used = classes.used_classes();
    tracing::info!(classes = used.len(), "classify mode");
    used.into_par_iter()
        .map(|class| {
            let mask = classes.mask_for_class(class);
            let (mpoly, report) = run_pipeline(mask, opts)?;
            tracing::debug!(class, rings = mpoly.len(), "class traced");
            Ok(Feature {
                class: Some(class),
                color: classes.color(class),
                mpoly,
                report,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{MaskBuilder, MemRaster};
    use crate::rasterize::fill;
    use crate::topology::is_simple;

    fn grid(rows: &[&str]) -> BitGrid {
        BitGrid::from_rows(rows).unwrap()
    }

    fn exact() -> PipelineOptions {
        PipelineOptions {
            dp_toler: 0.0,
            bevel_size: 0.0,
            ..PipelineOptions::default()
        }
    }

    #[test]
    fn test_defaults_follow_config() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.dp_toler, 2.0);
        assert_eq!(opts.bevel_size, 0.1);
        assert!(opts.pinch.is_none());
    }

    #[test]
    fn test_exact_pipeline_round_trips() {
        let mask = grid(&["#..#", "####", "#..#", "##.#"]);
        let mut exported = None;
        let (mp, report) = run_pipeline_with(mask.clone(), &exact(), |mp, w, h| {
            exported = Some(fill(mp, w, h)?);
            Ok(())
        })
        .unwrap();
        assert_eq!(exported, Some(mask.clone()));
        assert_eq!(fill(&mp, 4, 4).unwrap(), mask);
        assert_eq!(report.points_traced, report.points_after_bevel);
        assert_eq!(mp.signed_area(), mask.count_set() as f64);
    }

    #[test]
    fn test_invert_and_major_ring() {
        let mask = grid(&["####", "#..#", "####", "#.##"]);
        let opts = PipelineOptions {
            invert: true,
            major_ring: true,
            ..exact()
        };
        let (mp, _) = run_pipeline(mask, &opts).unwrap();
        assert_eq!(mp.len(), 1);
        assert_eq!(mp.signed_area(), 2.0);
    }

    #[test]
    fn test_bevel_stage_repairs_diagonals() {
        let mask = grid(&["#.#", ".#.", "#.#"]);
        let opts = PipelineOptions {
            dp_toler: 0.0,
            ..PipelineOptions::default()
        };
        let (mp, report) = run_pipeline(mask, &opts).unwrap();
        assert!(is_simple(&mp));
        assert_eq!(report.defects.total(), 0);
        assert!(report.points_after_bevel > report.points_traced);
    }

    #[test]
    fn test_classified_features_in_class_order() {
        let src = MemRaster::from_u8(4, 2, &[5, 5, 2, 2, 5, 5, 2, 9]).unwrap();
        let classes = MaskBuilder::new(&src, &[1]).unwrap().classes().unwrap();
        let features = run_classified(&classes, &exact()).unwrap();
        let ids: Vec<_> = features.iter().map(|f| f.class).collect();
        assert_eq!(ids, vec![Some(2), Some(5), Some(9)]);
        let areas: Vec<f64> = features.iter().map(|f| f.mpoly.signed_area()).collect();
        assert_eq!(areas, vec![3.0, 4.0, 1.0]);
    }

    #[test]
    fn test_empty_mask_is_not_an_error() {
        let (mp, report) = run_pipeline(BitGrid::new(8, 8), &PipelineOptions::default()).unwrap();
        assert!(mp.is_empty());
        assert_eq!(report.outer_rings, 0);
    }
}
