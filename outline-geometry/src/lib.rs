//! Raster mask to polygon tracing
//!
//! Stages, leaves first: [`bitgrid`] masks, [`tracer`] boundary tracing into
//! a ring forest, [`pinch`] excursion removal, [`simplify`] point reduction,
//! [`bevel`] self-intersection repair, [`rasterize`] scan conversion back to
//! a mask and [`georef`] coordinate mapping. [`pipeline`] runs them in order.

pub mod bevel;
pub mod bitgrid;
pub mod config;
pub mod georef;
pub mod mask;
pub mod pinch;
pub mod pipeline;
pub mod rasterize;
pub mod ring;
pub mod simplify;
pub mod topology;
pub mod tracer;
pub mod writer;

pub use bevel::bevel;
pub use bitgrid::BitGrid;
pub use config::TraceConfig;
pub use georef::{to_geographic, to_projected, Affine, Projection, WebMercator};
pub use mask::{ClassRaster, MaskBuilder, MemRaster, NdvDef, NdvRange, RasterSource};
pub use pinch::{pinch, pinch_with, PinchParams};
pub use pipeline::{
    run_classified, run_feature, run_pipeline, run_pipeline_with, Feature, PipelineOptions,
    PipelineReport,
};
pub use rasterize::fill;
pub use ring::{CoordSpace, Mpoly, Point, PolygonRef, Ring, RingId};
pub use simplify::reduce;
pub use topology::{find_defects, is_simple, Defect};
pub use tracer::{trace, trace_with_stats, TraceOptions, TraceStats};
pub use writer::{FeatureProps, GeometryWriter, Layout};
