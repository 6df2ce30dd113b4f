//! # trace-outline
//!
//! Traces the outline of the data pixels of a raster (or of every class
//! value in classify mode) and writes the polygons as WKT, WKB or GeoJSON,
//! in pixel, projected or geographic coordinates.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use outline_geometry::writer::{write_pbm_file, GeoJsonWriter, WkbWriter, WktWriter};
use outline_geometry::{
    fill, run_classified, run_pipeline, run_pipeline_with, to_geographic, to_projected, Affine,
    Feature, FeatureProps, GeometryWriter, Layout, MaskBuilder, Mpoly, PipelineOptions,
    PipelineReport, Projection, RasterSource, TraceConfig, WebMercator,
};

mod netpbm;
mod progress;

use progress::ProgressManager;

#[derive(Parser)]
#[command(name = "trace-outline")]
#[command(version, about = "Trace the outline of raster data pixels as polygons")]
#[command(long_about = "Traces the outline of the data pixels of a PGM/PPM raster:
  trace-outline in.pgm --wkt-out out.wkt                 # pixel coordinates
  trace-outline in.pgm --nodata 0 --geojson-out out.json # explicit no-data value
  trace-outline in.pgm --geotransform 500000,30,0,4000000,0,-30 \\
      --projection web-mercator --wkt-out en:proj.wkt --wkt-out ll:geo.wkt
  trace-outline classes.pgm --classify --geojson-out classes.json

Outputs take an optional coordinate space prefix (xy:, en: or ll:);
without one they use --out-cs.")]
struct Cli {
    /// Input raster (PGM or PPM, plain or binary)
    input: PathBuf,

    /// TOML configuration file; command line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Band to inspect (1-based), repeatable; default is every band
    #[arg(short = 'b', long = "band", value_name = "BAND")]
    bands: Vec<usize>,

    /// No-data rule, repeatable: one value or `min..max` per band
    #[arg(long, value_name = "RULE", allow_hyphen_values = true)]
    nodata: Vec<String>,

    /// One feature per 8-bit pixel value
    #[arg(long)]
    classify: bool,

    /// Trace the no-data pixels instead
    #[arg(long)]
    invert: bool,

    /// Erode the mask by one pixel before tracing
    #[arg(long)]
    erosion: bool,

    /// Keep only the largest ring
    #[arg(long)]
    major_ring: bool,

    /// Drop holes
    #[arg(long)]
    no_donuts: bool,

    /// Drop rings (with everything inside them) smaller than this many pixels
    #[arg(long, value_name = "AREA")]
    min_ring_area: Option<f64>,

    /// Simplification tolerance in pixels, 0 disables
    #[arg(long, value_name = "PIXELS")]
    dp_toler: Option<f64>,

    /// Bevel fraction for self-touching corners, in [0, 1)
    #[arg(long, value_name = "FRACTION")]
    bevel_size: Option<f64>,

    /// Cut off small boundary excursions
    #[arg(long)]
    pinch_excursions: bool,

    /// Geographic output tolerance in pixels
    #[arg(long, value_name = "PIXELS")]
    llproj_toler: Option<f64>,

    /// One polygon per exterior ring instead of one multipolygon per feature
    #[arg(long)]
    split_polys: bool,

    /// Pixel to projected affine: six numbers a0..a5
    #[arg(long, value_name = "A0,A1,A2,A3,A4,A5", allow_hyphen_values = true)]
    geotransform: Option<Affine>,

    /// Projection of the projected space, needed for ll outputs
    #[arg(long, value_enum)]
    projection: Option<ProjectionName>,

    /// Coordinate space of outputs given without a prefix
    #[arg(long, value_enum, default_value_t = OutSpace::Xy)]
    out_cs: OutSpace,

    /// WKT output, one geometry per line
    #[arg(long, value_name = "[CS:]PATH")]
    wkt_out: Vec<String>,

    /// WKB output, concatenated little-endian records
    #[arg(long, value_name = "[CS:]PATH")]
    wkb_out: Vec<String>,

    /// GeoJSON FeatureCollection output
    #[arg(long, value_name = "[CS:]PATH")]
    geojson_out: Vec<String>,

    /// Write the traced outline back as a PBM mask
    #[arg(long, value_name = "PATH")]
    mask_out: Option<PathBuf>,

    /// Write per-feature statistics as JSON
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutSpace {
    /// Pixel coordinates
    Xy,
    /// Projected easting/northing
    En,
    /// Longitude/latitude
    Ll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProjectionName {
    WebMercator,
}

impl ProjectionName {
    fn build(self) -> Box<dyn Projection> {
        match self {
            ProjectionName::WebMercator => Box::new(WebMercator),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Wkt,
    Wkb,
    GeoJson,
}

#[derive(Debug, Clone, PartialEq)]
struct OutputSpec {
    format: OutputFormat,
    space: OutSpace,
    path: PathBuf,
}

impl OutputSpec {
    fn parse(format: OutputFormat, arg: &str, default_space: OutSpace) -> Self {
        let (space, path) = match arg.split_once(':') {
            Some(("xy", rest)) => (OutSpace::Xy, rest),
            Some(("en", rest)) => (OutSpace::En, rest),
            Some(("ll", rest)) => (OutSpace::Ll, rest),
            _ => (default_space, arg),
        };
        Self {
            format,
            space,
            path: PathBuf::from(path),
        }
    }
}

#[derive(Serialize)]
struct FeatureReport<'a> {
    class: Option<u8>,
    #[serde(flatten)]
    report: &'a PipelineReport,
}

impl Cli {
    /// Flags given on the command line win over the config file.
    fn apply_to(&self, config: &mut TraceConfig) {
        config.classify |= self.classify;
        config.invert |= self.invert;
        config.erosion |= self.erosion;
        config.major_ring |= self.major_ring;
        config.no_donuts |= self.no_donuts;
        config.pinch_excursions |= self.pinch_excursions;
        config.split_polys |= self.split_polys;
        if !self.bands.is_empty() {
            config.bands = self.bands.clone();
        }
        if !self.nodata.is_empty() {
            config.nodata = self.nodata.clone();
        }
        if let Some(v) = self.min_ring_area {
            config.min_ring_area = v;
        }
        if let Some(v) = self.dp_toler {
            config.dp_toler = v;
        }
        if let Some(v) = self.bevel_size {
            config.bevel_size = v;
        }
        if let Some(v) = self.llproj_toler {
            config.llproj_toler = v;
        }
        if self.geotransform.is_some() {
            config.geotransform = self.geotransform;
        }
        if self.mask_out.is_some() {
            config.mask_out = self.mask_out.clone();
        }
    }

    fn outputs(&self) -> Vec<OutputSpec> {
        let groups = [
            (OutputFormat::Wkt, &self.wkt_out),
            (OutputFormat::Wkb, &self.wkb_out),
            (OutputFormat::GeoJson, &self.geojson_out),
        ];
        groups
            .into_iter()
            .flat_map(|(format, args)| {
                args.iter()
                    .map(move |arg| OutputSpec::parse(format, arg, self.out_cs))
            })
            .collect()
    }
}

fn init_logging(verbose: u8, json: bool) -> Result<()> {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install logger: {e}"))
}

/// Reject outputs whose coordinate space cannot be produced before any
/// work is done.
fn check_spaces(
    outputs: &[OutputSpec],
    config: &TraceConfig,
    projection: Option<ProjectionName>,
) -> Result<()> {
    for out in outputs {
        match out.space {
            OutSpace::Xy => {}
            OutSpace::En | OutSpace::Ll if config.geotransform.is_none() => {
                bail!(
                    "{} needs an affine transform (--geotransform)",
                    out.path.display()
                );
            }
            OutSpace::Ll if projection.is_none() => {
                bail!(
                    "{} needs a coordinate transform (--projection)",
                    out.path.display()
                );
            }
            OutSpace::En | OutSpace::Ll => {}
        }
    }
    Ok(())
}

fn trace_features(
    raster: &dyn RasterSource,
    config: &TraceConfig,
    opts: &PipelineOptions,
) -> Result<Vec<Feature>> {
    let builder = MaskBuilder::new(raster, &config.effective_bands())?;
    if config.classify {
        let classes = builder.classes()?;
        return Ok(run_classified(&classes, opts)?);
    }

    let ndv = config.ndv()?;
    let mask = builder.data_mask(Some(&ndv))?;
    let (mpoly, report) = match &config.mask_out {
        Some(path) => run_pipeline_with(mask, opts, |outline, w, h| {
            write_pbm_file(&fill(outline, w, h)?, path)
        })
        .with_context(|| format!("writing mask {}", path.display()))?,
        None => run_pipeline(mask, opts)?,
    };
    Ok(vec![Feature {
        class: None,
        color: None,
        mpoly,
        report,
    }])
}

fn map_to_space(
    mpoly: &Mpoly,
    space: OutSpace,
    config: &TraceConfig,
    projection: Option<&dyn Projection>,
) -> Result<Mpoly> {
    let affine = || config.geotransform.context("missing affine transform");
    let mapped = match space {
        OutSpace::Xy => mpoly.clone(),
        OutSpace::En => to_projected(mpoly, &affine()?)?,
        OutSpace::Ll => {
            let projection = projection.context("missing coordinate transform")?;
            to_geographic(mpoly, &affine()?, projection, config.llproj_toler)?
        }
    };
    Ok(mapped)
}

fn write_output(
    out: &OutputSpec,
    features: &[Feature],
    config: &TraceConfig,
    projection: Option<&dyn Projection>,
    progress: &ProgressManager,
) -> Result<usize> {
    let file = File::create(&out.path)
        .with_context(|| format!("cannot create {}", out.path.display()))?;
    let sink = BufWriter::new(file);
    let mut writer: Box<dyn GeometryWriter> = match out.format {
        OutputFormat::Wkt => Box::new(WktWriter::new(sink)),
        OutputFormat::Wkb => Box::new(WkbWriter::new(sink)),
        OutputFormat::GeoJson => Box::new(GeoJsonWriter::new(sink)),
    };
    let layout = if config.split_polys {
        Layout::SplitPolygons
    } else {
        Layout::MultiPolygon
    };

    let pb = progress.writes(features.len() as u64);
    pb.set_message(out.path.display().to_string());
    let mut written = 0;
    for feature in features {
        pb.inc(1);
        if feature.mpoly.is_empty() {
            debug!(class = ?feature.class, "skipping empty feature");
            continue;
        }
        let mapped = map_to_space(&feature.mpoly, out.space, config, projection)
            .with_context(|| format!("mapping {:?} for {}", out.space, out.path.display()))?;
        let props = FeatureProps {
            class: feature.class,
            color: feature.color,
        };
        writer
            .write_feature(&mapped, &props, layout)
            .with_context(|| format!("writing {}", out.path.display()))?;
        written += 1;
    }
    writer
        .finish()
        .with_context(|| format!("writing {}", out.path.display()))?;
    pb.finish_and_clear();

    info!(
        path = %out.path.display(),
        format = ?out.format,
        space = ?out.space,
        features = written,
        "wrote output"
    );
    Ok(written)
}

fn write_report(path: &Path, features: &[Feature]) -> Result<()> {
    let reports: Vec<FeatureReport<'_>> = features
        .iter()
        .map(|f| FeatureReport {
            class: f.class,
            report: &f.report,
        })
        .collect();
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &reports)
        .with_context(|| format!("writing report {}", path.display()))?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => TraceConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TraceConfig::default(),
    };
    cli.apply_to(&mut config);
    config.validate()?;

    if cli.dump_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let outputs = cli.outputs();
    check_spaces(&outputs, &config, cli.projection)?;
    if outputs.is_empty() && config.mask_out.is_none() && cli.report.is_none() {
        warn!("no output requested, tracing only");
    }

    let progress = ProgressManager::new(!cli.no_progress);

    let pb = progress.stage("reading raster");
    let raster = netpbm::read_pnm(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    pb.finish_and_clear();
    info!(
        input = %cli.input.display(),
        width = raster.width(),
        height = raster.height(),
        bands = raster.band_count(),
        "loaded raster"
    );

    let opts = PipelineOptions::from(&config);
    let pb = progress.stage("tracing");
    let features = trace_features(&raster, &config, &opts)?;
    pb.finish_and_clear();

    let projection = cli.projection.map(ProjectionName::build);
    for out in &outputs {
        write_output(out, &features, &config, projection.as_deref(), &progress)?;
    }

    if let Some(path) = &cli.report {
        write_report(path, &features)?;
    }

    let rings: usize = features.iter().map(|f| f.mpoly.len()).sum();
    info!(features = features.len(), rings, "done");
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose, cli.log_json) {
        eprintln!("Warning: {e:#}");
    }
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
