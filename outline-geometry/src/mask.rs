//! Mask building from raster bands
//!
//! The raster decoder itself lives outside this crate; anything that can
//! hand out rows of band values implements [`RasterSource`]. A mask is
//! either the set of data pixels (pixels not matched by any no-data range)
//! or, in classify mode, the set of pixels holding one 8-bit class value.

use std::str::FromStr;

use outline_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::bitgrid::BitGrid;

/// Row access to a raster. Bands are numbered from 1.
pub trait RasterSource: Sync {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn band_count(&self) -> usize;

    /// Fill `out` (`width()` values) with row `y` of `band`.
    fn read_row(&self, band: usize, y: usize, out: &mut [f64]) -> Result<()>;

    /// No-data value declared for `band`, if any.
    fn nodata(&self, _band: usize) -> Option<f64> {
        None
    }

    /// Palette color of `value` when `band` is palette indexed.
    fn palette_entry(&self, _band: usize, _value: u8) -> Option<[u8; 4]> {
        None
    }
}

/// In-memory raster, band-sequential.
#[derive(Debug, Clone, Default)]
pub struct MemRaster {
    w: usize,
    h: usize,
    bands: Vec<Vec<f64>>,
    nodata: Vec<Option<f64>>,
    palette: Option<Vec<[u8; 4]>>,
}

impl MemRaster {
    pub fn new(w: usize, h: usize, bands: Vec<Vec<f64>>) -> Result<Self> {
        for (i, band) in bands.iter().enumerate() {
            if band.len() != w * h {
                return Err(Error::invalid_input(format!(
                    "band {} has {} values, expected {}x{}",
                    i + 1,
                    band.len(),
                    w,
                    h
                )));
            }
        }
        let nodata = vec![None; bands.len()];
        Ok(Self {
            w,
            h,
            bands,
            nodata,
            palette: None,
        })
    }

    /// Single-band 8-bit raster.
    pub fn from_u8(w: usize, h: usize, values: &[u8]) -> Result<Self> {
        Self::new(w, h, vec![values.iter().map(|&v| f64::from(v)).collect()])
    }

    pub fn with_nodata(mut self, band: usize, value: f64) -> Self {
        if let Some(slot) = band.checked_sub(1).and_then(|b| self.nodata.get_mut(b)) {
            *slot = Some(value);
        }
        self
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 4]>) -> Self {
        self.palette = Some(palette);
        self
    }
}

impl RasterSource for MemRaster {
    fn width(&self) -> usize {
        self.w
    }

    fn height(&self) -> usize {
        self.h
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn read_row(&self, band: usize, y: usize, out: &mut [f64]) -> Result<()> {
        let data = band
            .checked_sub(1)
            .and_then(|b| self.bands.get(b))
            .ok_or_else(|| Error::invalid_input(format!("no band {band}")))?;
        if y >= self.h || out.len() != self.w {
            return Err(Error::invalid_input(format!(
                "row {y} (buffer {}) outside {}x{} raster",
                out.len(),
                self.w,
                self.h
            )));
        }
        out.copy_from_slice(&data[y * self.w..(y + 1) * self.w]);
        Ok(())
    }

    fn nodata(&self, band: usize) -> Option<f64> {
        band.checked_sub(1)
            .and_then(|b| self.nodata.get(b).copied().flatten())
    }

    fn palette_entry(&self, band: usize, value: u8) -> Option<[u8; 4]> {
        if band != 1 {
            return None;
        }
        self.palette.as_ref()?.get(usize::from(value)).copied()
    }
}

/// One no-data range: a closed interval per inspected band. A pixel
/// matches when every band value is inside its interval. A single interval
/// applies to every band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdvRange {
    pub bounds: Vec<(f64, f64)>,
}

impl NdvRange {
    pub fn matches(&self, values: &[f64]) -> bool {
        match self.bounds.as_slice() {
            [] => false,
            [(lo, hi)] => values.iter().all(|v| v >= lo && v <= hi),
            bounds => {
                bounds.len() == values.len()
                    && values
                        .iter()
                        .zip(bounds)
                        .all(|(v, (lo, hi))| v >= lo && v <= hi)
            }
        }
    }
}

impl FromStr for NdvRange {
    type Err = Error;

    /// Whitespace separated per-band values, each `v` or `min..max`,
    /// e.g. `"0"`, `"0 0 0"` or `"250..255 250..255 250..255"`.
    fn from_str(s: &str) -> Result<Self> {
        let parse = |t: &str| {
            t.trim().parse::<f64>().map_err(|e| {
                Error::invalid_input(format!("bad no-data value {t:?} in {s:?}: {e}"))
            })
        };
        let bounds = s
            .split_whitespace()
            .map(|tok| match tok.split_once("..") {
                Some((lo, hi)) => {
                    let (lo, hi) = (parse(lo)?, parse(hi)?);
                    if lo > hi {
                        return Err(Error::invalid_input(format!(
                            "empty no-data range {tok:?}"
                        )));
                    }
                    Ok((lo, hi))
                }
                None => parse(tok).map(|v| (v, v)),
            })
            .collect::<Result<Vec<_>>>()?;
        if bounds.is_empty() {
            return Err(Error::invalid_input("empty no-data definition"));
        }
        Ok(NdvRange { bounds })
    }
}

/// A set of no-data ranges. A pixel is no-data when any range matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NdvDef {
    pub ranges: Vec<NdvRange>,
}

impl NdvDef {
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_nodata(&self, values: &[f64]) -> bool {
        self.ranges.iter().any(|r| r.matches(values))
    }

    /// The per-band no-data values the raster declares. Bands without one
    /// make the rule impossible to match, so the result is then empty.
    pub fn from_raster(source: &dyn RasterSource, bands: &[usize]) -> Self {
        let bounds: Option<Vec<(f64, f64)>> = bands
            .iter()
            .map(|&b| source.nodata(b).map(|v| (v, v)))
            .collect();
        match bounds {
            Some(bounds) if !bounds.is_empty() => NdvDef {
                ranges: vec![NdvRange { bounds }],
            },
            _ => NdvDef::default(),
        }
    }
}

/// Builds masks from a raster source and a list of inspected bands.
pub struct MaskBuilder<'a> {
    source: &'a dyn RasterSource,
    bands: Vec<usize>,
}

impl<'a> MaskBuilder<'a> {
    /// `bands` empty means every band of the source.
    pub fn new(source: &'a dyn RasterSource, bands: &[usize]) -> Result<Self> {
        let count = source.band_count();
        let bands: Vec<usize> = if bands.is_empty() {
            (1..=count).collect()
        } else {
            bands.to_vec()
        };
        if let Some(&bad) = bands.iter().find(|&&b| b == 0 || b > count) {
            return Err(Error::invalid_input(format!(
                "band {bad} out of range (raster has {count} bands)"
            )));
        }
        if bands.is_empty() {
            return Err(Error::invalid_input("raster has no bands"));
        }
        Ok(Self { source, bands })
    }

    pub fn bands(&self) -> &[usize] {
        &self.bands
    }

    /// Data pixels under `ndv`, or under the raster's declared no-data
    /// values when `ndv` is `None` or empty.
    pub fn data_mask(&self, ndv: Option<&NdvDef>) -> Result<BitGrid> {
        let declared;
        let ndv = match ndv {
            Some(def) if !def.is_empty() => def,
            _ => {
                declared = NdvDef::from_raster(self.source, &self.bands);
                &declared
            }
        };

        let (w, h) = (self.source.width(), self.source.height());
        let mut grid = BitGrid::new(w, h);
        let mut rows = vec![vec![0.0; w]; self.bands.len()];
        let mut values = vec![0.0; self.bands.len()];
        for y in 0..h {
            for (row, &band) in rows.iter_mut().zip(&self.bands) {
                self.source.read_row(band, y, row)?;
            }
            for x in 0..w {
                for (v, row) in values.iter_mut().zip(&rows) {
                    *v = row[x];
                }
                if !ndv.is_nodata(&values) {
                    grid.set_bit(x, y);
                }
            }
        }
        tracing::debug!(
            w,
            h,
            bands = ?self.bands,
            ranges = ndv.ranges.len(),
            data_pixels = grid.count_set(),
            "built data mask"
        );
        Ok(grid)
    }

    /// Read the single inspected band as 8-bit classes.
    pub fn classes(&self) -> Result<ClassRaster> {
        let [band] = self.bands[..] else {
            return Err(Error::config(format!(
                "classify mode needs exactly one band, got {}",
                self.bands.len()
            )));
        };
        let (w, h) = (self.source.width(), self.source.height());
        let mut values = Vec::with_capacity(w * h);
        let mut row = vec![0.0; w];
        for y in 0..h {
            self.source.read_row(band, y, &mut row)?;
            for (x, &v) in row.iter().enumerate() {
                if v.fract() != 0.0 || !(0.0..=255.0).contains(&v) {
                    return Err(Error::invalid_input(format!(
                        "classify mode needs 8-bit values, found {v} at ({x}, {y})"
                    )));
                }
                values.push(v as u8);
            }
        }
        let palette = (0..=255u8)
            .map(|v| self.source.palette_entry(band, v))
            .collect();
        Ok(ClassRaster::new(w, h, values, palette))
    }
}

/// An 8-bit class raster with its usage table.
#[derive(Debug, Clone)]
pub struct ClassRaster {
    w: usize,
    h: usize,
    values: Vec<u8>,
    used: [bool; 256],
    palette: Vec<Option<[u8; 4]>>,
}

impl ClassRaster {
    fn new(w: usize, h: usize, values: Vec<u8>, palette: Vec<Option<[u8; 4]>>) -> Self {
        let mut used = [false; 256];
        for &v in &values {
            used[usize::from(v)] = true;
        }
        Self {
            w,
            h,
            values,
            used,
            palette,
        }
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    /// Class values present in the raster, ascending.
    pub fn used_classes(&self) -> Vec<u8> {
        (0..=255u8).filter(|&v| self.used[usize::from(v)]).collect()
    }

    pub fn color(&self, class: u8) -> Option<[u8; 4]> {
        self.palette.get(usize::from(class)).copied().flatten()
    }

    pub fn mask_for_class(&self, class: u8) -> BitGrid {
        BitGrid::from_fn(self.w, self.h, |x, y| self.values[y * self.w + x] == class)
    }
}
