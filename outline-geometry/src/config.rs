//! Run configuration
//!
//! Every tunable of a trace run, loadable from TOML. Missing keys take
//! their defaults, so a config file only needs the values it changes.

use std::path::{Path, PathBuf};

use outline_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::georef::Affine;
use crate::mask::{NdvDef, NdvRange};
use crate::pinch::PinchParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// One feature per 8-bit class value instead of a single data mask
    #[serde(default)]
    pub classify: bool,
    /// Inspected bands (1-based); empty means all bands, or band 1 when
    /// classifying
    #[serde(default)]
    pub bands: Vec<usize>,
    /// No-data ranges, e.g. `"0"` or `"250..255 250..255 250..255"`
    #[serde(default)]
    pub nodata: Vec<String>,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub erosion: bool,
    /// Keep only the largest ring
    #[serde(default)]
    pub major_ring: bool,
    /// Drop holes (top-level rings only)
    #[serde(default)]
    pub no_donuts: bool,
    #[serde(default)]
    pub min_ring_area: f64,
    /// Douglas-Peucker tolerance in pixels
    #[serde(default = "default_dp_toler")]
    pub dp_toler: f64,
    /// Bevel fraction in `[0, 1)`
    #[serde(default = "default_bevel_size")]
    pub bevel_size: f64,
    #[serde(default)]
    pub pinch_excursions: bool,
    #[serde(default)]
    pub pinch: PinchParams,
    /// Geographic subdivision tolerance in pixels
    #[serde(default = "default_llproj_toler")]
    pub llproj_toler: f64,
    /// One polygon per exterior ring instead of one multipolygon per feature
    #[serde(default)]
    pub split_polys: bool,
    /// Pixel to projected transform
    #[serde(default)]
    pub geotransform: Option<Affine>,
    /// Rasterized outline written as PBM
    #[serde(default)]
    pub mask_out: Option<PathBuf>,
}

fn default_dp_toler() -> f64 {
    2.0
}

fn default_bevel_size() -> f64 {
    0.1
}

fn default_llproj_toler() -> f64 {
    1.0
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            classify: false,
            bands: Vec::new(),
            nodata: Vec::new(),
            invert: false,
            erosion: false,
            major_ring: false,
            no_donuts: false,
            min_ring_area: 0.0,
            dp_toler: default_dp_toler(),
            bevel_size: default_bevel_size(),
            pinch_excursions: false,
            pinch: PinchParams::default(),
            llproj_toler: default_llproj_toler(),
            split_polys: false,
            geotransform: None,
            mask_out: None,
        }
    }
}

impl TraceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Parsed no-data rules.
    pub fn ndv(&self) -> Result<NdvDef> {
        let ranges = self
            .nodata
            .iter()
            .map(|s| s.parse::<NdvRange>())
            .collect::<Result<Vec<_>>>()?;
        Ok(NdvDef { ranges })
    }

    /// Reject out-of-range values and option combinations that make no
    /// sense together.
    pub fn validate(&self) -> Result<()> {
        let range = |ok: bool, msg: String| if ok { Ok(()) } else { Err(Error::config(msg)) };

        range(
            (0.0..1.0).contains(&self.bevel_size),
            format!("bevel_size must be in [0, 1), got {}", self.bevel_size),
        )?;
        range(
            self.dp_toler >= 0.0,
            format!("dp_toler must be >= 0, got {}", self.dp_toler),
        )?;
        range(
            self.llproj_toler > 0.0,
            format!("llproj_toler must be > 0, got {}", self.llproj_toler),
        )?;
        range(
            self.min_ring_area >= 0.0,
            format!("min_ring_area must be >= 0, got {}", self.min_ring_area),
        )?;

        if self.major_ring && self.min_ring_area > 0.0 {
            return Err(Error::config(
                "major_ring and min_ring_area cannot both be used",
            ));
        }
        if self.major_ring && self.no_donuts {
            return Err(Error::config("major_ring and no_donuts cannot both be used"));
        }

        if self.classify {
            if !self.nodata.is_empty() {
                return Err(Error::config("classify is not compatible with nodata rules"));
            }
            if self.invert {
                return Err(Error::config("classify is not compatible with invert"));
            }
            if self.mask_out.is_some() {
                return Err(Error::config("classify is not compatible with mask_out"));
            }
            if self.bands.len() > 1 {
                return Err(Error::config("only one band may be used in classify mode"));
            }
        }

        self.ndv()?;
        Ok(())
    }

    /// Bands handed to the mask builder.
    pub fn effective_bands(&self) -> Vec<usize> {
        if self.classify && self.bands.is_empty() {
            vec![1]
        } else {
            self.bands.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TraceConfig::default();
        assert_eq!(config.dp_toler, 2.0);
        assert_eq!(config.bevel_size, 0.1);
        assert_eq!(config.llproj_toler, 1.0);
        assert!(config.validate().is_ok());
        assert_eq!(TraceConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_partial_toml() {
        let config = TraceConfig::from_toml_str(
            r#"
            no_donuts = true
            dp_toler = 0.5
            nodata = ["0", "250..255"]
            geotransform = [100.0, 10.0, 0.0, 200.0, 0.0, -10.0]

            [pinch]
            max_neck = 2.0
            "#,
        )
        .unwrap();
        assert!(config.no_donuts);
        assert_eq!(config.dp_toler, 0.5);
        assert_eq!(config.bevel_size, 0.1);
        assert_eq!(config.pinch.max_neck, 2.0);
        assert_eq!(config.pinch.max_run, 24);
        assert_eq!(config.ndv().unwrap().ranges.len(), 2);
        assert_eq!(
            config.geotransform,
            Some(Affine([100.0, 10.0, 0.0, 200.0, 0.0, -10.0]))
        );
        assert!(config.validate().is_ok());

        let again = TraceConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = |f: fn(&mut TraceConfig)| {
            let mut config = TraceConfig::default();
            f(&mut config);
            assert!(
                matches!(config.validate(), Err(Error::Config(_)) | Err(Error::InvalidInput(_))),
                "{config:?} should be rejected"
            );
        };
        bad(|c| c.bevel_size = 1.0);
        bad(|c| c.bevel_size = -0.5);
        bad(|c| c.dp_toler = -1.0);
        bad(|c| c.llproj_toler = 0.0);
        bad(|c| c.min_ring_area = f64::NAN);
        bad(|c| {
            c.major_ring = true;
            c.min_ring_area = 4.0;
        });
        bad(|c| {
            c.major_ring = true;
            c.no_donuts = true;
        });
        bad(|c| {
            c.classify = true;
            c.invert = true;
        });
        bad(|c| {
            c.classify = true;
            c.nodata = vec!["0".into()];
        });
        bad(|c| {
            c.classify = true;
            c.mask_out = Some(PathBuf::from("mask.pbm"));
        });
        bad(|c| {
            c.classify = true;
            c.bands = vec![1, 2];
        });
        bad(|c| c.nodata = vec!["x".into()]);
    }

    #[test]
    fn test_unknown_toml_value_type() {
        assert!(matches!(
            TraceConfig::from_toml_str("dp_toler = \"wide\""),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_effective_bands() {
        let mut config = TraceConfig::default();
        assert!(config.effective_bands().is_empty());
        config.classify = true;
        assert_eq!(config.effective_bands(), vec![1]);
    }
}
