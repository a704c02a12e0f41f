//! Coordinate reference systems, envelopes and envelope reprojection.
//!
//! An [`Envelope`] is a plain value: two [`AxisRange`]s plus the [`Crs`] they
//! are expressed in. Reprojection is an explicit pure function,
//! [`reproject`], that never mutates its input.
//!
//! Transformations use `proj4rs` with PROJ strings looked up in the
//! `crs-definitions` EPSG database. Coordinates are always in x/y order:
//! for geographic systems x is longitude and y is latitude, both in degrees.
//!
//! # Example
//!
//! ```ignore
//! use hotmap::{reproject, AxisRange, Crs, Envelope};
//!
//! // Area of interest in UTM zone 31N
//! let aoi = Envelope::new(
//!     Crs::from_epsg(32631),
//!     AxisRange::new(466_000.0, 467_000.0),
//!     AxisRange::new(5_427_000.0, 5_428_000.0),
//! )?;
//! let in_wgs84 = reproject(&aoi, Crs::WGS84)?;
//! ```

use std::fmt;
use std::str::FromStr;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::{HotmapError, Result};

/// Samples taken along each envelope edge (corners included) when reprojecting.
const EDGE_SAMPLES: usize = 21;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Crs(u32);

impl Crs {
    /// WGS 84 geographic coordinates (longitude/latitude in degrees).
    pub const WGS84: Crs = Crs(4326);

    /// WGS 84 / Pseudo-Mercator, the projection used by web map tiles.
    pub const WEB_MERCATOR: Crs = Crs(3857);

    /// Create a CRS from an EPSG code.
    pub const fn from_epsg(code: u32) -> Self {
        Crs(code)
    }

    /// Returns the EPSG code.
    pub const fn epsg(&self) -> u32 {
        self.0
    }

    /// PROJ definition string from the EPSG database, if the code is known.
    pub fn proj_string(&self) -> Option<&'static str> {
        u16::try_from(self.0)
            .ok()
            .and_then(crs_definitions::from_code)
            .map(|def| def.proj4)
    }

    /// Whether coordinates in this CRS are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        match self.proj_string() {
            Some(proj) => proj.contains("+proj=longlat"),
            // Geographic 2D codes live in the 4000-4999 block
            None => (4000..5000).contains(&self.0),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = HotmapError;

    /// Parse `"EPSG:4326"`, `"epsg:4326"` or a bare `"4326"`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => {
                return Err(HotmapError::UnknownCrs {
                    code: trimmed.to_string(),
                })
            }
            None => trimmed,
        };

        digits
            .trim()
            .parse::<u32>()
            .map(Crs)
            .map_err(|_| HotmapError::UnknownCrs {
                code: trimmed.to_string(),
            })
    }
}

/// A closed one-dimensional interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    /// Create a range. Validation happens in [`Envelope::new`].
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range spanning two values given in any order.
    pub fn spanning(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Length of the range.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    fn validate(&self, axis: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(HotmapError::InvalidEnvelope {
                reason: format!("{axis} range [{}, {}] is not finite", self.min, self.max),
            });
        }
        if self.min > self.max {
            return Err(HotmapError::InvalidEnvelope {
                reason: format!("{axis} range has min {} > max {}", self.min, self.max),
            });
        }
        Ok(())
    }
}

/// A rectangular area expressed in a coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    crs: Crs,
    x: AxisRange,
    y: AxisRange,
}

impl Envelope {
    /// Create an envelope, rejecting non-finite bounds and ranges with min > max.
    pub fn new(crs: Crs, x: AxisRange, y: AxisRange) -> Result<Self> {
        x.validate("x")?;
        y.validate("y")?;
        Ok(Self { crs, x, y })
    }

    /// Create an envelope from two opposite corners given in any order.
    pub fn from_corners(crs: Crs, a: (f64, f64), b: (f64, f64)) -> Result<Self> {
        Self::new(
            crs,
            AxisRange::spanning(a.0, b.0),
            AxisRange::spanning(a.1, b.1),
        )
    }

    /// Envelope from two corners already known to be finite.
    pub(crate) fn spanning(crs: Crs, a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            crs,
            x: AxisRange::spanning(a.0, b.0),
            y: AxisRange::spanning(a.1, b.1),
        }
    }

    /// The envelope's coordinate reference system.
    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Range along the first axis (easting / longitude).
    pub fn x(&self) -> AxisRange {
        self.x
    }

    /// Range along the second axis (northing / latitude).
    pub fn y(&self) -> AxisRange {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.x.span()
    }

    pub fn height(&self) -> f64 {
        self.y.span()
    }

    /// Whether the point lies inside or on the boundary.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x.min && x <= self.x.max && y >= self.y.min && y <= self.y.max
    }

    /// Whether the two envelopes share an area of positive size.
    ///
    /// Envelopes that only touch along an edge do not intersect. Both must be
    /// in the same CRS; envelopes in different systems never intersect.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.crs == other.crs
            && self.x.min < other.x.max
            && self.x.max > other.x.min
            && self.y.min < other.y.max
            && self.y.max > other.y.min
    }

    /// The overlapping area, or `None` if the envelopes do not intersect.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }
        Some(Envelope {
            crs: self.crs,
            x: AxisRange::new(self.x.min.max(other.x.min), self.x.max.min(other.x.max)),
            y: AxisRange::new(self.y.min.max(other.y.min), self.y.max.min(other.y.max)),
        })
    }

    /// Corner coordinates `[min_x, min_y, max_x, max_y]`.
    pub fn bounds(&self) -> [f64; 4] {
        [self.x.min, self.y.min, self.x.max, self.y.max]
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [x: {}..{}, y: {}..{}]",
            self.crs, self.x.min, self.x.max, self.y.min, self.y.max
        )
    }
}

/// A prepared transformation between two coordinate reference systems.
///
/// Parsing the PROJ definitions happens once in [`CrsTransform::new`], so
/// transforming many points (e.g. a densified envelope) stays cheap.
pub struct CrsTransform {
    from: Crs,
    to: Crs,
    source: Option<Proj>,
    target: Option<Proj>,
    source_geographic: bool,
    target_geographic: bool,
}

impl CrsTransform {
    /// Prepare a transform from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`HotmapError::Reprojection`] if either CRS has no known
    /// definition or its definition cannot be parsed.
    pub fn new(from: Crs, to: Crs) -> Result<Self> {
        if from == to {
            return Ok(Self {
                from,
                to,
                source: None,
                target: None,
                source_geographic: false,
                target_geographic: false,
            });
        }

        let source = Self::load(from, to, from)?;
        let target = Self::load(from, to, to)?;

        Ok(Self {
            from,
            to,
            source: Some(source),
            target: Some(target),
            source_geographic: from.is_geographic(),
            target_geographic: to.is_geographic(),
        })
    }

    fn load(from: Crs, to: Crs, crs: Crs) -> Result<Proj> {
        let definition = crs.proj_string().ok_or_else(|| HotmapError::Reprojection {
            from,
            to,
            reason: format!("{crs} is not in the EPSG definition database"),
        })?;
        Proj::from_proj_string(definition).map_err(|e| HotmapError::Reprojection {
            from,
            to,
            reason: format!("invalid definition for {crs}: {e:?}"),
        })
    }

    /// Transform a single coordinate.
    pub fn apply(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (source, target) = match (&self.source, &self.target) {
            (Some(source), Some(target)) => (source, target),
            _ => return Ok((x, y)),
        };

        // proj4rs works in radians for geographic systems
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(source, target, &mut point).map_err(|e| HotmapError::Reprojection {
            from: self.from,
            to: self.to,
            reason: format!("transform of ({x}, {y}) failed: {e:?}"),
        })?;

        let (out_x, out_y) = if self.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(HotmapError::Reprojection {
                from: self.from,
                to: self.to,
                reason: format!("({x}, {y}) has no finite image in {}", self.to),
            });
        }

        Ok((out_x, out_y))
    }
}

/// Project a single point between two coordinate reference systems.
pub fn project_point(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64)> {
    CrsTransform::new(from, to)?.apply(x, y)
}

/// Reproject an envelope into `target`.
///
/// The edges are densified before projecting, so curved edges in the target
/// system are still fully enclosed by the result. Returns the input unchanged
/// when it is already in `target`.
///
/// # Errors
///
/// Returns [`HotmapError::Reprojection`] if no valid transform exists or any
/// sampled point has no finite image in `target`.
pub fn reproject(envelope: &Envelope, target: Crs) -> Result<Envelope> {
    if envelope.crs == target {
        return Ok(*envelope);
    }

    let transform = CrsTransform::new(envelope.crs, target)?;

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for (x, y) in edge_samples(envelope) {
        let (px, py) = transform.apply(x, y)?;
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
    }

    Envelope::new(
        target,
        AxisRange::new(min_x, max_x),
        AxisRange::new(min_y, max_y),
    )
}

/// Points along the boundary of an envelope, corners included.
fn edge_samples(envelope: &Envelope) -> impl Iterator<Item = (f64, f64)> + '_ {
    let steps = (EDGE_SAMPLES - 1) as f64;
    (0..EDGE_SAMPLES).flat_map(move |i| {
        let t = i as f64 / steps;
        let x = envelope.x.min + t * envelope.width();
        let y = envelope.y.min + t * envelope.height();
        [
            (x, envelope.y.min),
            (x, envelope.y.max),
            (envelope.x.min, y),
            (envelope.x.max, y),
        ]
    })
}
