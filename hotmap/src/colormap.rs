//! Colour ramps for rendering heatmap cells.

use std::fmt;
use std::str::FromStr;

/// Available colormaps for heatmap visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colormap {
    /// Blue -> Cyan -> Green -> Yellow -> Red
    #[default]
    Jet,
    /// Purple -> Blue -> Green -> Yellow
    Viridis,
    /// Blue -> Cyan -> Green -> Yellow -> Orange -> Red
    Turbo,
}

const VIRIDIS: [(f64, f64, f64); 5] = [
    (0.267004, 0.004874, 0.329415),
    (0.282623, 0.140926, 0.457517),
    (0.163625, 0.471133, 0.558148),
    (0.477504, 0.821444, 0.318195),
    (0.993248, 0.906157, 0.143936),
];

const TURBO: [(f64, f64, f64); 6] = [
    (0.18995, 0.07176, 0.23217),
    (0.11770, 0.56700, 0.75088),
    (0.17205, 0.88797, 0.54362),
    (0.89567, 0.99343, 0.29685),
    (0.97809, 0.55414, 0.10540),
    (0.78801, 0.08080, 0.06051),
];

impl Colormap {
    pub fn name(&self) -> &'static str {
        match self {
            Colormap::Jet => "jet",
            Colormap::Viridis => "viridis",
            Colormap::Turbo => "turbo",
        }
    }

    /// Map a normalized value in `[0.0, 1.0]` to an RGB colour.
    ///
    /// Values outside the range are clamped; NaN maps to the low end.
    pub fn map(&self, value: f64) -> (u8, u8, u8) {
        let v = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };

        match self {
            Colormap::Jet => jet(v),
            Colormap::Viridis => interpolate(&VIRIDIS, v),
            Colormap::Turbo => interpolate(&TURBO, v),
        }
    }

    /// Colour of `value` within `[min, max]`.
    pub fn map_range(&self, value: f64, min: f64, max: f64) -> (u8, u8, u8) {
        let span = max - min;
        let normalized = if span > 0.0 { (value - min) / span } else { 0.5 };
        self.map(normalized)
    }

    /// `#rrggbb` colour of a normalized value.
    pub fn hex(&self, value: f64) -> String {
        let (r, g, b) = self.map(value);
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Colormap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jet" => Ok(Colormap::Jet),
            "viridis" => Ok(Colormap::Viridis),
            "turbo" => Ok(Colormap::Turbo),
            other => Err(format!(
                "unknown colormap '{other}' (expected jet, viridis or turbo)"
            )),
        }
    }
}

fn to_rgb(r: f64, g: f64, b: f64) -> (u8, u8, u8) {
    ((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

fn jet(v: f64) -> (u8, u8, u8) {
    let r = if v < 0.375 {
        0.0
    } else if v < 0.625 {
        (v - 0.375) / 0.25
    } else if v < 0.875 {
        1.0
    } else {
        1.0 - (v - 0.875) / 0.125 * 0.5
    };

    let g = if v < 0.125 {
        0.0
    } else if v < 0.375 {
        (v - 0.125) / 0.25
    } else if v < 0.625 {
        1.0
    } else if v < 0.875 {
        1.0 - (v - 0.625) / 0.25
    } else {
        0.0
    };

    let b = if v < 0.125 {
        0.5 + v / 0.125 * 0.5
    } else if v < 0.375 {
        1.0
    } else if v < 0.625 {
        1.0 - (v - 0.375) / 0.25
    } else {
        0.0
    };

    to_rgb(r, g, b)
}

/// Piecewise-linear interpolation between evenly spaced control points.
fn interpolate(points: &[(f64, f64, f64)], v: f64) -> (u8, u8, u8) {
    let last = points.len() - 1;
    let idx = v * last as f64;
    let i = idx.floor() as usize;
    if i >= last {
        let (r, g, b) = points[last];
        return to_rgb(r, g, b);
    }

    let t = idx - i as f64;
    let (r0, g0, b0) = points[i];
    let (r1, g1, b1) = points[i + 1];
    to_rgb(r0 + t * (r1 - r0), g0 + t * (g1 - g0), b0 + t * (b1 - b0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_ends() {
        assert_eq!(Colormap::Jet.map(0.0), (0, 0, 127));
        assert_eq!(Colormap::Jet.map(1.0), (127, 0, 0));
        assert_eq!(Colormap::Jet.map(0.5), (127, 255, 127));
    }

    #[test]
    fn test_clamping_and_nan() {
        assert_eq!(Colormap::Viridis.map(-3.0), Colormap::Viridis.map(0.0));
        assert_eq!(Colormap::Viridis.map(7.0), Colormap::Viridis.map(1.0));
        assert_eq!(Colormap::Turbo.map(f64::NAN), Colormap::Turbo.map(0.0));
    }

    #[test]
    fn test_hex() {
        assert_eq!(Colormap::Viridis.hex(1.0), "#fde724");
        assert_eq!(Colormap::Jet.hex(0.0), "#00007f");
    }

    #[test]
    fn test_map_range_degenerate_span() {
        assert_eq!(
            Colormap::Turbo.map_range(5.0, 5.0, 5.0),
            Colormap::Turbo.map(0.5)
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("Turbo".parse::<Colormap>().unwrap(), Colormap::Turbo);
        assert!("rainbow".parse::<Colormap>().is_err());
    }
}
