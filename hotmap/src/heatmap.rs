//! Bucketing point samples into a uniform grid.
//!
//! A point at `(x, y)` falls into cell `(floor(x / resolution),
//! floor(y / resolution))`. All values that land in one cell are combined by a
//! [`Reducer`] (arithmetic mean unless configured otherwise). The result is a
//! [`Heatmap`] that borrows the points it was built from and answers cell
//! lookups from a precomputed map.
//!
//! # Example
//!
//! ```
//! use hotmap::{DataPoint, Heatmap};
//!
//! let points = [DataPoint::new(0.5, 0.5, 10.0), DataPoint::new(1.2, 0.4, 20.0)];
//! let heatmap = Heatmap::build(&points, 2.0).unwrap();
//! assert_eq!(heatmap.cell_value(0, 0), Some(15.0));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{HotmapError, Result};

/// A geo-located scalar sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    x: f64,
    y: f64,
    value: f64,
}

impl DataPoint {
    pub const fn new(x: f64, y: f64, value: f64) -> Self {
        Self { x, y, value }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether coordinates and value are all finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.value.is_finite()
    }
}

/// Integer coordinates of a heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl CellKey {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// The cell containing `(x, y)` at the given resolution.
    ///
    /// `None` when either index is not finite or does not fit in an `i64`.
    pub fn for_point(x: f64, y: f64, resolution: f64) -> Option<Self> {
        Some(Self {
            x: cell_index(x / resolution)?,
            y: cell_index(y / resolution)?,
        })
    }
}

fn cell_index(scaled: f64) -> Option<i64> {
    let index = scaled.floor();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    (index >= i64::MIN as f64 && index < i64::MAX as f64).then_some(index as i64)
}

/// How the values that fall into one cell are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reducer {
    #[default]
    Mean,
    Sum,
    Min,
    Max,
    Count,
}

impl Reducer {
    pub const ALL: [Reducer; 5] = [
        Reducer::Mean,
        Reducer::Sum,
        Reducer::Min,
        Reducer::Max,
        Reducer::Count,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Count => "count",
        }
    }

    /// Combine the values of one cell. `sorted` must be non-empty and sorted.
    pub(crate) fn reduce(&self, sorted: &[f64]) -> f64 {
        match self {
            Reducer::Mean => {
                let n = sorted.len() as f64;
                let sum: f64 = sorted.iter().sum();
                if sum.is_finite() {
                    sum / n
                } else {
                    sorted.iter().map(|v| v / n).sum()
                }
            }
            Reducer::Sum => sorted.iter().sum(),
            Reducer::Min => sorted[0],
            Reducer::Max => sorted[sorted.len() - 1],
            Reducer::Count => sorted.len() as f64,
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Reducer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(Reducer::Mean),
            "sum" => Ok(Reducer::Sum),
            "min" => Ok(Reducer::Min),
            "max" => Ok(Reducer::Max),
            "count" => Ok(Reducer::Count),
            other => Err(format!(
                "unknown reducer '{other}' (expected mean, sum, min, max or count)"
            )),
        }
    }
}

/// Resolution-bucketed aggregation of a set of points.
///
/// The heatmap borrows its points; rebuilding it is the only way to reflect
/// a change in either the points or the resolution.
#[derive(Debug, Clone)]
pub struct Heatmap<'a> {
    points: &'a [DataPoint],
    resolution: f64,
    reducer: Reducer,
    cells: BTreeMap<CellKey, f64>,
    skipped: usize,
}

impl<'a> Heatmap<'a> {
    /// Build a heatmap that averages the values in each cell.
    ///
    /// # Errors
    ///
    /// Returns [`HotmapError::InvalidResolution`] if `resolution` is not a
    /// positive finite number, and [`HotmapError::CellOutOfRange`] if a point
    /// is so far out that its cell index overflows `i64`.
    pub fn build(points: &'a [DataPoint], resolution: f64) -> Result<Self> {
        Self::build_with(points, resolution, Reducer::Mean)
    }

    /// Build a heatmap with an explicit reducer.
    ///
    /// Points with a non-finite coordinate or value are skipped and counted
    /// in [`skipped`](Self::skipped). The result does not depend on the order
    /// of `points`: each cell's values are sorted before they are reduced.
    pub fn build_with(points: &'a [DataPoint], resolution: f64, reducer: Reducer) -> Result<Self> {
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(HotmapError::InvalidResolution { resolution });
        }

        let mut buckets: BTreeMap<CellKey, Vec<f64>> = BTreeMap::new();
        let mut skipped = 0;

        for point in points {
            if !point.is_finite() {
                skipped += 1;
                continue;
            }
            let key = CellKey::for_point(point.x, point.y, resolution).ok_or_else(|| {
                HotmapError::CellOutOfRange {
                    x: point.x,
                    y: point.y,
                    resolution,
                }
            })?;
            buckets.entry(key).or_default().push(point.value);
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} non-finite points of {}", skipped, points.len());
        }

        let cells: BTreeMap<CellKey, f64> = buckets
            .into_iter()
            .map(|(key, mut values)| {
                values.sort_by(f64::total_cmp);
                (key, reducer.reduce(&values))
            })
            .collect();

        tracing::debug!(
            "Built {} heatmap: {} points into {} cells at resolution {}",
            reducer,
            points.len() - skipped,
            cells.len(),
            resolution
        );

        Ok(Self {
            points,
            resolution,
            reducer,
            cells,
            skipped,
        })
    }

    /// Aggregate value of cell `(x, y)`, if any point fell into it.
    pub fn cell_value(&self, x: i64, y: i64) -> Option<f64> {
        self.get(CellKey::new(x, y))
    }

    pub fn get(&self, key: CellKey) -> Option<f64> {
        self.cells.get(&key).copied()
    }

    /// Aggregate value of the cell containing the world position `(x, y)`.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        CellKey::for_point(x, y, self.resolution).and_then(|key| self.get(key))
    }

    /// Populated cells ordered by `(x, y)`.
    pub fn cells(&self) -> impl ExactSizeIterator<Item = (CellKey, f64)> + '_ {
        self.cells.iter().map(|(key, value)| (*key, *value))
    }

    /// Number of populated cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The points the heatmap was built from.
    pub fn points(&self) -> &'a [DataPoint] {
        self.points
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn reducer(&self) -> Reducer {
        self.reducer
    }

    /// Points left out because a coordinate or the value was not finite.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Smallest and largest cell value.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.cells.values().fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// World bounds `[min_x, min_y, max_x, max_y]` of a cell.
    pub fn cell_bounds(&self, key: CellKey) -> [f64; 4] {
        let r = self.resolution;
        [
            key.x as f64 * r,
            key.y as f64 * r,
            (key.x as f64 + 1.0) * r,
            (key.y as f64 + 1.0) * r,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_points_in_one_cell_average() {
        let points = [DataPoint::new(0.5, 0.5, 10.0), DataPoint::new(1.2, 0.4, 20.0)];
        // With resolution 1 the second point is in cell (1, 0)
        let heatmap = Heatmap::build(&points, 1.0).unwrap();
        assert_eq!(heatmap.cell_value(0, 0), Some(10.0));
        assert_eq!(heatmap.cell_value(1, 0), Some(20.0));

        let heatmap = Heatmap::build(&points, 2.0).unwrap();
        assert_eq!(heatmap.len(), 1);
        assert_eq!(heatmap.cell_value(0, 0), Some(15.0));
    }

    #[test]
    fn test_bucketing_floors_negative_coordinates() {
        assert_eq!(CellKey::for_point(-0.5, 0.5, 1.0), Some(CellKey::new(-1, 0)));
        assert_eq!(CellKey::for_point(-1.0, -1.0, 1.0), Some(CellKey::new(-1, -1)));
        assert_eq!(CellKey::for_point(250.0, 99.9, 100.0), Some(CellKey::new(2, 0)));
    }

    #[test]
    fn test_empty_points_give_empty_heatmap() {
        let heatmap = Heatmap::build(&[], 5.0).unwrap();
        assert!(heatmap.is_empty());
        assert_eq!(heatmap.cells().count(), 0);
        assert_eq!(heatmap.value_range(), None);
    }

    #[test]
    fn test_invalid_resolution() {
        let points = [DataPoint::new(0.0, 0.0, 1.0)];
        for resolution in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Heatmap::build(&points, resolution),
                Err(HotmapError::InvalidResolution { .. })
            ));
        }
    }

    #[test]
    fn test_order_independence_is_exact() {
        let points: Vec<DataPoint> = (0..200)
            .map(|i| {
                let f = i as f64;
                DataPoint::new((f * 7.3) % 50.0, (f * 3.1) % 50.0, 0.1 * f + 1e-7 * f * f)
            })
            .collect();
        let mut reversed = points.clone();
        reversed.reverse();
        let mut rotated = points.clone();
        rotated.rotate_left(77);

        let a: Vec<_> = Heatmap::build(&points, 10.0).unwrap().cells().collect();
        let b: Vec<_> = Heatmap::build(&reversed, 10.0).unwrap().cells().collect();
        let c: Vec<_> = Heatmap::build(&rotated, 10.0).unwrap().cells().collect();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_reducers() {
        let points = [
            DataPoint::new(0.1, 0.1, 4.0),
            DataPoint::new(0.2, 0.2, 1.0),
            DataPoint::new(0.3, 0.3, 7.0),
        ];
        let value = |reducer| {
            Heatmap::build_with(&points, 1.0, reducer)
                .unwrap()
                .cell_value(0, 0)
        };
        assert_eq!(value(Reducer::Mean), Some(4.0));
        assert_eq!(value(Reducer::Sum), Some(12.0));
        assert_eq!(value(Reducer::Min), Some(1.0));
        assert_eq!(value(Reducer::Max), Some(7.0));
        assert_eq!(value(Reducer::Count), Some(3.0));
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let points = [
            DataPoint::new(0.5, 0.5, 1.0),
            DataPoint::new(f64::NAN, 0.5, 2.0),
            DataPoint::new(0.5, 0.5, f64::INFINITY),
        ];
        let heatmap = Heatmap::build(&points, 1.0).unwrap();
        assert_eq!(heatmap.skipped(), 2);
        assert_eq!(heatmap.cell_value(0, 0), Some(1.0));
        assert_eq!(heatmap.points().len(), 3);
    }

    #[test]
    fn test_far_points_do_not_share_a_saturated_cell() {
        let points = [DataPoint::new(1e19, 0.0, 1.0), DataPoint::new(5e19, 0.0, 3.0)];
        assert!(matches!(
            Heatmap::build(&points, 1.0),
            Err(HotmapError::CellOutOfRange { x, .. }) if x == 1e19
        ));

        // The same points fit once the resolution is coarse enough
        let heatmap = Heatmap::build(&points, 1e10).unwrap();
        assert_eq!(heatmap.len(), 2);
        assert_eq!(heatmap.cell_value(1_000_000_000, 0), Some(1.0));
        assert_eq!(heatmap.cell_value(5_000_000_000, 0), Some(3.0));

        assert_eq!(CellKey::for_point(-9.3e18, 0.0, 1.0), None);
        assert_eq!(CellKey::for_point(0.0, 1.0, f64::MIN_POSITIVE), None);
    }

    #[test]
    fn test_cell_bounds_at_largest_index() {
        let heatmap = Heatmap::build(&[], 1.0).unwrap();
        let key = CellKey::new(i64::MAX, i64::MIN);
        let [min_x, min_y, max_x, max_y] = heatmap.cell_bounds(key);
        assert!(max_x >= min_x);
        assert!(max_y >= min_y);
        assert_eq!(heatmap.value_at(f64::MAX, 0.0), None);
    }

    #[test]
    fn test_mean_of_huge_values_stays_finite() {
        let points = [
            DataPoint::new(0.5, 0.5, f64::MAX),
            DataPoint::new(0.5, 0.5, f64::MAX),
        ];
        let heatmap = Heatmap::build(&points, 1.0).unwrap();
        assert_eq!(heatmap.cell_value(0, 0), Some(f64::MAX));

        let points = [
            DataPoint::new(0.5, 0.5, f64::MAX),
            DataPoint::new(0.5, 0.5, f64::MAX / 2.0),
        ];
        let mean = Heatmap::build(&points, 1.0).unwrap().cell_value(0, 0).unwrap();
        assert!(mean.is_finite());
        assert!(mean > f64::MAX / 2.0);
    }

    #[test]
    fn test_reducer_parse_and_display() {
        assert_eq!("MEAN".parse::<Reducer>().unwrap(), Reducer::Mean);
        assert_eq!("avg".parse::<Reducer>().unwrap(), Reducer::Mean);
        assert_eq!("count".parse::<Reducer>().unwrap(), Reducer::Count);
        assert!("median".parse::<Reducer>().is_err());
        for reducer in Reducer::ALL {
            assert_eq!(reducer.to_string().parse::<Reducer>().unwrap(), reducer);
        }
        assert_eq!(Reducer::default(), Reducer::Mean);
    }

    #[test]
    fn test_cell_bounds_and_lookup() {
        let points = [DataPoint::new(25.0, -5.0, 3.0)];
        let heatmap = Heatmap::build(&points, 10.0).unwrap();
        let (key, _) = heatmap.cells().next().unwrap();
        assert_eq!(key, CellKey::new(2, -1));
        assert_eq!(heatmap.cell_bounds(key), [20.0, -10.0, 30.0, 0.0]);
        assert_eq!(heatmap.value_at(29.9, -0.1), Some(3.0));
        assert_eq!(heatmap.value_at(30.0, -0.1), None);
        assert_eq!(heatmap.value_range(), Some((3.0, 3.0)));
    }
}
