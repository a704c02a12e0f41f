//! GeoJSON export of heatmaps and envelopes.
//!
//! Enable the `geojson` feature to use this module.
//!
//! # Example
//!
//! ```ignore
//! use hotmap::geojson::heatmap_to_wgs84_feature_collection;
//! use hotmap::{Colormap, Crs, Heatmap};
//!
//! let heatmap = Heatmap::build(&points, 100.0)?;
//! let collection =
//!     heatmap_to_wgs84_feature_collection(&heatmap, Colormap::Viridis, Crs::from_epsg(25833))?;
//! println!("{}", collection);
//! ```

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value as GeoJsonValue};

use crate::colormap::Colormap;
use crate::crs::{Crs, CrsTransform, Envelope};
use crate::error::Result;
use crate::heatmap::{CellKey, Heatmap};

/// One polygon feature per heatmap cell, in the points' own coordinates.
///
/// Properties: `cell_x`, `cell_y`, `value` and `color` (`#rrggbb`, scaled
/// over the heatmap's value range).
pub fn heatmap_to_feature_collection(heatmap: &Heatmap, colormap: Colormap) -> FeatureCollection {
    let features = heatmap
        .cells()
        .map(|(key, value)| {
            let [min_x, min_y, max_x, max_y] = heatmap.cell_bounds(key);
            let ring = vec![
                vec![min_x, min_y],
                vec![max_x, min_y],
                vec![max_x, max_y],
                vec![min_x, max_y],
                vec![min_x, min_y],
            ];
            cell_feature(heatmap, colormap, key, value, ring)
        })
        .collect();

    collection(features)
}

/// Like [`heatmap_to_feature_collection`], with cell corners projected from
/// `crs` to WGS 84 longitude/latitude for web map clients.
pub fn heatmap_to_wgs84_feature_collection(
    heatmap: &Heatmap,
    colormap: Colormap,
    crs: Crs,
) -> Result<FeatureCollection> {
    let transform = CrsTransform::new(crs, Crs::WGS84)?;

    let features = heatmap
        .cells()
        .map(|(key, value)| {
            let [min_x, min_y, max_x, max_y] = heatmap.cell_bounds(key);
            let ring = [
                (min_x, min_y),
                (max_x, min_y),
                (max_x, max_y),
                (min_x, max_y),
                (min_x, min_y),
            ]
            .into_iter()
            .map(|(x, y)| transform.apply(x, y).map(|(lon, lat)| vec![lon, lat]))
            .collect::<Result<Vec<_>>>()?;
            Ok(cell_feature(heatmap, colormap, key, value, ring))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(collection(features))
}

/// Footprint polygon of an envelope, with its CRS as the `crs` property.
pub fn envelope_to_feature(envelope: &Envelope) -> Feature {
    let [min_x, min_y, max_x, max_y] = envelope.bounds();
    let ring = vec![
        vec![min_x, min_y],
        vec![max_x, min_y],
        vec![max_x, max_y],
        vec![min_x, max_y],
        vec![min_x, min_y],
    ];

    let mut properties = JsonObject::new();
    properties.insert(
        "crs".to_string(),
        JsonValue::from(envelope.crs().to_string()),
    );

    Feature {
        bbox: Some(vec![min_x, min_y, max_x, max_y]),
        geometry: Some(Geometry::new(GeoJsonValue::Polygon(vec![ring]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn cell_feature(
    heatmap: &Heatmap,
    colormap: Colormap,
    key: CellKey,
    value: f64,
    ring: Vec<Vec<f64>>,
) -> Feature {
    let color = match heatmap.value_range() {
        Some((min, max)) => {
            let (r, g, b) = colormap.map_range(value, min, max);
            format!("#{r:02x}{g:02x}{b:02x}")
        }
        None => colormap.hex(0.5),
    };

    let mut properties = JsonObject::new();
    properties.insert("cell_x".to_string(), JsonValue::from(key.x));
    properties.insert("cell_y".to_string(), JsonValue::from(key.y));
    properties.insert("value".to_string(), JsonValue::from(value));
    properties.insert("color".to_string(), JsonValue::from(color));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoJsonValue::Polygon(vec![ring]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::AxisRange;
    use crate::heatmap::DataPoint;

    #[test]
    fn test_cells_become_polygons() {
        let points = [
            DataPoint::new(5.0, 5.0, 1.0),
            DataPoint::new(15.0, 5.0, 3.0),
        ];
        let heatmap = Heatmap::build(&points, 10.0).unwrap();
        let collection = heatmap_to_feature_collection(&heatmap, Colormap::Jet);
        assert_eq!(collection.features.len(), 2);

        let first = &collection.features[0];
        let props = first.properties.as_ref().unwrap();
        assert_eq!(props["cell_x"], JsonValue::from(0));
        assert_eq!(props["value"], JsonValue::from(1.0));
        assert_eq!(props["color"], JsonValue::from(Colormap::Jet.hex(0.0)));

        let Some(GeoJsonValue::Polygon(rings)) = first.geometry.as_ref().map(|g| &g.value) else {
            panic!("expected a polygon");
        };
        assert_eq!(rings[0][2], vec![10.0, 10.0]);
    }

    #[test]
    fn test_wgs84_cells_are_projected() {
        let points = [DataPoint::new(500.0, 500.0, 2.0)];
        let heatmap = Heatmap::build(&points, 1000.0).unwrap();
        let collection =
            heatmap_to_wgs84_feature_collection(&heatmap, Colormap::Turbo, Crs::WEB_MERCATOR)
                .unwrap();

        let Some(GeoJsonValue::Polygon(rings)) =
            collection.features[0].geometry.as_ref().map(|g| &g.value)
        else {
            panic!("expected a polygon");
        };
        let corner = &rings[0][2];
        assert!(corner[0] > 0.0 && corner[0] < 0.01);
        assert!(corner[1] > 0.0 && corner[1] < 0.01);
    }

    #[test]
    fn test_envelope_feature() {
        let envelope = Envelope::new(
            Crs::WGS84,
            AxisRange::new(10.0, 11.0),
            AxisRange::new(50.0, 51.0),
        )
        .unwrap();
        let feature = envelope_to_feature(&envelope);
        assert_eq!(feature.bbox, Some(vec![10.0, 50.0, 11.0, 51.0]));
        assert_eq!(
            feature.properties.unwrap()["crs"],
            JsonValue::from("EPSG:4326")
        );
    }
}
