//! Boundary shard readers

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;

use geo::{Centroid, Simplify};
use geo_types::{Geometry as GeoGeometry, MultiPolygon};
use geojson::{Feature, GeoJson};
use serde_json::Value;
use tracing::debug;

use crate::postal::{PostalCode, PostalCodeError, RegionKey};

use super::types::{BoundaryRecord, GeometryShard, ShardError};

/// Default GeoJSON property holding the postal code
pub const DEFAULT_CODE_FIELD: &str = "d_codigo";

/// Trait for parsing one region's boundary file
pub trait ShardReader: Send + Sync {
    fn read(&self, region: &RegionKey, path: &Path) -> Result<GeometryShard, ShardError>;
}

/// Reader for GeoJSON FeatureCollections with one feature per postal-code polygon
#[derive(Debug, Clone)]
pub struct GeoJsonShardReader {
    code_field: String,
    tolerance: Option<f64>,
}

impl Default for GeoJsonShardReader {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_FIELD, None)
    }
}

impl GeoJsonShardReader {
    /// Create a reader.
    ///
    /// `tolerance` enables Ramer-Douglas-Peucker simplification of every
    /// polygon with that epsilon (in the file's coordinate units). Larger
    /// values give smaller shards and coarser boundaries; vertices can move
    /// by up to `tolerance` from their true position. Non-positive values
    /// disable simplification.
    pub fn new(code_field: impl Into<String>, tolerance: Option<f64>) -> Self {
        Self {
            code_field: code_field.into(),
            tolerance: tolerance.filter(|t| t.is_finite() && *t > 0.0),
        }
    }

    pub fn tolerance(&self) -> Option<f64> {
        self.tolerance
    }

    fn feature_code(&self, feature: &Feature) -> Option<Result<PostalCode, PostalCodeError>> {
        match feature.property(&self.code_field)? {
            Value::String(text) => Some(PostalCode::parse(text)),
            Value::Number(number) => Some(match number.as_i64() {
                Some(int) => PostalCode::from_integer(int),
                None => PostalCode::from_float(number.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::Null => None,
            other => Some(PostalCode::parse(&other.to_string())),
        }
    }

    fn feature_polygons(feature: Feature) -> Option<MultiPolygon<f64>> {
        let geometry = GeoGeometry::<f64>::try_from(feature.geometry?).ok()?;
        match geometry {
            GeoGeometry::Polygon(polygon) => Some(MultiPolygon(vec![polygon])),
            GeoGeometry::MultiPolygon(polygons) => Some(polygons),
            _ => None,
        }
    }
}

impl ShardReader for GeoJsonShardReader {
    fn read(&self, region: &RegionKey, path: &Path) -> Result<GeometryShard, ShardError> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ShardError::NotFound {
                region: region.clone(),
            },
            _ => ShardError::Parse {
                region: region.clone(),
                reason: e.to_string(),
            },
        })?;

        let parse_error = |reason: String| ShardError::Parse {
            region: region.clone(),
            reason,
        };

        let features = match text.parse::<GeoJson>().map_err(|e| parse_error(e.to_string()))? {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(parse_error(
                    "expected a FeatureCollection, found a bare geometry".into(),
                ));
            }
        };

        let mut records: BTreeMap<PostalCode, BoundaryRecord> = BTreeMap::new();
        let mut skipped_features = 0;

        for feature in features {
            let code = match self.feature_code(&feature) {
                Some(Ok(code)) => code,
                Some(Err(e)) => {
                    debug!("Skipping feature in {:?}: {}", path, e);
                    skipped_features += 1;
                    continue;
                }
                None => {
                    skipped_features += 1;
                    continue;
                }
            };
            let Some(mut polygons) = Self::feature_polygons(feature) else {
                debug!("Skipping non-polygon feature for {} in {:?}", code, path);
                skipped_features += 1;
                continue;
            };
            if let Some(tolerance) = self.tolerance {
                polygons = polygons.simplify(&tolerance);
            }

            match records.entry(code) {
                Entry::Occupied(mut existing) => existing.get_mut().geometry.0.extend(polygons.0),
                Entry::Vacant(slot) => {
                    let code = slot.key().clone();
                    slot.insert(BoundaryRecord {
                        code,
                        geometry: polygons,
                        centroid: None,
                    });
                }
            }
        }

        for record in records.values_mut() {
            record.centroid = record.geometry.centroid();
        }

        Ok(GeometryShard {
            region: region.clone(),
            source: path.to_path_buf(),
            records,
            skipped_features,
            tolerance: self.tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TempDir, shard_geojson, square};
    use serde_json::json;

    fn code(raw: &str) -> PostalCode {
        PostalCode::parse(raw).unwrap()
    }

    #[test]
    fn test_read_shard() {
        let dir = TempDir::new("shard_reader_basic");
        let path = dir.write("09.geojson", &shard_geojson(&["09000", "9010"]));

        let shard = GeoJsonShardReader::default()
            .read(&RegionKey::new("09"), &path)
            .unwrap();

        assert_eq!(shard.region.as_str(), "09");
        assert_eq!(shard.len(), 2);
        let record = shard.get(&code("09010")).unwrap();
        let centroid = record.centroid.unwrap();
        assert!((centroid.x() - 2.5).abs() < 1e-9);
        assert!((centroid.y() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_codes_and_bad_features() {
        let dir = TempDir::new("shard_reader_numeric");
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "d_codigo": 1000 }, "geometry": square(0.0, 0.0) },
                { "type": "Feature", "properties": { "d_codigo": "abc" }, "geometry": square(1.0, 0.0) },
                { "type": "Feature", "properties": { "other": "01010" }, "geometry": square(2.0, 0.0) },
                { "type": "Feature", "properties": { "d_codigo": "01020" },
                  "geometry": { "type": "Point", "coordinates": [0.0, 0.0] } }
            ]
        });
        let path = dir.write("01.geojson", &doc.to_string());

        let shard = GeoJsonShardReader::default()
            .read(&RegionKey::new("01"), &path)
            .unwrap();
        assert_eq!(shard.codes().collect::<Vec<_>>(), vec![&code("01000")]);
        assert_eq!(shard.skipped_features, 3);
    }

    #[test]
    fn test_duplicate_codes_merge_polygons() {
        let dir = TempDir::new("shard_reader_merge");
        let path = dir.write("09.geojson", &shard_geojson(&["09000", "09000"]));

        let shard = GeoJsonShardReader::default()
            .read(&RegionKey::new("09"), &path)
            .unwrap();
        assert_eq!(shard.get(&code("09000")).unwrap().geometry.0.len(), 2);
    }

    #[test]
    fn test_custom_code_field() {
        let dir = TempDir::new("shard_reader_field");
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "CP": "64000" }, "geometry": square(0.0, 0.0) }
            ]
        });
        let path = dir.write("19.geojson", &doc.to_string());

        let shard = GeoJsonShardReader::new("CP", None)
            .read(&RegionKey::new("19"), &path)
            .unwrap();
        assert!(shard.get(&code("64000")).is_some());
    }

    #[test]
    fn test_simplification_drops_vertices() {
        let dir = TempDir::new("shard_reader_simplify");
        // A square with a nearly collinear extra vertex on its bottom edge
        let doc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "d_codigo": "09000" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [0.5, 0.001], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
                }
            }]
        });
        let path = dir.write("09.geojson", &doc.to_string());
        let region = RegionKey::new("09");

        let full = GeoJsonShardReader::default().read(&region, &path).unwrap();
        let simplified = GeoJsonShardReader::new(DEFAULT_CODE_FIELD, Some(0.01))
            .read(&region, &path)
            .unwrap();

        let vertices = |shard: &GeometryShard| {
            shard.get(&code("09000")).unwrap().geometry.0[0]
                .exterior()
                .0
                .len()
        };
        assert_eq!(vertices(&full), 6);
        assert_eq!(vertices(&simplified), 5);
        assert_eq!(simplified.tolerance, Some(0.01));
    }

    #[test]
    fn test_non_positive_tolerance_is_disabled() {
        assert_eq!(GeoJsonShardReader::new("d_codigo", Some(0.0)).tolerance(), None);
        assert_eq!(GeoJsonShardReader::new("d_codigo", Some(-1.0)).tolerance(), None);
    }

    #[test]
    fn test_parse_failures() {
        let dir = TempDir::new("shard_reader_errors");
        let region = RegionKey::new("09");
        let reader = GeoJsonShardReader::default();

        let garbage = dir.write("bad.geojson", "{ not json");
        assert!(matches!(
            reader.read(&region, &garbage),
            Err(ShardError::Parse { .. })
        ));

        let bare = dir.write("bare.geojson", &square(0.0, 0.0).to_string());
        assert!(matches!(
            reader.read(&region, &bare),
            Err(ShardError::Parse { .. })
        ));

        assert_eq!(
            reader.read(&region, &dir.path().join("missing.geojson")),
            Err(ShardError::NotFound { region })
        );
    }
}
