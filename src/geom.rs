//! GeoPackage-style geometry blob handling.
//!
//! Geometry columns hold a fixed header (magic, version, flags, SRS id,
//! optional envelope) followed by ISO WKB. Only the XY dimension is
//! produced by this crate's own constructors.

use crate::error::{FeatureServerError, Result};
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, LineStringTrait, MultiLineStringTrait,
    MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use wkb::reader::Wkb;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Bounds {
    pub minx: f64,
    pub maxx: f64,
    pub miny: f64,
    pub maxy: f64,
}

impl Bounds {
    pub(crate) fn intersects(&self, other: &Bounds) -> bool {
        self.minx <= other.maxx
            && self.maxx >= other.minx
            && self.miny <= other.maxy
            && self.maxy >= other.miny
    }
}

/// Strip the header and envelope bytes to access the raw WKB, returning the
/// SRS id declared in the header alongside it.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn decode_geometry(b: &[u8]) -> Result<(Wkb<'_>, i32)> {
    if b.len() < 8 {
        return Err(FeatureServerError::InvalidGeometryLength {
            len: b.len(),
            minimum: 8,
        });
    }
    let flags = b[3];
    let envelope_size: usize = match flags & 0b00001110 {
        0b00000000 => 0,  // no envelope
        0b00000010 => 32, // [minx, maxx, miny, maxy]
        0b00000100 => 48, // [minx, maxx, miny, maxy, minz, maxz]
        0b00000110 => 48, // [minx, maxx, miny, maxy, minm, maxm]
        0b00001000 => 64, // [minx, maxx, miny, maxy, minz, maxz, minm, maxm]
        _ => {
            return Err(FeatureServerError::InvalidGeometryFlags(flags));
        }
    };
    let srid_bytes: [u8; 4] = b[4..8].try_into().expect("slice length checked");
    // Flags bit 0 selects the byte order of the header's SRS id.
    let srid = if flags & 0b00000001 == 1 {
        i32::from_le_bytes(srid_bytes)
    } else {
        i32::from_be_bytes(srid_bytes)
    };

    let offset = 8 + envelope_size;
    if b.len() < offset {
        return Err(FeatureServerError::InvalidGeometryLength {
            len: b.len(),
            minimum: offset,
        });
    }

    Ok((Wkb::try_new(&b[offset..])?, srid))
}

/// Prefix raw WKB bytes with the blob header (little-endian SRS id, no
/// envelope).
pub(crate) fn wrap_geometry(wkb: &[u8], srid: i32) -> Vec<u8> {
    let mut geom = Vec::with_capacity(wkb.len() + 8);
    geom.extend_from_slice(&[
        0x47u8, // magic
        0x50u8, // magic
        0x00u8, // version
        0x01u8, // flags (little endian SRS id, no envelope)
    ]);
    geom.extend_from_slice(&srid.to_le_bytes());
    geom.extend_from_slice(wkb);
    geom
}

/// Build a geometry blob for an XY point. Useful for seeding point layers
/// in tests and demos without a separate geometry stack.
pub fn point_blob(x: f64, y: f64, srid: i32) -> Vec<u8> {
    let mut wkb = Vec::with_capacity(21);
    wkb.push(0x01); // little endian
    wkb.extend_from_slice(&1u32.to_le_bytes()); // point
    wkb.extend_from_slice(&x.to_le_bytes());
    wkb.extend_from_slice(&y.to_le_bytes());
    wrap_geometry(&wkb, srid)
}

/// Build a geometry blob for an axis-aligned rectangle as a single-ring
/// polygon.
pub fn envelope_blob(xmin: f64, ymin: f64, xmax: f64, ymax: f64, srid: i32) -> Vec<u8> {
    let ring = [
        (xmin, ymin),
        (xmax, ymin),
        (xmax, ymax),
        (xmin, ymax),
        (xmin, ymin),
    ];

    let mut wkb = Vec::with_capacity(9 + 4 + ring.len() * 16);
    wkb.push(0x01); // little endian
    wkb.extend_from_slice(&3u32.to_le_bytes()); // polygon
    wkb.extend_from_slice(&1u32.to_le_bytes()); // one ring
    wkb.extend_from_slice(&(ring.len() as u32).to_le_bytes());
    for (x, y) in ring {
        wkb.extend_from_slice(&x.to_le_bytes());
        wkb.extend_from_slice(&y.to_le_bytes());
    }
    wrap_geometry(&wkb, srid)
}

/// Extract the coordinate pair of a point geometry. `None` for an empty
/// point.
pub(crate) fn point_xy<G: GeometryTrait<T = f64>>(geom: &G) -> Result<Option<(f64, f64)>> {
    match geom.as_type() {
        geo_traits::GeometryType::Point(point) => Ok(point.coord().map(|coord| coord.x_y())),
        _ => Err(FeatureServerError::PointGeometryRequired),
    }
}

/// Serialize any supported geometry into a GeoJSON geometry object.
pub(crate) fn geojson_geometry<G: GeometryTrait<T = f64>>(geom: &G) -> serde_json::Value {
    use geo_traits::GeometryType as GeoType;

    match geom.as_type() {
        GeoType::Point(point) => {
            let coordinates = match point.coord() {
                Some(coord) => coord_json(&coord),
                None => serde_json::json!([]),
            };
            serde_json::json!({ "type": "Point", "coordinates": coordinates })
        }
        GeoType::LineString(line) => {
            serde_json::json!({ "type": "LineString", "coordinates": line_json(line) })
        }
        GeoType::Polygon(poly) => {
            serde_json::json!({ "type": "Polygon", "coordinates": polygon_json(poly) })
        }
        GeoType::MultiPoint(multi) => {
            let coordinates: Vec<serde_json::Value> = multi
                .points()
                .filter_map(|point| point.coord().map(|coord| coord_json(&coord)))
                .collect();
            serde_json::json!({ "type": "MultiPoint", "coordinates": coordinates })
        }
        GeoType::MultiLineString(multi) => {
            let coordinates: Vec<serde_json::Value> =
                multi.line_strings().map(|line| line_json(&line)).collect();
            serde_json::json!({ "type": "MultiLineString", "coordinates": coordinates })
        }
        GeoType::MultiPolygon(multi) => {
            let coordinates: Vec<serde_json::Value> =
                multi.polygons().map(|poly| polygon_json(&poly)).collect();
            serde_json::json!({ "type": "MultiPolygon", "coordinates": coordinates })
        }
        GeoType::GeometryCollection(collection) => {
            let geometries: Vec<serde_json::Value> = collection
                .geometries()
                .map(|sub_geom| geojson_geometry(&sub_geom))
                .collect();
            serde_json::json!({ "type": "GeometryCollection", "geometries": geometries })
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {
            // Never produced by WKB decoding.
            unreachable!()
        }
    }
}

fn coord_json<C: CoordTrait<T = f64>>(coord: &C) -> serde_json::Value {
    let (x, y) = coord.x_y();
    serde_json::json!([x, y])
}

fn line_json<L: LineStringTrait<T = f64>>(line: &L) -> serde_json::Value {
    let coordinates: Vec<serde_json::Value> =
        line.coords().map(|coord| coord_json(&coord)).collect();
    serde_json::Value::Array(coordinates)
}

fn polygon_json<P: PolygonTrait<T = f64>>(poly: &P) -> serde_json::Value {
    let mut rings = Vec::new();
    if let Some(ring) = poly.exterior() {
        rings.push(line_json(&ring));
    }
    for ring in poly.interiors() {
        rings.push(line_json(&ring));
    }
    serde_json::Value::Array(rings)
}

pub(crate) fn bounds_from_geometry<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Bounds> {
    use geo_traits::GeometryType as GeoType;

    let mut bounds: Option<Bounds> = None;
    match geom.as_type() {
        GeoType::Point(point) => {
            if let Some(coord) = point.coord() {
                add_coord(&mut bounds, &coord);
            }
        }
        GeoType::LineString(line) => {
            for coord in line.coords() {
                add_coord(&mut bounds, &coord);
            }
        }
        GeoType::Polygon(poly) => {
            if let Some(ring) = poly.exterior() {
                add_line_string(&mut bounds, &ring);
            }
            for ring in poly.interiors() {
                add_line_string(&mut bounds, &ring);
            }
        }
        GeoType::MultiPoint(multi) => {
            for point in multi.points() {
                if let Some(coord) = point.coord() {
                    add_coord(&mut bounds, &coord);
                }
            }
        }
        GeoType::MultiLineString(multi) => {
            for line in multi.line_strings() {
                add_line_string(&mut bounds, &line);
            }
        }
        GeoType::MultiPolygon(multi) => {
            for poly in multi.polygons() {
                if let Some(ring) = poly.exterior() {
                    add_line_string(&mut bounds, &ring);
                }
                for ring in poly.interiors() {
                    add_line_string(&mut bounds, &ring);
                }
            }
        }
        GeoType::GeometryCollection(collection) => {
            for sub_geom in collection.geometries() {
                if let Some(sub_bounds) = bounds_from_geometry(&sub_geom) {
                    merge_bounds(&mut bounds, sub_bounds);
                }
            }
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {
            // Never produced by WKB decoding.
            unreachable!()
        }
    }

    bounds
}

fn add_line_string<L: LineStringTrait<T = f64>>(bounds: &mut Option<Bounds>, line: &L) {
    for coord in line.coords() {
        add_coord(bounds, &coord);
    }
}

fn add_coord<C: CoordTrait<T = f64>>(bounds: &mut Option<Bounds>, coord: &C) {
    let (x, y) = coord.x_y();
    match bounds {
        Some(existing) => {
            existing.minx = existing.minx.min(x);
            existing.maxx = existing.maxx.max(x);
            existing.miny = existing.miny.min(y);
            existing.maxy = existing.maxy.max(y);
        }
        None => {
            *bounds = Some(Bounds {
                minx: x,
                maxx: x,
                miny: y,
                maxy: y,
            });
        }
    }
}

fn merge_bounds(bounds: &mut Option<Bounds>, other: Bounds) {
    match bounds {
        Some(existing) => {
            existing.minx = existing.minx.min(other.minx);
            existing.maxx = existing.maxx.max(other.maxx);
            existing.miny = existing.miny.min(other.miny);
            existing.maxy = existing.maxy.max(other.maxy);
        }
        None => *bounds = Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Point, Polygon};

    #[test]
    fn point_blob_roundtrip() -> crate::Result<()> {
        let blob = point_blob(-118.0, 34.0, 4326);
        let (wkb, srid) = decode_geometry(&blob)?;
        assert_eq!(srid, 4326);
        assert_eq!(point_xy(&wkb)?, Some((-118.0, 34.0)));
        Ok(())
    }

    #[test]
    fn envelope_blob_has_expected_bounds() -> crate::Result<()> {
        let blob = envelope_blob(-10.0, -5.0, 20.0, 15.0, 4326);
        let (wkb, _) = decode_geometry(&blob)?;
        let bounds = bounds_from_geometry(&wkb).expect("non-empty");
        assert_eq!(bounds.minx, -10.0);
        assert_eq!(bounds.miny, -5.0);
        assert_eq!(bounds.maxx, 20.0);
        assert_eq!(bounds.maxy, 15.0);
        Ok(())
    }

    #[test]
    fn decode_rejects_short_blob() {
        let result = decode_geometry(&[0x47, 0x50, 0x00]);
        assert!(matches!(
            result,
            Err(FeatureServerError::InvalidGeometryLength { len: 3, minimum: 8 })
        ));
    }

    #[test]
    fn decode_rejects_invalid_flags() {
        let mut blob = vec![0x47, 0x50, 0x00, 0x0A, 0, 0, 0, 0];
        blob.extend_from_slice(&[0; 16]);
        let result = decode_geometry(&blob);
        assert!(matches!(
            result,
            Err(FeatureServerError::InvalidGeometryFlags(0x0A))
        ));
    }

    #[test]
    fn point_xy_rejects_non_point() -> crate::Result<()> {
        let blob = envelope_blob(0.0, 0.0, 1.0, 1.0, 4326);
        let (wkb, _) = decode_geometry(&blob)?;
        assert!(matches!(
            point_xy(&wkb),
            Err(FeatureServerError::PointGeometryRequired)
        ));
        Ok(())
    }

    #[test]
    fn geojson_point() {
        let geom = Point::new(1.5, -2.0);
        assert_eq!(
            geojson_geometry(&geom),
            serde_json::json!({ "type": "Point", "coordinates": [1.5, -2.0] })
        );
    }

    #[test]
    fn geojson_linestring() {
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 2.0), (3.0, 1.0)]);
        assert_eq!(
            geojson_geometry(&line),
            serde_json::json!({
                "type": "LineString",
                "coordinates": [[0.0, 0.0], [1.0, 2.0], [3.0, 1.0]],
            })
        );
    }

    #[test]
    fn geojson_polygon_with_hole() {
        let exterior = LineString::from(vec![
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 4.0),
            (0.0, 4.0),
            (0.0, 0.0),
        ]);
        let hole = LineString::from(vec![
            (1.0, 1.0),
            (2.0, 1.0),
            (2.0, 2.0),
            (1.0, 2.0),
            (1.0, 1.0),
        ]);
        let poly = Polygon::new(exterior, vec![hole]);
        let json = geojson_geometry(&poly);
        assert_eq!(json["type"], "Polygon");
        assert_eq!(json["coordinates"].as_array().expect("rings").len(), 2);
        assert_eq!(json["coordinates"][0][1], serde_json::json!([4.0, 0.0]));
    }

    #[test]
    fn bounds_intersection() {
        let a = Bounds {
            minx: 0.0,
            maxx: 2.0,
            miny: 0.0,
            maxy: 2.0,
        };
        let b = Bounds {
            minx: 1.0,
            maxx: 3.0,
            miny: 1.0,
            maxy: 3.0,
        };
        let c = Bounds {
            minx: 5.0,
            maxx: 6.0,
            miny: 5.0,
            maxy: 6.0,
        };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
