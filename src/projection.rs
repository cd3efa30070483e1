use crate::error::{FeatureServerError, Result};

const EARTH_RADIUS_M: f64 = 6_378_137.0;

// 102100 is the legacy well-known id for Web Mercator.
#[inline]
pub(crate) fn canonical(srid: i32) -> i32 {
    if srid == 102100 { 3857 } else { srid }
}

/// Whether two spatial reference ids denote the same coordinate system.
pub(crate) fn same_reference(a: i32, b: i32) -> bool {
    canonical(a) == canonical(b)
}

/// Transform a coordinate pair between two spatial references.
///
/// Supported pairs are EPSG:4326 <-> EPSG:3857 (spherical mercator) and any
/// identity pair. Everything else is an error.
pub(crate) fn transform_xy(x: f64, y: f64, from: i32, to: i32) -> Result<(f64, f64)> {
    let (from, to) = (canonical(from), canonical(to));
    match (from, to) {
        _ if from == to => Ok((x, y)),
        (4326, 3857) => Ok(wgs84_to_mercator(x, y)),
        (3857, 4326) => Ok(mercator_to_wgs84(x, y)),
        _ => Err(FeatureServerError::UnsupportedTransform { from, to }),
    }
}

fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * ((std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan()).ln();
    (x, y)
}

fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}
