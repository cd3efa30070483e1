use crate::types::{FieldType, GeometryKind, SpatialReference, Value};

#[inline]
pub(crate) fn geometry_kind_to_str(kind: GeometryKind) -> &'static str {
    match kind {
        GeometryKind::Point => "esriGeometryPoint",
        GeometryKind::Multipoint => "esriGeometryMultipoint",
        GeometryKind::Polyline => "esriGeometryPolyline",
        GeometryKind::Polygon => "esriGeometryPolygon",
        GeometryKind::Envelope => "esriGeometryEnvelope",
    }
}

#[inline]
pub(crate) fn geometry_kind_from_str(s: &str) -> Option<GeometryKind> {
    if s.eq_ignore_ascii_case("esriGeometryPoint") {
        Some(GeometryKind::Point)
    } else if s.eq_ignore_ascii_case("esriGeometryMultipoint") {
        Some(GeometryKind::Multipoint)
    } else if s.eq_ignore_ascii_case("esriGeometryPolyline") {
        Some(GeometryKind::Polyline)
    } else if s.eq_ignore_ascii_case("esriGeometryPolygon") {
        Some(GeometryKind::Polygon)
    } else if s.eq_ignore_ascii_case("esriGeometryEnvelope") {
        Some(GeometryKind::Envelope)
    } else {
        None
    }
}

#[inline]
pub(crate) fn field_type_to_str(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::ObjectId => "esriFieldTypeOID",
        FieldType::Integer => "esriFieldTypeInteger",
        FieldType::Double => "esriFieldTypeDouble",
        FieldType::String => "esriFieldTypeString",
        FieldType::Date => "esriFieldTypeDate",
        FieldType::Geometry => "esriFieldTypeGeometry",
    }
}

/// Convert a raw column value into its JSON representation. Blobs have no
/// protocol representation and collapse to null.
pub(crate) fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(_) => serde_json::Value::Null,
    }
}

pub(crate) fn spatial_reference_json(sr: SpatialReference) -> serde_json::Value {
    serde_json::json!({ "wkid": sr.wkid, "latestWkid": sr.latest_wkid })
}
