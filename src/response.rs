//! Formatting of raw result rows into the two protocol payload families.

use crate::conversions::{
    field_type_to_str, geometry_kind_to_str, json_value, spatial_reference_json,
};
use crate::layer::LayerDefinition;
use crate::params::{OutFields, QueryParams};
use crate::sql::{GEOJSON_COLUMN, X_COLUMN, Y_COLUMN};
use crate::types::{Extent, Row, SpatialReference, Value};
use serde_json::{Map, Value as Json, json};

/// Conventional identifier columns consulted for a GeoJSON feature id, in
/// priority order.
const ID_CANDIDATES: [&str; 3] = ["id", "objectid", "fid"];

/// Build the protocol JSON query payload.
pub fn build_json(
    rows: &[Row],
    definition: &LayerDefinition,
    params: &QueryParams,
    record_limit: u64,
) -> Json {
    let spatial_reference = params
        .out_sr
        .map(SpatialReference::new)
        .unwrap_or(definition.spatial_reference);

    let fields: Vec<Json> = definition
        .fields
        .iter()
        .filter(|field| params.out_fields.includes(&field.name))
        .map(|field| {
            let mut spec = Map::new();
            spec.insert("name".to_string(), json!(field.name));
            spec.insert("type".to_string(), json!(field_type_to_str(field.field_type)));
            spec.insert("alias".to_string(), json!(field.alias));
            if let Some(length) = field.length {
                spec.insert("length".to_string(), json!(length));
            }
            Json::Object(spec)
        })
        .collect();

    let features: Vec<Json> = rows
        .iter()
        .map(|row| {
            json!({
                "attributes": attributes_json(row, definition, &params.out_fields),
                "geometry": point_geometry_json(row),
            })
        })
        .collect();

    json!({
        "objectIdFieldName": definition.object_id_field,
        "globalIdFieldName": "",
        "geometryType": geometry_kind_to_str(definition.geometry_kind),
        "spatialReference": spatial_reference_json(spatial_reference),
        "fields": fields,
        "features": features,
        "exceededTransferLimit": transfer_limit_reached(rows.len(), record_limit),
    })
}

/// Build the GeoJSON feature-collection payload. The transfer-limit flag is
/// emitted both at top level and under a properties block for consumers
/// that look in either place.
pub fn build_geojson(rows: &[Row], record_limit: u64) -> Json {
    let features: Vec<Json> = rows.iter().map(geojson_feature).collect();
    let exceeded = transfer_limit_reached(rows.len(), record_limit);

    json!({
        "type": "FeatureCollection",
        "features": features,
        "exceededTransferLimit": exceeded,
        "properties": { "exceededTransferLimit": exceeded },
    })
}

pub fn build_count_response(n: u64) -> Json {
    json!({ "count": n })
}

/// Build the layer-definition payload: the layer's configured values merged
/// over the protocol defaults, configured values winning.
pub fn build_layer_definition(definition: &LayerDefinition) -> Json {
    let mut payload = Map::new();
    payload.insert("currentVersion".to_string(), json!(10.51));
    payload.insert("id".to_string(), json!(0));
    payload.insert("name".to_string(), json!(""));
    payload.insert("type".to_string(), json!("Feature Layer"));
    payload.insert("description".to_string(), json!(""));
    payload.insert("geometryType".to_string(), json!(Json::Null));
    payload.insert("copyrightText".to_string(), json!(""));
    payload.insert("parentLayer".to_string(), Json::Null);
    payload.insert("subLayers".to_string(), Json::Null);
    payload.insert("minScale".to_string(), json!(0));
    payload.insert("maxScale".to_string(), json!(0));
    payload.insert("defaultVisibility".to_string(), json!(true));
    payload.insert("hasAttachments".to_string(), json!(false));
    payload.insert(
        "htmlPopupType".to_string(),
        json!("esriServerHTMLPopupTypeNone"),
    );
    payload.insert("displayField".to_string(), json!(""));
    payload.insert("typeIdField".to_string(), Json::Null);
    payload.insert("fields".to_string(), json!([]));
    payload.insert("relationships".to_string(), json!([]));
    payload.insert("canModifyLayer".to_string(), json!(false));
    payload.insert("capabilities".to_string(), json!("Query"));
    payload.insert("maxRecordCount".to_string(), json!(1000));
    payload.insert("supportsStatistics".to_string(), json!(false));
    payload.insert("supportsAdvancedQueries".to_string(), json!(true));
    payload.insert(
        "supportedQueryFormats".to_string(),
        json!("JSON, geoJSON"),
    );
    payload.insert("isDataVersioned".to_string(), json!(false));
    payload.insert(
        "ownershipBasedAccessControlForFeatures".to_string(),
        json!({ "allowOthersToQuery": true }),
    );
    payload.insert("useStandardizedQueries".to_string(), json!(true));
    payload.insert(
        "advancedQueryCapabilities".to_string(),
        json!({
            "useStandardizedQueries": true,
            "supportsStatistics": false,
            "supportsOrderBy": true,
            "supportsDistinct": false,
            "supportsPagination": true,
            "supportsTrueCurve": false,
        }),
    );
    payload.insert("objectIdField".to_string(), json!("id"));
    payload.insert("globalIdField".to_string(), json!(""));

    // Configured values override the defaults above.
    payload.insert("id".to_string(), json!(definition.id));
    payload.insert("name".to_string(), json!(definition.name));
    payload.insert(
        "geometryType".to_string(),
        json!(geometry_kind_to_str(definition.geometry_kind)),
    );
    payload.insert(
        "fields".to_string(),
        Json::Array(
            definition
                .fields
                .iter()
                .map(|field| {
                    let mut spec = Map::new();
                    spec.insert("name".to_string(), json!(field.name));
                    spec.insert(
                        "type".to_string(),
                        json!(field_type_to_str(field.field_type)),
                    );
                    spec.insert("alias".to_string(), json!(field.alias));
                    if let Some(length) = field.length {
                        spec.insert("length".to_string(), json!(length));
                    }
                    Json::Object(spec)
                })
                .collect(),
        ),
    );
    payload.insert(
        "maxRecordCount".to_string(),
        json!(definition.max_record_count),
    );
    payload.insert("objectIdField".to_string(), json!(definition.object_id_field));
    payload.insert(
        "spatialReference".to_string(),
        spatial_reference_json(definition.spatial_reference),
    );
    if let Some(extent) = definition.extent {
        payload.insert("extent".to_string(), extent_json(extent));
    }

    Json::Object(payload)
}

pub(crate) fn extent_json(extent: Extent) -> Json {
    json!({
        "xmin": extent.xmin,
        "ymin": extent.ymin,
        "xmax": extent.xmax,
        "ymax": extent.ymax,
        "spatialReference": spatial_reference_json(extent.spatial_reference),
    })
}

fn transfer_limit_reached(returned: usize, record_limit: u64) -> bool {
    record_limit > 0 && returned as u64 == record_limit
}

fn is_synthesized(column: &str) -> bool {
    column == X_COLUMN || column == Y_COLUMN || column == GEOJSON_COLUMN
}

fn attributes_json(row: &Row, definition: &LayerDefinition, out_fields: &OutFields) -> Json {
    let mut attributes = Map::new();
    for (column, value) in row.iter() {
        if is_synthesized(column) || column == definition.geometry_column {
            continue;
        }
        if matches!(value, Value::Blob(_)) {
            continue;
        }
        if !out_fields.includes(column) {
            continue;
        }
        attributes.insert(column.to_string(), json_value(value));
    }
    Json::Object(attributes)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(r) => Some(*r),
        _ => None,
    }
}

fn point_geometry_json(row: &Row) -> Json {
    let x = row.get(X_COLUMN).and_then(number);
    let y = row.get(Y_COLUMN).and_then(number);
    match (x, y) {
        (Some(x), Some(y)) => json!({ "x": x, "y": y }),
        _ => Json::Null,
    }
}

fn geojson_feature(row: &Row) -> Json {
    let id_column = ID_CANDIDATES
        .iter()
        .copied()
        .find(|candidate| row.get(candidate).is_some());
    let id = id_column
        .and_then(|column| row.get(column))
        .map(json_value)
        .unwrap_or(Json::Null);

    let geometry = match row.get(GEOJSON_COLUMN) {
        Some(Value::Text(text)) => serde_json::from_str(text).unwrap_or(Json::Null),
        _ => match (
            row.get(X_COLUMN).and_then(number),
            row.get(Y_COLUMN).and_then(number),
        ) {
            (Some(x), Some(y)) => json!({ "type": "Point", "coordinates": [x, y] }),
            _ => Json::Null,
        },
    };

    let mut properties = Map::new();
    for (column, value) in row.iter() {
        if is_synthesized(column) || Some(column) == id_column {
            continue;
        }
        if matches!(value, Value::Blob(_)) {
            continue;
        }
        properties.insert(column.to_string(), json_value(value));
    }

    json!({
        "type": "Feature",
        "id": id,
        "geometry": geometry,
        "properties": Json::Object(properties),
    })
}
