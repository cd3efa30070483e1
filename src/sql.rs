//! Translation of a merged parameter set into the three statement shapes:
//! row fetch, row count, and bounding extent.
//!
//! Everything here is pure string construction. The only values that reach
//! SQL text without passing through a trusted-fragment type are integers
//! (object ids, the record window) and parsed floats (envelope bounds), so
//! the builder itself can never carry raw client strings into a statement.

use crate::params::{OutFields, QueryParams, ResponseFormat};
use crate::types::GeometryKind;

/// Alias under which the default FROM clause binds the feature table. A
/// layer-supplied row source must bind the same alias so qualified column
/// references stay valid.
pub(crate) const TABLE_ALIAS: &str = "t";

/// The underlying storage identifier column targeted by object-id filters.
/// The layer's public `objectIdField` is a response-shaping alias and is
/// not consulted here.
pub(crate) const ID_COLUMN: &str = "id";

/// Synthesized coordinate columns appended for point layers.
pub(crate) const X_COLUMN: &str = "x";
pub(crate) const Y_COLUMN: &str = "y";

/// Synthesized column holding serialized geometry text for GeoJSON output.
pub(crate) const GEOJSON_COLUMN: &str = "geojson";

/// Quote a string value as a SQL literal. Layer authors are contractually
/// required to pass every string value embedded in a trusted fragment
/// through this.
pub fn escape_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Build the row-fetch statement.
pub fn build_select(source: &str, params: &QueryParams) -> String {
    let mut columns = select_columns(params);
    append_geometry_columns(&mut columns, params);
    let columns = columns.join(", ");

    let mut sql = format!(
        "SELECT {columns} {} WHERE {}",
        from_clause(source, params),
        where_clause(params)
    );
    if let Some(order_by) = &params.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by.as_str());
    }
    sql.push_str(&format!(" LIMIT {} OFFSET {}", params.limit, params.offset));
    sql
}

/// Build the row-count statement over the same FROM/WHERE as the select,
/// ignoring output fields and the record window.
pub fn build_count(source: &str, params: &QueryParams) -> String {
    format!(
        "SELECT COUNT(*) {} WHERE {}",
        from_clause(source, params),
        where_clause(params)
    )
}

/// Build the bounding-extent statement: four scalar bounds of the geometry
/// column, reprojected to the layer's native reference, over the same
/// FROM/WHERE as the select.
pub fn build_extent(source: &str, geometry_column: &str, params: &QueryParams) -> String {
    let geom = format!(
        r#"ST_Transform("{TABLE_ALIAS}"."{geometry_column}", {})"#,
        params.native_sr
    );
    format!(
        r#"SELECT MIN(ST_MinX({geom})) AS "xmin", MIN(ST_MinY({geom})) AS "ymin", MAX(ST_MaxX({geom})) AS "xmax", MAX(ST_MaxY({geom})) AS "ymax" {} WHERE {}"#,
        from_clause(source, params),
        where_clause(params)
    )
}

fn from_clause(source: &str, params: &QueryParams) -> String {
    match &params.row_source {
        // A layer-supplied row source fully replaces the single-table FROM
        // clause; it is responsible for binding the table alias.
        Some(row_source) => format!("FROM {}", row_source.as_str()),
        None => format!(r#"FROM "{source}" AS "{TABLE_ALIAS}""#),
    }
}

fn where_clause(params: &QueryParams) -> String {
    let mut conditions: Vec<String> = Vec::new();

    for fragment in [&params.base_where, &params.tenant_where] {
        if let Some(fragment) = fragment {
            if !fragment.is_empty() {
                conditions.push(format!("({})", fragment.as_str()));
            }
        }
    }
    if let Some(where_clause) = &params.where_clause {
        if !where_clause.trim().is_empty() {
            conditions.push(format!("({where_clause})"));
        }
    }
    if !params.object_ids.is_empty() {
        let ids = params
            .object_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<String>>()
            .join(",");
        conditions.push(format!(r#"("{TABLE_ALIAS}"."{ID_COLUMN}" IN ({ids}))"#));
    }
    if let Some(envelope) = &params.envelope {
        conditions.push(format!(
            r#"(ST_Intersects("{TABLE_ALIAS}"."{}", ST_Transform(ST_MakeEnvelope({}, {}, {}, {}, {}), {})))"#,
            params.geometry_column,
            envelope.xmin,
            envelope.ymin,
            envelope.xmax,
            envelope.ymax,
            envelope.in_sr,
            params.native_sr,
        ));
    }

    if conditions.is_empty() {
        "1=1".to_string()
    } else {
        conditions.join(" AND ")
    }
}

fn select_columns(params: &QueryParams) -> Vec<String> {
    let columns = match &params.field_map {
        Some(map) => remapped_columns(params, map),
        None => match &params.out_fields {
            OutFields::All => vec![format!(r#""{TABLE_ALIAS}".*"#)],
            OutFields::List(names) => names
                .iter()
                .map(|name| format!(r#""{TABLE_ALIAS}"."{name}""#))
                .collect(),
        },
    };
    // An empty effective field list (empty explicit list, or a request
    // entirely outside the field map) would emit invalid SQL; treat it as
    // a wildcard request.
    if columns.is_empty() {
        vec![format!(r#""{TABLE_ALIAS}".*"#)]
    } else {
        columns
    }
}

fn remapped_columns(params: &QueryParams, map: &[(String, String)]) -> Vec<String> {
    let lookup = |name: &str| {
        map.iter()
            .find(|(key, _)| key == name)
            .map(|(_, expr)| expr.as_str())
    };
    let aliased = |expr: &str, name: &str| format!(r#"{expr} AS "{name}""#);

    let names: Vec<&str> = match &params.out_fields {
        // With a field map and no explicit request, the map's own order is
        // the selected-field order.
        OutFields::All => map.iter().map(|(key, _)| key.as_str()).collect(),
        OutFields::List(names) => names.iter().map(String::as_str).collect(),
    };

    let oid = params.object_id_field.as_str();
    let mut columns = Vec::with_capacity(names.len());
    let mut seen: Vec<&str> = Vec::with_capacity(names.len());

    // The identifier expression always leads when the object-id field is
    // requested and mapped.
    if names.contains(&oid) {
        if let Some(expr) = lookup(oid) {
            columns.push(aliased(expr, oid));
            seen.push(oid);
        }
    }

    for name in names {
        if seen.contains(&name) {
            continue;
        }
        if let Some(expr) = lookup(name) {
            columns.push(aliased(expr, name));
            seen.push(name);
        } else if name == oid {
            // Identifier requested but absent from the map: synthesize it
            // from the conventional primary-key entry.
            if let Some(expr) = lookup(ID_COLUMN) {
                columns.push(aliased(expr, oid));
                seen.push(name);
            }
        }
        // Fields outside the map have no expression in the remapped source
        // and are skipped.
    }

    columns
}

fn append_geometry_columns(columns: &mut Vec<String>, params: &QueryParams) {
    match params.format {
        ResponseFormat::GeoJson => {
            columns.push(format!(
                r#"ST_AsGeoJSON("{TABLE_ALIAS}"."{}") AS "{GEOJSON_COLUMN}""#,
                params.geometry_column
            ));
        }
        ResponseFormat::Json => {
            if params.geometry_kind == GeometryKind::Point {
                let out_sr = params.out_sr.unwrap_or(params.native_sr);
                let geom = format!(
                    r#"ST_Transform("{TABLE_ALIAS}"."{}", {out_sr})"#,
                    params.geometry_column
                );
                columns.push(format!(r#"ST_X({geom}) AS "{X_COLUMN}""#));
                columns.push(format!(r#"ST_Y({geom}) AS "{Y_COLUMN}""#));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{EnvelopeFilter, OutFields, QueryParams, ResponseFormat, TrustedSql};
    use crate::types::GeometryKind;

    fn base_params() -> QueryParams {
        QueryParams {
            geometry_kind: GeometryKind::Polygon,
            ..QueryParams::default()
        }
    }

    #[test]
    fn select_defaults_to_wildcard_and_always_true_filter() {
        let sql = build_select("parcels", &base_params());
        assert_eq!(
            sql,
            r#"SELECT "t".* FROM "parcels" AS "t" WHERE 1=1 LIMIT 1000 OFFSET 0"#
        );
    }

    #[test]
    fn empty_field_list_falls_back_to_wildcard() {
        let params = QueryParams {
            out_fields: OutFields::parse(","),
            ..base_params()
        };
        assert_eq!(params.out_fields, OutFields::List(Vec::new()));
        let sql = build_select("parcels", &params);
        assert_eq!(
            sql,
            r#"SELECT "t".* FROM "parcels" AS "t" WHERE 1=1 LIMIT 1000 OFFSET 0"#
        );
    }

    #[test]
    fn fully_unmapped_request_falls_back_to_wildcard() {
        let params = QueryParams {
            field_map: Some(vec![("name".to_string(), "o.display_name".to_string())]),
            out_fields: OutFields::List(vec!["unmapped".to_string()]),
            ..base_params()
        };
        let sql = build_select("parcels", &params);
        assert!(sql.starts_with(r#"SELECT "t".* FROM"#));
    }

    #[test]
    fn where_fragments_compose_in_fixed_order() {
        let params = QueryParams {
            base_where: Some(TrustedSql::new("status='A'")),
            tenant_where: Some(TrustedSql::new("tenant_id=5")),
            where_clause: Some("name LIKE 'X%'".to_string()),
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM "parcels" AS "t" WHERE (status='A') AND (tenant_id=5) AND (name LIKE 'X%')"#
        );
    }

    #[test]
    fn omitting_a_fragment_removes_exactly_its_clause() {
        let params = QueryParams {
            base_where: Some(TrustedSql::new("status='A'")),
            where_clause: Some("name LIKE 'X%'".to_string()),
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM "parcels" AS "t" WHERE (status='A') AND (name LIKE 'X%')"#
        );
    }

    #[test]
    fn empty_trusted_fragment_is_skipped_entirely() {
        let params = QueryParams {
            tenant_where: Some(TrustedSql::new("  ")),
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "parcels" AS "t" WHERE 1=1"#);
    }

    #[test]
    fn object_ids_target_the_storage_id_column() {
        let params = QueryParams {
            object_ids: vec![3, 7, 9],
            object_id_field: "objectid".to_string(),
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM "parcels" AS "t" WHERE ("t"."id" IN (3,7,9))"#
        );
    }

    #[test]
    fn envelope_filter_reprojects_into_the_native_reference() {
        let params = QueryParams {
            envelope: Some(EnvelopeFilter {
                xmin: -10.0,
                ymin: -5.0,
                xmax: 20.0,
                ymax: 15.0,
                in_sr: 3857,
            }),
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM "parcels" AS "t" WHERE (ST_Intersects("t"."geom", ST_Transform(ST_MakeEnvelope(-10, -5, 20, 15, 3857), 4326)))"#
        );
    }

    #[test]
    fn point_layers_get_transformed_coordinate_columns() {
        let params = QueryParams {
            geometry_kind: GeometryKind::Point,
            out_fields: OutFields::List(vec!["name".to_string()]),
            out_sr: Some(3857),
            limit: 10,
            offset: 20,
            ..QueryParams::default()
        };
        let sql = build_select("places", &params);
        assert_eq!(
            sql,
            r#"SELECT "t"."name", ST_X(ST_Transform("t"."geom", 3857)) AS "x", ST_Y(ST_Transform("t"."geom", 3857)) AS "y" FROM "places" AS "t" WHERE 1=1 LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn geojson_format_gets_serialized_geometry_instead() {
        let params = QueryParams {
            geometry_kind: GeometryKind::Point,
            format: ResponseFormat::GeoJson,
            ..QueryParams::default()
        };
        let sql = build_select("places", &params);
        assert!(sql.contains(r#"ST_AsGeoJSON("t"."geom") AS "geojson""#));
        assert!(!sql.contains(r#"AS "x""#));
    }

    #[test]
    fn order_by_is_a_pass_through_fragment() {
        let params = QueryParams {
            order_by: Some(TrustedSql::new("name DESC")),
            ..base_params()
        };
        let sql = build_select("parcels", &params);
        assert!(sql.contains("ORDER BY name DESC LIMIT 1000 OFFSET 0"));
    }

    #[test]
    fn row_source_override_replaces_the_from_clause() {
        let params = QueryParams {
            row_source: Some(TrustedSql::new(
                r#"parcels AS "t" JOIN owners o ON o.parcel_id = "t".id"#,
            )),
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(
            sql,
            r#"SELECT COUNT(*) FROM parcels AS "t" JOIN owners o ON o.parcel_id = "t".id WHERE 1=1"#
        );
    }

    #[test]
    fn field_map_orders_identifier_first_and_skips_duplicates() {
        let params = QueryParams {
            field_map: Some(vec![
                ("objectid".to_string(), "p.id".to_string()),
                ("name".to_string(), "o.display_name".to_string()),
            ]),
            object_id_field: "objectid".to_string(),
            out_fields: OutFields::List(vec![
                "name".to_string(),
                "objectid".to_string(),
                "name".to_string(),
                "unmapped".to_string(),
            ]),
            ..base_params()
        };
        let sql = build_select("parcels", &params);
        assert!(sql.starts_with(
            r#"SELECT p.id AS "objectid", o.display_name AS "name" FROM"#
        ));
    }

    #[test]
    fn field_map_synthesizes_identifier_from_primary_key_entry() {
        let params = QueryParams {
            field_map: Some(vec![
                ("id".to_string(), "p.parcel_pk".to_string()),
                ("name".to_string(), "p.name".to_string()),
            ]),
            object_id_field: "objectid".to_string(),
            out_fields: OutFields::List(vec!["objectid".to_string(), "name".to_string()]),
            ..base_params()
        };
        let sql = build_select("parcels", &params);
        assert!(sql.starts_with(
            r#"SELECT p.parcel_pk AS "objectid", p.name AS "name" FROM"#
        ));
    }

    #[test]
    fn count_ignores_fields_ordering_and_window() {
        let params = QueryParams {
            out_fields: OutFields::List(vec!["name".to_string()]),
            order_by: Some(TrustedSql::new("name")),
            limit: 5,
            offset: 10,
            ..base_params()
        };
        let sql = build_count("parcels", &params);
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "parcels" AS "t" WHERE 1=1"#);
    }

    #[test]
    fn extent_decomposes_into_four_scalar_bounds() {
        let sql = build_extent("parcels", "geom", &base_params());
        assert_eq!(
            sql,
            r#"SELECT MIN(ST_MinX(ST_Transform("t"."geom", 4326))) AS "xmin", MIN(ST_MinY(ST_Transform("t"."geom", 4326))) AS "ymin", MAX(ST_MaxX(ST_Transform("t"."geom", 4326))) AS "xmax", MAX(ST_MaxY(ST_Transform("t"."geom", 4326))) AS "ymax" FROM "parcels" AS "t" WHERE 1=1"#
        );
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let params = QueryParams {
            base_where: Some(TrustedSql::new("status='A'")),
            object_ids: vec![1, 2],
            envelope: Some(EnvelopeFilter {
                xmin: 0.5,
                ymin: 0.5,
                xmax: 1.5,
                ymax: 1.5,
                in_sr: 4326,
            }),
            out_fields: OutFields::List(vec!["id".to_string(), "name".to_string()]),
            ..base_params()
        };
        assert_eq!(
            build_select("parcels", &params),
            build_select("parcels", &params)
        );
        assert_eq!(
            build_extent("parcels", "geom", &params),
            build_extent("parcels", "geom", &params)
        );
    }

    #[test]
    fn escape_literal_doubles_quotes() {
        assert_eq!(escape_literal("O'Brien"), "'O''Brien'");
        assert_eq!(escape_literal("plain"), "'plain'");
    }
}
