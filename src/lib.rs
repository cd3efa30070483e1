//! GeoServices-compatible feature query engine built on top of rusqlite.
//!
//! ## Overview
//!
//! - `FeatureService` is the registry: layers bound to one data source.
//! - `FeatureLayer` / `StaticLayer` describe a queryable layer and its
//!   optional filter and mapping hooks.
//! - `QueryRequest` is the untrusted client request parsed from the
//!   protocol's key/value surface.
//! - `DataSource` / `SqliteDataSource` / `SharedConnectionSource` execute
//!   the generated SQL.
//!
//! The crate translates protocol query parameters (`where`, `outFields`,
//! `geometry`, `objectIds`, paging, `returnCountOnly`, `f`) into SQL over a
//! SQLite database whose geometry columns hold GeoPackage-style blobs, and
//! formats the result rows as protocol JSON or GeoJSON payloads.
//! `register_spatial_functions` installs the `ST_*` scalar functions the
//! generated SQL relies on; the bundled adapters do this on open.
//!
//! ## Short usage
//!
//! ```no_run
//! use rusqlite_featureserver::{
//!     FeatureService, LayerDefinition, QueryContext, QueryRequest, SqliteDataSource,
//!     StaticLayer,
//! };
//! use rusqlite_featureserver::types::{FieldSpec, FieldType, GeometryKind, SpatialReference};
//!
//! let source = SqliteDataSource::open_read_only("data/places.db")?;
//! let mut service = FeatureService::new(source);
//! service.register(StaticLayer::new(LayerDefinition {
//!     id: 0,
//!     name: "places".to_string(),
//!     table: "places".to_string(),
//!     geometry_kind: GeometryKind::Point,
//!     fields: vec![
//!         FieldSpec::new("id", FieldType::ObjectId),
//!         FieldSpec::new("name", FieldType::String),
//!     ],
//!     object_id_field: "id".to_string(),
//!     geometry_column: "geom".to_string(),
//!     spatial_reference: SpatialReference::wgs84(),
//!     max_record_count: 1000,
//!     extent: None,
//! }))?;
//!
//! let request = QueryRequest::from_pairs([
//!     ("where", "name LIKE 'A%'"),
//!     ("outFields", "*"),
//!     ("f", "geojson"),
//! ]);
//! let payload = service.query(0, &request, &QueryContext::default())?;
//! println!("{payload}");
//! # Ok::<(), rusqlite_featureserver::FeatureServerError>(())
//! ```
//!
//! ## Layer hooks
//!
//! Layers can scope what a request may see. A base filter is applied to
//! every request; a tenant filter is derived from the request context:
//!
//! ```no_run
//! use rusqlite_featureserver::{QueryContext, StaticLayer, TrustedSql};
//! # use rusqlite_featureserver::LayerDefinition;
//! # fn definition() -> LayerDefinition { unimplemented!() }
//!
//! let layer = StaticLayer::new(definition())
//!     .with_base_filter(TrustedSql::new(r#""t"."deleted_at" IS NULL"#))
//!     .with_tenant_column("tenant_id");
//!
//! let ctx = QueryContext { tenant_id: Some(42) };
//! ```
//!
//! `TrustedSql` marks fragments authored by the layer or server side; raw
//! client text never becomes one. Client-controlled values reach the SQL
//! only as escaped literals, coerced integers, or validated order tokens.

mod conversions;
mod error;
mod geom;
mod layer;
mod params;
mod projection;
mod response;
mod service;
mod source;
mod sql;
mod sql_functions;
pub mod types;

pub use error::{FeatureServerError, Result};
pub use geom::{envelope_blob, point_blob};
pub use layer::{FeatureLayer, LayerCapabilities, LayerDefinition, QueryContext, StaticLayer};
pub use params::{
    EnvelopeFilter, OutFields, QueryParams, QueryRequest, ResponseFormat, TrustedSql,
    parse_object_ids,
};
pub use response::{build_count_response, build_geojson, build_json, build_layer_definition};
pub use service::FeatureService;
pub use source::{DataSource, SharedConnectionSource, SqliteDataSource};
pub use sql::{build_count, build_extent, build_select, escape_literal};
pub use sql_functions::register_spatial_functions;
