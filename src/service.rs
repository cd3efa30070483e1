//! The layer registry: ties registered layers to a data source and drives
//! a request from parsed parameters to a response payload.

use crate::error::{FeatureServerError, Result};
use crate::layer::{FeatureLayer, QueryContext};
use crate::params::{EnvelopeFilter, QueryParams, QueryRequest, ResponseFormat, TrustedSql};
use crate::projection::canonical;
use crate::response::{build_count_response, build_geojson, build_json, build_layer_definition};
use crate::source::DataSource;
use crate::types::GeometryKind;
use serde_json::{Value as Json, json};
use std::collections::BTreeMap;
use tracing::debug;

/// A queryable feature service: an ordered set of layers bound to one data
/// source adapter.
pub struct FeatureService<S: DataSource> {
    source: S,
    layers: BTreeMap<u32, Box<dyn FeatureLayer>>,
}

impl<S: DataSource> FeatureService<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            layers: BTreeMap::new(),
        }
    }

    /// The bound adapter, e.g. to reach the underlying connection for
    /// seeding tables.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Register a layer under its definition id. Registering the same id
    /// again replaces the previous layer.
    pub fn register(&mut self, layer: impl FeatureLayer + 'static) -> Result<()> {
        layer.definition().validate()?;
        let id = layer.definition().id;
        debug!(layer_id = id, name = %layer.definition().name, "registering layer");
        self.layers.insert(id, Box::new(layer));
        Ok(())
    }

    fn layer(&self, layer_id: u32) -> Result<&dyn FeatureLayer> {
        self.layers
            .get(&layer_id)
            .map(|layer| layer.as_ref())
            .ok_or(FeatureServerError::LayerNotFound { layer_id })
    }

    /// Run a query request against a layer and format the payload in the
    /// requested response format.
    pub fn query(
        &self,
        layer_id: u32,
        request: &QueryRequest,
        ctx: &QueryContext,
    ) -> Result<Json> {
        let layer = self.layer(layer_id)?;
        let definition = layer.definition();
        let params = merge_params(layer, request, ctx)?;

        // Count-only requests never touch the row path.
        if request.return_count_only {
            let n = self.source.count(&definition.table, &params)?;
            return Ok(build_count_response(n));
        }

        let rows = self.source.query(&definition.table, &params)?;
        Ok(match params.format {
            ResponseFormat::GeoJson => build_geojson(&rows, params.limit),
            ResponseFormat::Json => build_json(&rows, definition, &params, params.limit),
        })
    }

    /// Count the rows a request would match, without fetching them.
    pub fn count(
        &self,
        layer_id: u32,
        request: &QueryRequest,
        ctx: &QueryContext,
    ) -> Result<u64> {
        let layer = self.layer(layer_id)?;
        let params = merge_params(layer, request, ctx)?;
        self.source.count(&layer.definition().table, &params)
    }

    /// The layer-definition payload. A layer without a static extent gets
    /// one computed from its rows when the adapter supports it.
    pub fn layer_definition(&self, layer_id: u32) -> Result<Json> {
        let layer = self.layer(layer_id)?;
        let mut definition = layer.definition().clone();
        if definition.extent.is_none() && self.source.supports_extent() {
            let params = merge_params(layer, &QueryRequest::default(), &QueryContext::default())?;
            definition.extent = self.source.calculate_extent(
                &definition.table,
                &definition.geometry_column,
                &params,
            );
        }
        Ok(build_layer_definition(&definition))
    }

    /// The service-info payload listing all registered layers.
    pub fn service_info(&self) -> Json {
        let layers: Vec<Json> = self
            .layers
            .values()
            .map(|layer| {
                let definition = layer.definition();
                json!({
                    "id": definition.id,
                    "name": definition.name,
                    "type": "Feature Layer",
                })
            })
            .collect();
        json!({
            "currentVersion": 10.51,
            "serviceDescription": "",
            "hasVersionedData": false,
            "supportsDisconnectedEditing": false,
            "supportedQueryFormats": "JSON, geoJSON",
            "maxRecordCount": 1000,
            "capabilities": "Query",
            "description": "",
            "copyrightText": "",
            "layers": layers,
            "tables": [],
        })
    }
}

/// Combine the untrusted request with the layer's definition and its
/// capability-gated hooks into the builder parameter model.
fn merge_params(
    layer: &dyn FeatureLayer,
    request: &QueryRequest,
    ctx: &QueryContext,
) -> Result<QueryParams> {
    let definition = layer.definition();
    let capabilities = layer.capabilities();

    let envelope = match (&request.geometry, request.geometry_type) {
        (Some(payload), Some(GeometryKind::Envelope)) => {
            Some(EnvelopeFilter::parse(payload, request.in_sr)?)
        }
        _ => None,
    };

    Ok(QueryParams {
        base_where: if capabilities.base_filter {
            layer.base_filter()
        } else {
            None
        },
        tenant_where: if capabilities.tenant_filter {
            layer.tenant_filter(ctx)
        } else {
            None
        },
        where_clause: request.where_clause.clone(),
        object_ids: request.object_ids.clone(),
        envelope,
        out_fields: request.out_fields.clone(),
        order_by: request
            .order_by_fields
            .as_deref()
            .and_then(TrustedSql::order_fragment),
        offset: request.result_offset.unwrap_or(0),
        limit: request.effective_limit(definition.max_record_count),
        format: request.format,
        out_sr: request.out_sr.map(canonical),
        field_map: if capabilities.field_map {
            layer.field_map()
        } else {
            None
        },
        row_source: if capabilities.row_source {
            layer.row_source()
        } else {
            None
        },
        object_id_field: definition.object_id_field.clone(),
        geometry_column: definition.geometry_column.clone(),
        geometry_kind: definition.geometry_kind,
        native_sr: definition.spatial_reference.wkid,
    })
}
