use crate::error::{FeatureServerError, Result};
use crate::params::TrustedSql;
use crate::sql::TABLE_ALIAS;
use crate::types::{Extent, FieldSpec, GeometryKind, SpatialReference};

/// Immutable per-layer metadata, created once at registration time and
/// shared read-only across requests.
#[derive(Clone, Debug)]
pub struct LayerDefinition {
    pub id: u32,
    pub name: String,
    /// Table (or view) the layer reads from.
    pub table: String,
    pub geometry_kind: GeometryKind,
    pub fields: Vec<FieldSpec>,
    /// Public identifier field name. Response shaping only; object-id
    /// filters always target the underlying storage id column.
    pub object_id_field: String,
    pub geometry_column: String,
    pub spatial_reference: SpatialReference,
    pub max_record_count: u64,
    /// Static extent. When absent, the registry computes one on demand if
    /// the bound adapter supports it.
    pub extent: Option<Extent>,
}

impl LayerDefinition {
    pub(crate) fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(FeatureServerError::InvalidLayerRegistration {
                reason: reason.to_string(),
            })
        };
        if self.name.trim().is_empty() {
            return fail("layer name must not be empty");
        }
        if self.table.trim().is_empty() {
            return fail("layer table must not be empty");
        }
        if self.fields.is_empty() {
            return fail("layer must declare at least one field");
        }
        if !self
            .fields
            .iter()
            .any(|field| field.name == self.object_id_field)
        {
            return fail("objectIdField must be one of the declared fields");
        }
        if self.max_record_count == 0 {
            return fail("maxRecordCount must be positive");
        }
        Ok(())
    }
}

/// Per-request context passed into layer hooks by explicit injection.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryContext {
    pub tenant_id: Option<i64>,
}

/// Optional capabilities a layer implementation declares. Hooks are only
/// consulted when the matching flag is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerCapabilities {
    pub base_filter: bool,
    pub tenant_filter: bool,
    pub field_map: bool,
    pub row_source: bool,
}

/// The layer contract: static definition plus capability-flagged hooks
/// feeding the query builder.
pub trait FeatureLayer: Send + Sync {
    fn definition(&self) -> &LayerDefinition;

    fn capabilities(&self) -> LayerCapabilities {
        LayerCapabilities::default()
    }

    /// Layer-authored filter applied to every request, e.g. soft-delete
    /// exclusion.
    fn base_filter(&self) -> Option<TrustedSql> {
        None
    }

    /// Layer-authored tenant isolation predicate for this request.
    fn tenant_filter(&self, _ctx: &QueryContext) -> Option<TrustedSql> {
        None
    }

    /// Public field name to SQL expression mapping for remapped sources.
    fn field_map(&self) -> Option<Vec<(String, String)>> {
        None
    }

    /// Replacement FROM clause (joins etc.). Must bind the `t` alias.
    fn row_source(&self) -> Option<TrustedSql> {
        None
    }
}

/// Plain [`FeatureLayer`] implementation configured entirely from data.
pub struct StaticLayer {
    definition: LayerDefinition,
    base_filter: Option<TrustedSql>,
    tenant_column: Option<String>,
    field_map: Option<Vec<(String, String)>>,
    row_source: Option<TrustedSql>,
}

impl StaticLayer {
    pub fn new(definition: LayerDefinition) -> Self {
        Self {
            definition,
            base_filter: None,
            tenant_column: None,
            field_map: None,
            row_source: None,
        }
    }

    pub fn with_base_filter(mut self, fragment: TrustedSql) -> Self {
        self.base_filter = Some(fragment);
        self
    }

    /// Restrict visible rows to the requesting tenant via an equality
    /// predicate on `column`.
    pub fn with_tenant_column(mut self, column: &str) -> Self {
        self.tenant_column = Some(column.to_string());
        self
    }

    pub fn with_field_map(mut self, map: Vec<(String, String)>) -> Self {
        self.field_map = Some(map);
        self
    }

    pub fn with_row_source(mut self, fragment: TrustedSql) -> Self {
        self.row_source = Some(fragment);
        self
    }
}

impl FeatureLayer for StaticLayer {
    fn definition(&self) -> &LayerDefinition {
        &self.definition
    }

    fn capabilities(&self) -> LayerCapabilities {
        LayerCapabilities {
            base_filter: self.base_filter.is_some(),
            tenant_filter: self.tenant_column.is_some(),
            field_map: self.field_map.is_some(),
            row_source: self.row_source.is_some(),
        }
    }

    fn base_filter(&self) -> Option<TrustedSql> {
        self.base_filter.clone()
    }

    fn tenant_filter(&self, ctx: &QueryContext) -> Option<TrustedSql> {
        let column = self.tenant_column.as_ref()?;
        let tenant_id = ctx.tenant_id?;
        Some(TrustedSql::new(format!(
            r#""{TABLE_ALIAS}"."{column}" = {tenant_id}"#
        )))
    }

    fn field_map(&self) -> Option<Vec<(String, String)>> {
        self.field_map.clone()
    }

    fn row_source(&self) -> Option<TrustedSql> {
        self.row_source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    pub(crate) fn point_definition() -> LayerDefinition {
        LayerDefinition {
            id: 0,
            name: "places".to_string(),
            table: "places".to_string(),
            geometry_kind: GeometryKind::Point,
            fields: vec![
                FieldSpec::new("id", FieldType::ObjectId),
                FieldSpec::new("name", FieldType::String),
            ],
            object_id_field: "id".to_string(),
            geometry_column: "geom".to_string(),
            spatial_reference: SpatialReference::wgs84(),
            max_record_count: 1000,
            extent: None,
        }
    }

    #[test]
    fn validation_requires_known_object_id_field() {
        let mut definition = point_definition();
        definition.object_id_field = "missing".to_string();
        assert!(matches!(
            definition.validate(),
            Err(FeatureServerError::InvalidLayerRegistration { .. })
        ));
    }

    #[test]
    fn validation_requires_positive_record_count() {
        let mut definition = point_definition();
        definition.max_record_count = 0;
        assert!(definition.validate().is_err());
        assert!(point_definition().validate().is_ok());
    }

    #[test]
    fn static_layer_reports_capabilities_from_configuration() {
        let layer = StaticLayer::new(point_definition());
        assert_eq!(layer.capabilities(), LayerCapabilities::default());

        let layer = StaticLayer::new(point_definition())
            .with_base_filter(TrustedSql::new("deleted_at IS NULL"))
            .with_tenant_column("tenant_id");
        let capabilities = layer.capabilities();
        assert!(capabilities.base_filter);
        assert!(capabilities.tenant_filter);
        assert!(!capabilities.field_map);
        assert!(!capabilities.row_source);
    }

    #[test]
    fn tenant_filter_needs_a_tenant_in_context() {
        let layer = StaticLayer::new(point_definition()).with_tenant_column("tenant_id");

        let anonymous = QueryContext::default();
        assert!(layer.tenant_filter(&anonymous).is_none());

        let scoped = QueryContext { tenant_id: Some(5) };
        let fragment = layer.tenant_filter(&scoped).expect("tenant fragment");
        assert_eq!(fragment.as_str(), r#""t"."tenant_id" = 5"#);
    }
}
