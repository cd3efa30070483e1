use crate::conversions::geometry_kind_from_str;
use crate::error::{FeatureServerError, Result};
use crate::types::GeometryKind;

/// Output payload format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Json,
    GeoJson,
}

impl ResponseFormat {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("geojson") {
            Self::GeoJson
        } else {
            Self::Json
        }
    }
}

/// Requested output fields: everything, or an explicit ordered list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutFields {
    #[default]
    All,
    List(Vec<String>),
}

impl OutFields {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Self::All;
        }
        Self::List(
            s.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::List(names) => names.iter().any(|n| n == name),
        }
    }
}

/// A SQL fragment authored by the layer or server side.
///
/// This type is deliberately never constructed from raw client input; it
/// marks the injection-safety boundary between layer-authored SQL and
/// untrusted request values. String values inside a fragment must be quoted
/// with [`crate::sql::escape_literal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedSql(String);

impl TrustedSql {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self(fragment.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Admit a client-supplied ordering fragment only if it is a comma
    /// separated list of `identifier [ASC|DESC]` tokens. Anything else is
    /// rejected so raw client text never reaches SQL.
    pub fn order_fragment(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        for part in raw.split(',') {
            let mut tokens = part.split_whitespace();
            let ident = tokens.next()?;
            if ident.is_empty()
                || !ident
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return None;
            }
            if let Some(direction) = tokens.next() {
                if !direction.eq_ignore_ascii_case("ASC") && !direction.eq_ignore_ascii_case("DESC")
                {
                    return None;
                }
            }
            if tokens.next().is_some() {
                return None;
            }
        }
        Some(Self(raw.to_string()))
    }
}

/// Geometry envelope filter with its input spatial reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvelopeFilter {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub in_sr: i32,
}

impl EnvelopeFilter {
    /// Parse the protocol's envelope payload: either the short
    /// `xmin,ymin,xmax,ymax` form or the JSON envelope object. An explicit
    /// `inSR` parameter wins over an embedded spatial reference; the
    /// default is WGS 84.
    pub fn parse(payload: &str, in_sr: Option<i32>) -> Result<Self> {
        let payload = payload.trim();
        if payload.starts_with('{') {
            return Self::parse_json(payload, in_sr);
        }

        let bounds: Vec<f64> = payload
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| FeatureServerError::InvalidEnvelope(payload.to_string()))?;
        if bounds.len() != 4 {
            return Err(FeatureServerError::InvalidEnvelope(payload.to_string()));
        }
        Ok(Self {
            xmin: bounds[0],
            ymin: bounds[1],
            xmax: bounds[2],
            ymax: bounds[3],
            in_sr: in_sr.unwrap_or(4326),
        })
    }

    fn parse_json(payload: &str, in_sr: Option<i32>) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(payload)
            .map_err(|_| FeatureServerError::InvalidEnvelope(payload.to_string()))?;
        let bound = |key: &str| {
            json.get(key)
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| FeatureServerError::InvalidEnvelope(payload.to_string()))
        };
        let embedded_sr = json
            .get("spatialReference")
            .and_then(|sr| sr.get("wkid"))
            .and_then(serde_json::Value::as_i64)
            .map(|wkid| wkid as i32);
        Ok(Self {
            xmin: bound("xmin")?,
            ymin: bound("ymin")?,
            xmax: bound("xmax")?,
            ymax: bound("ymax")?,
            in_sr: in_sr.or(embedded_sr).unwrap_or(4326),
        })
    }
}

/// Coerce a comma-separated object-id list to integers, dropping
/// non-numeric tokens.
pub fn parse_object_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .collect()
}

/// The untrusted client request, parsed from the protocol's key/value
/// surface.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub where_clause: Option<String>,
    pub out_fields: OutFields,
    pub geometry: Option<String>,
    pub geometry_type: Option<GeometryKind>,
    pub in_sr: Option<i32>,
    pub out_sr: Option<i32>,
    pub object_ids: Vec<i64>,
    pub result_offset: Option<u64>,
    pub result_record_count: Option<u64>,
    pub order_by_fields: Option<String>,
    pub return_count_only: bool,
    pub format: ResponseFormat,
}

impl QueryRequest {
    /// Parse a request from method-agnostic key/value pairs. Unknown keys
    /// and unparseable values are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut request = Self::default();
        for (key, value) in pairs {
            if key.eq_ignore_ascii_case("where") {
                request.where_clause = non_empty(value);
            } else if key.eq_ignore_ascii_case("outFields") {
                request.out_fields = OutFields::parse(value);
            } else if key.eq_ignore_ascii_case("geometry") {
                request.geometry = non_empty(value);
            } else if key.eq_ignore_ascii_case("geometryType") {
                request.geometry_type = geometry_kind_from_str(value);
            } else if key.eq_ignore_ascii_case("inSR") {
                request.in_sr = value.trim().parse().ok();
            } else if key.eq_ignore_ascii_case("outSR") {
                request.out_sr = value.trim().parse().ok();
            } else if key.eq_ignore_ascii_case("objectIds") {
                request.object_ids = parse_object_ids(value);
            } else if key.eq_ignore_ascii_case("resultOffset") {
                request.result_offset = value.trim().parse().ok();
            } else if key.eq_ignore_ascii_case("resultRecordCount") {
                request.result_record_count = value.trim().parse().ok();
            } else if key.eq_ignore_ascii_case("orderByFields") {
                request.order_by_fields = non_empty(value);
            } else if key.eq_ignore_ascii_case("returnCountOnly") {
                request.return_count_only =
                    value.eq_ignore_ascii_case("true") || value.trim() == "1";
            } else if key.eq_ignore_ascii_case("f") {
                request.format = ResponseFormat::parse(value);
            }
        }
        request
    }

    /// The record window limit actually applied:
    /// `min(requested, max_record_count)`, defaulting to the layer maximum.
    pub fn effective_limit(&self, max_record_count: u64) -> u64 {
        self.result_record_count
            .unwrap_or(max_record_count)
            .min(max_record_count)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// The merged per-request parameter model consumed by the query builder:
/// client request values combined with the layer's filter and mapping
/// hooks and its geometry metadata.
#[derive(Clone, Debug)]
pub struct QueryParams {
    pub base_where: Option<TrustedSql>,
    pub tenant_where: Option<TrustedSql>,
    pub where_clause: Option<String>,
    pub object_ids: Vec<i64>,
    pub envelope: Option<EnvelopeFilter>,
    pub out_fields: OutFields,
    pub order_by: Option<TrustedSql>,
    pub offset: u64,
    pub limit: u64,
    pub format: ResponseFormat,
    pub out_sr: Option<i32>,
    pub field_map: Option<Vec<(String, String)>>,
    pub row_source: Option<TrustedSql>,
    pub object_id_field: String,
    pub geometry_column: String,
    pub geometry_kind: GeometryKind,
    pub native_sr: i32,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            base_where: None,
            tenant_where: None,
            where_clause: None,
            object_ids: Vec::new(),
            envelope: None,
            out_fields: OutFields::All,
            order_by: None,
            offset: 0,
            limit: 1000,
            format: ResponseFormat::Json,
            out_sr: None,
            field_map: None,
            row_source: None,
            object_id_field: "id".to_string(),
            geometry_column: "geom".to_string(),
            geometry_kind: GeometryKind::Point,
            native_sr: 4326,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_request_surface() {
        let request = QueryRequest::from_pairs([
            ("where", "name LIKE 'X%'"),
            ("outFields", "id, name"),
            ("geometry", "-10,-10,10,10"),
            ("geometryType", "esriGeometryEnvelope"),
            ("inSR", "4326"),
            ("outSR", "3857"),
            ("objectIds", "3,7,x,9"),
            ("resultOffset", "20"),
            ("resultRecordCount", "10"),
            ("orderByFields", "name DESC"),
            ("returnCountOnly", "false"),
            ("f", "geojson"),
            ("ignoredKey", "whatever"),
        ]);

        assert_eq!(request.where_clause.as_deref(), Some("name LIKE 'X%'"));
        assert_eq!(
            request.out_fields,
            OutFields::List(vec!["id".to_string(), "name".to_string()])
        );
        assert_eq!(request.geometry_type, Some(GeometryKind::Envelope));
        assert_eq!(request.in_sr, Some(4326));
        assert_eq!(request.out_sr, Some(3857));
        assert_eq!(request.object_ids, vec![3, 7, 9]);
        assert_eq!(request.result_offset, Some(20));
        assert_eq!(request.result_record_count, Some(10));
        assert_eq!(request.order_by_fields.as_deref(), Some("name DESC"));
        assert!(!request.return_count_only);
        assert_eq!(request.format, ResponseFormat::GeoJson);
    }

    #[test]
    fn object_ids_drop_non_numeric_tokens() {
        assert_eq!(parse_object_ids("3,7,x,9"), vec![3, 7, 9]);
        assert_eq!(parse_object_ids(" 1 , 2 "), vec![1, 2]);
        assert!(parse_object_ids("a,b").is_empty());
    }

    #[test]
    fn effective_limit_is_clamped() {
        let mut request = QueryRequest::default();
        assert_eq!(request.effective_limit(1000), 1000);

        request.result_record_count = Some(10);
        assert_eq!(request.effective_limit(1000), 10);

        request.result_record_count = Some(5000);
        assert_eq!(request.effective_limit(1000), 1000);
    }

    #[test]
    fn out_fields_star_and_list() {
        assert_eq!(OutFields::parse("*"), OutFields::All);
        assert_eq!(OutFields::parse(""), OutFields::All);
        let fields = OutFields::parse("name , id");
        assert!(fields.includes("name"));
        assert!(fields.includes("id"));
        assert!(!fields.includes("tenant_id"));
    }

    #[test]
    fn order_fragment_sanitizer() {
        assert!(TrustedSql::order_fragment("name").is_some());
        assert!(TrustedSql::order_fragment("name DESC, id asc").is_some());
        assert!(TrustedSql::order_fragment("name; DROP TABLE x").is_none());
        assert!(TrustedSql::order_fragment("name DESC extra").is_none());
        assert!(TrustedSql::order_fragment("").is_none());
    }

    #[test]
    fn envelope_parses_short_form() -> crate::Result<()> {
        let envelope = EnvelopeFilter::parse("-10, -5, 20, 15", None)?;
        assert_eq!(envelope.xmin, -10.0);
        assert_eq!(envelope.ymax, 15.0);
        assert_eq!(envelope.in_sr, 4326);
        Ok(())
    }

    #[test]
    fn envelope_parses_json_form_with_embedded_sr() -> crate::Result<()> {
        let payload =
            r#"{"xmin":-10,"ymin":-5,"xmax":20,"ymax":15,"spatialReference":{"wkid":3857}}"#;
        let envelope = EnvelopeFilter::parse(payload, None)?;
        assert_eq!(envelope.in_sr, 3857);

        // An explicit inSR parameter wins.
        let envelope = EnvelopeFilter::parse(payload, Some(4326))?;
        assert_eq!(envelope.in_sr, 4326);
        Ok(())
    }

    #[test]
    fn envelope_rejects_malformed_payload() {
        assert!(EnvelopeFilter::parse("1,2,3", None).is_err());
        assert!(EnvelopeFilter::parse("a,b,c,d", None).is_err());
        assert!(EnvelopeFilter::parse(r#"{"xmin": "no"}"#, None).is_err());
    }
}
