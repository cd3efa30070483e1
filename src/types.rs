pub use rusqlite::types::Value;

/// Geometry type of a layer, matching the protocol's geometry enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Multipoint,
    Polyline,
    Polygon,
    Envelope,
}

/// Field type of a layer column, matching the protocol's field enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    ObjectId,
    Integer,
    Double,
    String,
    Date,
    Geometry,
}

/// Coordinate system identifier pair (current and legacy well-known ids).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpatialReference {
    pub wkid: i32,
    pub latest_wkid: i32,
}

impl SpatialReference {
    pub fn new(wkid: i32) -> Self {
        Self {
            wkid,
            latest_wkid: wkid,
        }
    }

    pub fn wgs84() -> Self {
        Self::new(4326)
    }

    pub fn web_mercator() -> Self {
        Self {
            wkid: 102100,
            latest_wkid: 3857,
        }
    }
}

/// One field of a layer schema.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub alias: String,
    pub length: Option<u32>,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            alias: name.to_string(),
            length: None,
        }
    }
}

/// Axis-aligned bounding rectangle with its spatial reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub spatial_reference: SpatialReference,
}

/// One result tuple: an ordered mapping from column name to value.
#[derive(Clone, Debug, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_accessors_preserve_column_order() {
        let row = Row::new(vec![
            ("id".to_string(), Value::Integer(1)),
            ("name".to_string(), Value::Text("A".to_string())),
        ]);
        assert_eq!(row.len(), 2);
        assert!(!row.is_empty());
        assert_eq!(row.get("name"), Some(&Value::Text("A".to_string())));
        assert!(row.get("missing").is_none());
        assert_eq!(
            row.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["id", "name"]
        );
        assert!(Row::default().is_empty());
    }
}
