use std::error::Error;
use std::fmt;

/// Crate error type for feature-service operations.
#[derive(Debug)]
pub enum FeatureServerError {
    /// A built statement failed to execute. Carries the driver's message;
    /// the driver error shape itself never crosses the core boundary.
    QueryExecution(String),
    /// No layer is registered under the requested id.
    LayerNotFound {
        layer_id: u32,
    },
    /// A layer registration did not satisfy the layer contract.
    InvalidLayerRegistration {
        reason: String,
    },
    /// Wraps errors returned by `rusqlite` outside of statement execution
    /// (connection setup, function registration).
    Sql(rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    Wkb(wkb::error::WkbError),
    /// No transform is available between the two spatial references.
    UnsupportedTransform {
        from: i32,
        to: i32,
    },
    /// Invalid GeoPackage geometry flags byte.
    InvalidGeometryFlags(u8),
    /// Geometry blob is too short for the fixed GeoPackage header.
    InvalidGeometryLength {
        len: usize,
        minimum: usize,
    },
    /// A point-only accessor was called on a non-point geometry.
    PointGeometryRequired,
    /// The envelope payload of a geometry filter could not be parsed.
    InvalidEnvelope(String),
}

impl fmt::Display for FeatureServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryExecution(message) => write!(f, "query execution failed: {message}"),
            Self::LayerNotFound { layer_id } => write!(f, "layer not found: {layer_id}"),
            Self::InvalidLayerRegistration { reason } => {
                write!(f, "invalid layer registration: {reason}")
            }
            Self::Sql(err) => write!(f, "{err}"),
            Self::Wkb(err) => write!(f, "{err}"),
            Self::UnsupportedTransform { from, to } => {
                write!(f, "unsupported spatial reference transform: {from} -> {to}")
            }
            Self::InvalidGeometryFlags(flags) => {
                write!(f, "invalid geometry flags: {flags:#04x}")
            }
            Self::InvalidGeometryLength { len, minimum } => {
                write!(
                    f,
                    "invalid geometry length: got {len} bytes, expected at least {minimum}"
                )
            }
            Self::PointGeometryRequired => write!(f, "geometry is not a point"),
            Self::InvalidEnvelope(payload) => {
                write!(f, "invalid envelope geometry payload: {payload}")
            }
        }
    }
}

impl Error for FeatureServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Wkb(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for FeatureServerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<wkb::error::WkbError> for FeatureServerError {
    fn from(err: wkb::error::WkbError) -> Self {
        Self::Wkb(err)
    }
}

pub type Result<T> = std::result::Result<T, FeatureServerError>;
