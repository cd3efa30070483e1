//! Data source adapters: execution of built statements against a concrete
//! connection.

use crate::error::{FeatureServerError, Result};
use crate::params::QueryParams;
use crate::sql::{build_count, build_extent, build_select};
use crate::sql_functions::register_spatial_functions;
use crate::types::{Extent, Row, SpatialReference, Value};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Contract shared by all data source adapters.
///
/// `calculate_extent` is an optional enrichment: execution failures are
/// reported as a warning and downgraded to `None`, never propagated.
pub trait DataSource {
    /// Execute the row-fetch statement for `params` against `source`.
    fn query(&self, source: &str, params: &QueryParams) -> Result<Vec<Row>>;

    /// Execute the row-count statement for `params` against `source`.
    fn count(&self, source: &str, params: &QueryParams) -> Result<u64>;

    /// Compute the bounding extent of `geometry_column` under the current
    /// filter set. `None` when no rows match or the statement fails.
    fn calculate_extent(
        &self,
        source: &str,
        geometry_column: &str,
        params: &QueryParams,
    ) -> Option<Extent>;

    /// Lightweight capability probe: whether the connection has the
    /// spatial function vocabulary installed.
    fn is_available(&self) -> bool;

    /// Whether this adapter implements extent calculation.
    fn supports_extent(&self) -> bool {
        true
    }
}

fn execution_error(err: rusqlite::Error) -> FeatureServerError {
    FeatureServerError::QueryExecution(err.to_string())
}

fn run_query(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    debug!(sql, "executing row fetch");
    let mut stmt = conn.prepare(sql).map_err(execution_error)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query([]).map_err(execution_error)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(execution_error)? {
        let mut columns = Vec::with_capacity(column_names.len());
        for (idx, name) in column_names.iter().enumerate() {
            let value = Value::try_from(row.get_ref(idx).map_err(execution_error)?)
                .map_err(|err| FeatureServerError::QueryExecution(err.to_string()))?;
            columns.push((name.clone(), value));
        }
        out.push(Row::new(columns));
    }
    Ok(out)
}

fn run_count(conn: &Connection, sql: &str) -> Result<u64> {
    debug!(sql, "executing row count");
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .map_err(execution_error)?;
    Ok(n.max(0) as u64)
}

fn run_extent(conn: &Connection, sql: &str, native_sr: i32) -> Option<Extent> {
    debug!(sql, "executing extent");
    let result = conn.query_row(sql, [], |row| {
        Ok((
            row.get::<_, Option<f64>>(0)?,
            row.get::<_, Option<f64>>(1)?,
            row.get::<_, Option<f64>>(2)?,
            row.get::<_, Option<f64>>(3)?,
        ))
    });
    match result {
        Ok((Some(xmin), Some(ymin), Some(xmax), Some(ymax))) => Some(Extent {
            xmin,
            ymin,
            xmax,
            ymax,
            spatial_reference: SpatialReference::new(native_sr),
        }),
        Ok(_) => None,
        Err(err) => {
            warn!(%err, "extent calculation failed, returning no extent");
            None
        }
    }
}

fn probe(conn: &Connection) -> bool {
    conn.query_row("SELECT ST_MinX(NULL)", [], |row| {
        row.get::<_, Option<f64>>(0)
    })
    .is_ok()
}

/// Adapter owning its own SQLite connection.
#[derive(Debug)]
pub struct SqliteDataSource {
    conn: Connection,
}

impl SqliteDataSource {
    /// Open an existing database in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        register_spatial_functions(&conn)?;
        Ok(Self { conn })
    }

    /// Open a new or existing database for read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        register_spatial_functions(&conn)?;
        Ok(Self { conn })
    }

    /// Create a transient in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;
        Ok(Self { conn })
    }

    /// Access the underlying connection, e.g. to create tables or seed
    /// feature rows.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DataSource for SqliteDataSource {
    fn query(&self, source: &str, params: &QueryParams) -> Result<Vec<Row>> {
        run_query(&self.conn, &build_select(source, params))
    }

    fn count(&self, source: &str, params: &QueryParams) -> Result<u64> {
        run_count(&self.conn, &build_count(source, params))
    }

    fn calculate_extent(
        &self,
        source: &str,
        geometry_column: &str,
        params: &QueryParams,
    ) -> Option<Extent> {
        run_extent(
            &self.conn,
            &build_extent(source, geometry_column, params),
            params.native_sr,
        )
    }

    fn is_available(&self) -> bool {
        probe(&self.conn)
    }
}

/// Adapter over a connection owned and pooled by a host framework.
#[derive(Clone, Debug)]
pub struct SharedConnectionSource {
    conn: Arc<Mutex<Connection>>,
}

impl SharedConnectionSource {
    /// Wrap a host-managed connection, installing the spatial function
    /// vocabulary on it.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|_| FeatureServerError::QueryExecution("connection lock poisoned".to_string()))?;
            register_spatial_functions(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FeatureServerError::QueryExecution("connection lock poisoned".to_string()))
    }
}

impl DataSource for SharedConnectionSource {
    fn query(&self, source: &str, params: &QueryParams) -> Result<Vec<Row>> {
        let conn = self.lock()?;
        run_query(&conn, &build_select(source, params))
    }

    fn count(&self, source: &str, params: &QueryParams) -> Result<u64> {
        let conn = self.lock()?;
        run_count(&conn, &build_count(source, params))
    }

    fn calculate_extent(
        &self,
        source: &str,
        geometry_column: &str,
        params: &QueryParams,
    ) -> Option<Extent> {
        let conn = match self.lock() {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "extent calculation failed, returning no extent");
                return None;
            }
        };
        run_extent(
            &conn,
            &build_extent(source, geometry_column, params),
            params.native_sr,
        )
    }

    fn is_available(&self) -> bool {
        match self.lock() {
            Ok(conn) => probe(&conn),
            Err(_) => false,
        }
    }
}
