use crate::error::Result;
use crate::geom::{
    Bounds, bounds_from_geometry, decode_geometry, envelope_blob, geojson_geometry, point_blob,
    point_xy,
};
use crate::projection::{same_reference, transform_xy};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};
use wkb::reader::Wkb;

/// Register the spatial SQL vocabulary the query builder emits.
///
/// Example:
/// ```no_run
/// use rusqlite::Connection;
/// use rusqlite_featureserver::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), rusqlite_featureserver::FeatureServerError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MinX", |b| b.minx)?;
    register_bounds_component(conn, "ST_MinY", |b| b.miny)?;
    register_bounds_component(conn, "ST_MaxX", |b| b.maxx)?;
    register_bounds_component(conn, "ST_MaxY", |b| b.maxy)?;
    register_st_x(conn)?;
    register_st_y(conn)?;
    register_st_transform(conn)?;
    register_st_intersects(conn)?;
    register_st_make_envelope(conn)?;
    register_st_as_geojson(conn)?;
    Ok(())
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn(Bounds) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let wkb = match geometry_from_ctx(ctx, 0)? {
            Some((wkb, _)) => wkb,
            None => return Ok(None),
        };
        Ok(bounds_from_geometry(&wkb).map(f))
    })?;
    Ok(())
}

fn register_st_x(conn: &Connection) -> Result<()> {
    register_point_component(conn, "ST_X", |(x, _)| x)
}

fn register_st_y(conn: &Connection) -> Result<()> {
    register_point_component(conn, "ST_Y", |(_, y)| y)
}

fn register_point_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn((f64, f64)) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let wkb = match geometry_from_ctx(ctx, 0)? {
            Some((wkb, _)) => wkb,
            None => return Ok(None),
        };
        let xy = point_xy(&wkb).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
        Ok(xy.map(f))
    })?;
    Ok(())
}

fn register_st_transform(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_Transform",
        2,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let (wkb, from) = match geometry_from_ctx(ctx, 0)? {
                Some(decoded) => decoded,
                None => return Ok(None),
            };
            let to: i32 = ctx.get(1)?;

            // Identity transforms apply to any geometry type; actual
            // reprojection is point-only.
            if same_reference(from, to) {
                if let ValueRef::Blob(blob) = ctx.get_raw(0) {
                    return Ok(Some(blob.to_vec()));
                }
                unreachable!("geometry argument already decoded from a blob");
            }

            let xy = point_xy(&wkb).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
            match xy {
                Some((x, y)) => {
                    let (tx, ty) = transform_xy(x, y, from, to)
                        .map_err(|err| Error::UserFunctionError(Box::new(err)))?;
                    Ok(Some(point_blob(tx, ty, to)))
                }
                None => Ok(None),
            }
        },
    )?;
    Ok(())
}

fn register_st_intersects(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_Intersects",
        2,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let left = match geometry_from_ctx(ctx, 0)? {
                Some((wkb, _)) => wkb,
                None => return Ok(None),
            };
            let right = match geometry_from_ctx(ctx, 1)? {
                Some((wkb, _)) => wkb,
                None => return Ok(None),
            };

            // Envelope semantics: bounding rectangles overlapping.
            let intersects = match (bounds_from_geometry(&left), bounds_from_geometry(&right)) {
                (Some(a), Some(b)) => a.intersects(&b),
                _ => false,
            };
            Ok(Some(i64::from(intersects)))
        },
    )?;
    Ok(())
}

fn register_st_make_envelope(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_MakeEnvelope",
        5,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let xmin: f64 = ctx.get(0)?;
            let ymin: f64 = ctx.get(1)?;
            let xmax: f64 = ctx.get(2)?;
            let ymax: f64 = ctx.get(3)?;
            let srid: i32 = ctx.get(4)?;
            Ok(envelope_blob(xmin, ymin, xmax, ymax, srid))
        },
    )?;
    Ok(())
}

fn register_st_as_geojson(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_AsGeoJSON",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let wkb = match geometry_from_ctx(ctx, 0)? {
                Some((wkb, _)) => wkb,
                None => return Ok(None),
            };
            Ok(Some(geojson_geometry(&wkb).to_string()))
        },
    )?;
    Ok(())
}

fn geometry_from_ctx<'a>(
    ctx: &'a Context<'a>,
    idx: usize,
) -> std::result::Result<Option<(Wkb<'a>, i32)>, Error> {
    let value = ctx.get_raw(idx);
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => {
            let decoded =
                decode_geometry(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
            Ok(Some(decoded))
        }
        _ => Err(Error::InvalidFunctionParameterType(idx, Type::Blob)),
    }
}
