use rusqlite::params;
use rusqlite_featureserver::types::{FieldSpec, FieldType, GeometryKind, SpatialReference};
use rusqlite_featureserver::{
    FeatureService, LayerDefinition, QueryContext, QueryRequest, SqliteDataSource, StaticLayer,
    point_blob,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("demo_query failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let source = SqliteDataSource::open_in_memory()?;
    seed_cities(&source)?;

    let mut service = FeatureService::new(source);
    service.register(StaticLayer::new(LayerDefinition {
        id: 0,
        name: "cities".to_string(),
        table: "cities".to_string(),
        geometry_kind: GeometryKind::Point,
        fields: vec![
            FieldSpec::new("id", FieldType::ObjectId),
            FieldSpec::new("name", FieldType::String),
            FieldSpec::new("population", FieldType::Integer),
        ],
        object_id_field: "id".to_string(),
        geometry_column: "geom".to_string(),
        spatial_reference: SpatialReference::wgs84(),
        max_record_count: 1000,
        extent: None,
    }))?;

    // Remaining arguments are query parameters in key=value form, e.g.
    //   demo_query where="population > 1000000" f=geojson
    let args: Vec<String> = std::env::args().skip(1).collect();
    let pairs: Vec<(&str, &str)> = args
        .iter()
        .filter_map(|arg| arg.split_once('='))
        .collect();
    let request = QueryRequest::from_pairs(pairs.iter().copied());

    let payload = service.query(0, &request, &QueryContext::default())?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn seed_cities(source: &SqliteDataSource) -> Result<(), Box<dyn std::error::Error>> {
    let conn = source.connection();
    conn.execute_batch(
        "CREATE TABLE cities (id INTEGER PRIMARY KEY, name TEXT, population INTEGER, geom BLOB)",
    )?;

    let cities: [(&str, i64, f64, f64); 4] = [
        ("Los Angeles", 3_898_747, -118.2437, 34.0522),
        ("Tokyo", 13_960_000, 139.6917, 35.6895),
        ("Reykjavik", 131_136, -21.8954, 64.1466),
        ("Nairobi", 4_397_073, 36.8219, -1.2921),
    ];
    for (idx, (name, population, lon, lat)) in cities.iter().enumerate() {
        conn.execute(
            "INSERT INTO cities (id, name, population, geom) VALUES (?1, ?2, ?3, ?4)",
            params![idx as i64 + 1, name, population, point_blob(*lon, *lat, 4326)],
        )?;
    }
    Ok(())
}
