//! HTTP request adapter.
//!
//! Parses the dataset name, locations and kernel, hands the batch to the
//! engine, and shapes the JSON response. All sampling policy lives in
//! the engine.
//!
//! The surface is `GET /v1/{dataset}?locations=lat,lng|lat,lng` (or a
//! Google-polyline-encoded `locations`) and `POST /v1/{dataset}` with the
//! same fields as a JSON body.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::engine::{Engine, PointResult};
use crate::error::QueryError;
use crate::sample::Kernel;

pub struct AppState {
    pub engine: Engine,
    pub max_locations: usize,
}

/// Top-level response status, as it appears on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    InvalidRequest,
    ServerError,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<PointResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ElevationParams {
    pub locations: Option<String>,
    pub interpolation: Option<String>,
}

/// Build the service router. `allow_origin` mirrors the config option;
/// `*` allows any origin, anything else is sent back verbatim.
pub fn router(state: Arc<AppState>, allow_origin: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/", get(health))
        .route("/v1/", get(help))
        .route("/v1/:dataset", get(get_elevation).post(post_elevation))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = allow_origin {
        let cors = if origin == "*" {
            Some(CorsLayer::new().allow_origin(Any))
        } else {
            match origin.parse::<HeaderValue>() {
                Ok(value) => Some(CorsLayer::new().allow_origin(value)),
                Err(_) => {
                    warn!(origin, "ignoring unusable access_control_allow_origin");
                    None
                }
            }
        };
        if let Some(cors) = cors {
            router = router.layer(cors);
        }
    }
    router
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn help() -> Response {
    let body = QueryResponse {
        status: Status::InvalidRequest,
        results: None,
        error: Some(
            "No dataset name provided. Try a url like \
             '/v1/test-dataset?locations=-10,120' to get started."
                .to_string(),
        ),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn get_elevation(
    Path(dataset): Path<String>,
    Query(params): Query<ElevationParams>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    run_query(state, dataset, params).await
}

async fn post_elevation(
    Path(dataset): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(params): Json<ElevationParams>,
) -> Response {
    run_query(state, dataset, params).await
}

async fn run_query(state: Arc<AppState>, dataset: String, params: ElevationParams) -> Response {
    let kernel = match params.interpolation.as_deref() {
        None => None,
        Some(name) => match Kernel::from_name(name) {
            Some(kernel) => Some(kernel),
            None => {
                return invalid_request(format!(
                    "Invalid interpolation method '{name}' not recognized. \
                     Valid interpolation methods: nearest, bilinear, cubic."
                ))
            }
        },
    };

    let points = match parse_locations(params.locations.as_deref(), state.max_locations) {
        Ok(points) => points,
        Err(message) => return invalid_request(message),
    };

    // The engine is synchronous and disk-bound; keep it off the runtime
    let task = tokio::task::spawn_blocking(move || {
        state.engine.query(&dataset, &points, kernel)
    });

    match task.await {
        Ok(Ok(results)) => Json(QueryResponse {
            status: Status::Ok,
            results: Some(results),
            error: None,
        })
        .into_response(),
        Ok(Err(QueryError::DatasetNotFound(name))) => {
            invalid_request(format!("Dataset '{name}' not found."))
        }
        Ok(Err(QueryError::Raster(e))) => {
            error!(error = %e, "query failed");
            server_error()
        }
        Err(e) => {
            error!(error = %e, "query task panicked");
            server_error()
        }
    }
}

fn invalid_request(message: String) -> Response {
    let body = QueryResponse {
        status: Status::InvalidRequest,
        results: None,
        error: Some(message),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn server_error() -> Response {
    let body = QueryResponse {
        status: Status::ServerError,
        results: None,
        error: Some("Server error, please retry request.".to_string()),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Parse the `locations` field: `lat,lng` pairs separated by `|`, or a
/// Google polyline (optionally prefixed with `enc:`).
///
/// Latitude range problems are not checked here; the engine reports them
/// per point so one bad point cannot poison a batch.
fn parse_locations(raw: Option<&str>, max_locations: usize) -> Result<Vec<(f64, f64)>, String> {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() {
        return Err(
            "No locations provided. Add locations in a query string: \
             ?locations=lat1,lng1|lat2,lng2."
                .to_string(),
        );
    }

    if raw.contains(',') {
        parse_latlng_pairs(raw, max_locations)
    } else {
        parse_polyline(raw, max_locations)
    }
}

fn parse_latlng_pairs(raw: &str, max_locations: usize) -> Result<Vec<(f64, f64)>, String> {
    let pairs: Vec<&str> = raw.trim_matches('|').split('|').collect();
    if pairs.len() > max_locations {
        return Err(format!(
            "Too many locations provided ({}), the limit is {max_locations}.",
            pairs.len()
        ));
    }

    let mut points = Vec::with_capacity(pairs.len());
    for (i, pair) in pairs.iter().enumerate() {
        let parse = |pair: &str| -> Option<(f64, f64)> {
            let (lat, lng) = pair.split_once(',')?;
            Some((lat.trim().parse().ok()?, lng.trim().parse().ok()?))
        };
        match parse(pair) {
            Some(point) => points.push(point),
            None => {
                return Err(format!(
                    "Unable to parse location '{pair}' in position {}. \
                     Add locations like lat1,lng1|lat2,lng2.",
                    i + 1
                ))
            }
        }
    }
    Ok(points)
}

fn parse_polyline(raw: &str, max_locations: usize) -> Result<Vec<(f64, f64)>, String> {
    // Google's directions API prefixes polylines with 'enc:'
    let encoded = raw.strip_prefix("enc:").unwrap_or(raw);
    let line = polyline::decode_polyline(encoded, 5)
        .map_err(|_| "Unable to parse locations as polyline.".to_string())?;

    let points: Vec<(f64, f64)> = line.0.iter().map(|c| (c.y, c.x)).collect();
    if points.len() > max_locations {
        return Err(format!(
            "Too many locations provided ({}), the limit is {max_locations}.",
            points.len()
        ));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Location;

    #[test]
    fn test_parse_pipe_separated_pairs() {
        let points = parse_locations(Some("56.35,123.90|-10.5,120"), 100).unwrap();
        assert_eq!(points, vec![(56.35, 123.90), (-10.5, 120.0)]);

        // Trailing separators and spaces are tolerated
        let points = parse_locations(Some("|1,2| 3 , 4 |"), 100).unwrap();
        assert_eq!(points, vec![(1.0, 2.0), (3.0, 4.0)]);
    }

    #[test]
    fn test_parse_rejects_missing_locations() {
        assert!(parse_locations(None, 100).is_err());
        assert!(parse_locations(Some("   "), 100).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_pairs() {
        let err = parse_locations(Some("1,2|garbage"), 100).unwrap_err();
        assert!(err.contains("position 2"));
        assert!(parse_locations(Some("1;2"), 100).is_err());
        assert!(parse_locations(Some("1,2,3x"), 100).is_err());
    }

    #[test]
    fn test_parse_out_of_range_latitude_is_accepted_here() {
        // Range problems surface per point from the engine
        let points = parse_locations(Some("91,0"), 100).unwrap();
        assert_eq!(points, vec![(91.0, 0.0)]);
    }

    #[test]
    fn test_parse_enforces_location_limit() {
        let raw = (0..11).map(|i| format!("{i},0")).collect::<Vec<_>>().join("|");
        let err = parse_locations(Some(&raw), 10).unwrap_err();
        assert!(err.contains("limit is 10"));
        assert!(parse_locations(Some(&raw), 11).is_ok());
    }

    #[test]
    fn test_parse_polyline() {
        // The classic encoding of (38.5, -120.2), (40.7, -120.95),
        // (43.252, -126.453)
        let encoded = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";
        for raw in [encoded.to_string(), format!("enc:{encoded}")] {
            let points = parse_locations(Some(&raw), 100).unwrap();
            assert_eq!(points.len(), 3);
            assert!((points[0].0 - 38.5).abs() < 1e-9);
            assert!((points[0].1 - -120.2).abs() < 1e-9);
            assert!((points[2].0 - 43.252).abs() < 1e-9);
        }
    }

    #[test]
    fn test_parse_polyline_rejects_garbage() {
        // No comma forces the polyline path; invalid characters fail
        assert!(parse_locations(Some("\u{1}\u{2}"), 100).is_err());
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&Status::InvalidRequest).unwrap(),
            "\"INVALID_REQUEST\""
        );
        assert_eq!(
            serde_json::to_string(&Status::ServerError).unwrap(),
            "\"SERVER_ERROR\""
        );
    }

    #[test]
    fn test_response_serialization_shape() {
        let body = QueryResponse {
            status: Status::Ok,
            results: Some(vec![PointResult {
                elevation: None,
                location: Location { lat: 1.0, lng: 2.0 },
                error: None,
            }]),
            error: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        // Null elevations stay present; absent errors disappear
        assert!(json.contains("\"elevation\":null"));
        assert!(json.contains("\"location\":{\"lat\":1.0,\"lng\":2.0}"));
        assert!(!json.contains("\"error\""));
    }
}
