//! HTTP server for cfload.
//!
//! Parses uploaded CSV files and returns the records without writing them.
//!
//! # API Endpoints
//!
//! | Method | Path            | Description                                   |
//! |--------|-----------------|-----------------------------------------------|
//! | GET    | `/health`       | Health check                                  |
//! | POST   | `/api/flows`    | Upload CSV (`file` field), returns flows      |
//! | POST   | `/api/factors`  | Upload CSV (`file` field), returns factors    |
//! | GET    | `/api/logs`     | SSE stream for real-time logs                 |
//!
//! Both upload endpoints take `?policy=abort|skip` (default `abort`).

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, log_warning, LOG_BROADCASTER};
use super::types::{error_response, CsvMetadata, ParseQuery, ParseResponse};
use crate::config::ColumnConfig;
use crate::error::{LoadError, ServerResult};
use crate::models::{CharacterizationEntry, FlowRecord};
use crate::transform::{FactorRows, FlowRows};

type ApiError = (StatusCode, Json<Value>);

/// Router with every endpoint, for a server or a test listener.
pub fn router(columns: ColumnConfig) -> Router {
    // Permissive CORS for browser clients
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/flows", post(upload_flows))
        .route("/api/factors", post(upload_factors))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(columns))
}

/// Start the HTTP server
pub async fn start_server(port: u16, columns: ColumnConfig) -> ServerResult<()> {
    let app = router(columns);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("cfload server running on http://localhost:{port}");
    tracing::info!("  POST /api/flows   - Parse flows from a CSV upload");
    tracing::info!("  POST /api/factors - Parse characterization factors from a CSV upload");
    tracing::info!("  GET  /api/logs    - SSE log stream");
    tracing::info!("  GET  /health      - Health check");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "cfload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "flows": "POST /api/flows",
            "factors": "POST /api/factors",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip the lost entries
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn upload_flows(
    State(columns): State<Arc<ColumnConfig>>,
    Query(query): Query<ParseQuery>,
    multipart: Multipart,
) -> Result<Json<ParseResponse<FlowRecord>>, ApiError> {
    let (file_name, bytes) = read_upload(multipart).await?;
    log_info(format!(
        "📄 Flows upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let rows = FlowRows::from_bytes(&bytes, &columns).map_err(reject)?;
    let metadata = CsvMetadata::from_source(rows.source(), file_name);
    let parsed = rows.into_parsed(query.policy).map_err(reject)?;

    Ok(Json(respond(parsed, metadata, "flows")))
}

async fn upload_factors(
    State(columns): State<Arc<ColumnConfig>>,
    Query(query): Query<ParseQuery>,
    multipart: Multipart,
) -> Result<Json<ParseResponse<CharacterizationEntry>>, ApiError> {
    let (file_name, bytes) = read_upload(multipart).await?;
    log_info(format!(
        "📄 Factors upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let rows = FactorRows::from_bytes(&bytes, &columns).map_err(reject)?;
    let metadata = CsvMetadata::from_source(rows.source(), file_name);
    let parsed = rows.into_parsed(query.policy).map_err(reject)?;

    Ok(Json(respond(parsed, metadata, "factors")))
}

fn respond<T: Serialize>(
    parsed: crate::models::Parsed<T>,
    metadata: CsvMetadata,
    what: &str,
) -> ParseResponse<T> {
    if parsed.is_clean() {
        log_success(format!("{} {what} from {} rows", parsed.records.len(), parsed.rows_read));
    } else {
        log_warning(format!(
            "{} {what} from {} rows, {} rows skipped",
            parsed.records.len(),
            parsed.rows_read,
            parsed.rejected.len()
        ));
    }
    ParseResponse::new(parsed, metadata)
}

/// The `file` field of a multipart upload.
async fn read_upload(mut multipart: Multipart) -> Result<(Option<String>, Vec<u8>), ApiError> {
    let mut file_data = None;
    let mut file_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(String::from);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(&format!("Read error: {e}")))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided"))?;
    Ok((file_name, bytes))
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(message)))
}

/// Map a parse failure to an HTTP error.
fn reject(error: LoadError) -> ApiError {
    log_error(error.to_string());
    let status = match &error {
        LoadError::FileAccess { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        LoadError::Encoding(_) | LoadError::Schema { .. } | LoadError::Row(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    (status, Json(error_response(&error.to_string())))
}
