//! Axum HTTP handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rayon::prelude::*;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{fs::ServeFileSystemResponseBody, ServeDir};
use tower_http::set_header::SetResponseHeader;

use crate::archive::{ZipBundle, ARCHIVE_FILE_NAME, ARCHIVE_MIME_TYPE};
use crate::config::ServerOptions;
use crate::converter::ImageConverter;
use crate::error::{ApiError, ApiResult};
use crate::format::{FormatInfo, OutputFormat};
use crate::naming::{content_disposition, output_file_name};
use crate::request::{resolve_settings, FormFields};
use crate::stats::{ConversionStats, StatsSnapshot};

const SINGLE_FILE_FIELD: &str = "image";
const BATCH_FILE_FIELD: &str = "images";

const SINGLE_FAILURE: &str = "Failed to convert image";
const BATCH_FAILURE: &str = "Failed to convert images";

const STATIC_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub options: Arc<ServerOptions>,
    pub stats: ConversionStats,
}

impl AppState {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
            stats: ConversionStats::new(),
        }
    }
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/convert", post(convert_handler))
        .route("/convert-all", post(convert_all_handler))
        .route("/formats", get(formats_handler))
        .route("/stats", get(stats_handler));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api);

    if let Some(static_dir) = &state.options.static_dir {
        let assets = SetResponseHeader::if_not_present(
            ServeDir::new(static_dir),
            header::CACHE_CONTROL,
            asset_cache_control,
        );
        router = router.fallback_service(assets);
    }

    router = router.layer(DefaultBodyLimit::max(state.options.max_upload_bytes));
    if state.options.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// HTML pages are revalidated; every other served asset is immutable
fn asset_cache_control(
    response: &axum::http::Response<ServeFileSystemResponseBody>,
) -> Option<HeaderValue> {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));

    (response.status().is_success() && !is_html)
        .then(|| HeaderValue::from_static(STATIC_CACHE_CONTROL))
}

/// Bind and serve until Ctrl-C
pub async fn serve(options: ServerOptions) -> Result<()> {
    let addr = options.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    log::info!(
        "Server listening on http://{} (upload limit {}, {} images per batch)",
        addr,
        humansize::format_size(options.max_upload_bytes, humansize::DECIMAL),
        options.max_files
    );
    if let Some(static_dir) = &options.static_dir {
        log::info!("Serving static assets from {}", static_dir.display());
    }

    let app = create_router(AppState::new(options));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

struct Upload {
    file_name: Option<String>,
    data: Bytes,
}

impl Upload {
    fn label(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }
}

struct UploadForm {
    files: Vec<Upload>,
    fields: FormFields,
}

async fn read_form(mut multipart: Multipart, file_field: &str) -> ApiResult<UploadForm> {
    let mut files = Vec::new();
    let mut fields = FormFields::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .filter(|name| !name.is_empty());
            let data = field.bytes().await?;

            // Browsers submit an empty part for an unfilled file input
            if data.is_empty() && file_name.is_none() {
                continue;
            }
            files.push(Upload { file_name, data });
        } else if field.file_name().is_some() {
            log::debug!("Ignoring file in unexpected form field: {name}");
        } else {
            let value = field.text().await?;
            if !fields.set(&name, value) {
                log::debug!("Ignoring unknown form field: {name}");
            }
        }
    }

    Ok(UploadForm { files, fields })
}

fn attachment(content_type: &str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(file_name)),
        ],
        body,
    )
        .into_response()
}

async fn convert_handler(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = read_form(multipart, SINGLE_FILE_FIELD).await?;
    let upload = form.files.into_iter().next().ok_or(ApiError::NoImage)?;
    let settings = resolve_settings(&form.fields, &state.options.defaults, &state.options.profiles)?;

    let file_name = output_file_name(upload.file_name.as_deref(), &settings.target.extension);
    let converter = state.options.defaults.converter(settings);
    let label = upload.label();
    let original_size = upload.data.len() as u64;

    let result = tokio::task::spawn_blocking(move || converter.convert(&upload.data))
        .await
        .map_err(|e| ApiError::Internal {
            context: SINGLE_FAILURE,
            detail: e.to_string(),
        })?;

    match result {
        Ok(converted) => {
            state
                .stats
                .record_success(converted.format, original_size, converted.data.len() as u64);
            log::info!(
                "Converted {} -> {} ({} -> {})",
                label,
                file_name,
                humansize::format_size(original_size, humansize::DECIMAL),
                humansize::format_size(converted.data.len(), humansize::DECIMAL)
            );
            Ok(attachment(converted.mime_type, &file_name, converted.data))
        }
        Err(e) => {
            state.stats.record_error(label.clone(), e.to_string());
            Err(ApiError::conversion(SINGLE_FAILURE, Some(label), e))
        }
    }
}

async fn convert_all_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let form = read_form(multipart, BATCH_FILE_FIELD).await?;
    if form.files.is_empty() {
        return Err(ApiError::NoImages);
    }
    if form.files.len() > state.options.max_files {
        return Err(ApiError::TooManyImages {
            limit: state.options.max_files,
        });
    }

    let settings = resolve_settings(&form.fields, &state.options.defaults, &state.options.profiles)?;
    let converter = state.options.defaults.converter(settings);
    let stats = state.stats.clone();
    let files = form.files;
    let count = files.len();

    let archive = tokio::task::spawn_blocking(move || convert_batch(&converter, &files, &stats))
        .await
        .map_err(|e| ApiError::Internal {
            context: BATCH_FAILURE,
            detail: e.to_string(),
        })??;

    log::info!(
        "Converted batch of {} images ({} archive)",
        count,
        humansize::format_size(archive.len(), humansize::DECIMAL)
    );
    Ok(attachment(ARCHIVE_MIME_TYPE, ARCHIVE_FILE_NAME, archive))
}

/// Convert every upload in parallel and zip the results in upload order.
/// The first failure fails the whole batch; statistics only count batches
/// that were delivered.
fn convert_batch(
    converter: &ImageConverter,
    files: &[Upload],
    stats: &ConversionStats,
) -> ApiResult<Vec<u8>> {
    let results: Vec<_> = files
        .par_iter()
        .map(|upload| converter.convert(&upload.data))
        .collect();

    let mut converted = Vec::with_capacity(files.len());
    for (upload, result) in files.iter().zip(results) {
        match result {
            Ok(image) => converted.push(image),
            Err(e) => {
                stats.record_error(upload.label(), e.to_string());
                return Err(ApiError::conversion(BATCH_FAILURE, Some(upload.label()), e));
            }
        }
    }

    let extension = &converter.settings().target.extension;
    let mut bundle = ZipBundle::new();
    for (upload, image) in files.iter().zip(&converted) {
        let name = output_file_name(upload.file_name.as_deref(), extension);
        bundle
            .add(&name, &image.data)
            .map_err(|e| ApiError::conversion(BATCH_FAILURE, Some(upload.label()), e))?;
    }
    let archive = bundle
        .finish()
        .map_err(|e| ApiError::conversion(BATCH_FAILURE, None, e))?;

    for (upload, image) in files.iter().zip(&converted) {
        stats.record_success(image.format, upload.data.len() as u64, image.data.len() as u64);
    }

    Ok(archive)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn formats_handler() -> Json<Vec<FormatInfo>> {
    Json(OutputFormat::all().iter().copied().map(FormatInfo::from).collect())
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}
