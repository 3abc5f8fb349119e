//! HTTP surface: `POST /upload` and `GET /jobs/{id}`.
//!
//! The upload handler owns validation and storage. Once the archive is on
//! disk it registers a job, spawns the extract/render tail, and answers
//! `200` immediately; conversion outcomes are read back from the job
//! endpoint.

use crate::config::ServiceConfig;
use crate::convert::Pipeline;
use crate::error::Zip2PdfError;
use crate::jobs::JobRecord;
use crate::output::UploadedArchive;
use crate::pipeline::render::RenderEngine;
use crate::pipeline::{store, validate};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Body of every successful upload response.
pub const UPLOAD_OK: &str = "File was uploaded successfully.\n";

/// Response header carrying the id of the job created by an upload.
pub const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-job-id");

/// Build the service router.
pub fn router(pipeline: Pipeline) -> Router {
    let body_limit = usize::try_from(pipeline.config.max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/upload", post(upload).fallback(method_not_allowed))
        .route("/jobs/{id}", get(job_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(pipeline)
}

/// Create the working directories, bind, and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig, engine: Arc<dyn RenderEngine>) -> Result<(), Zip2PdfError> {
    config.ensure_directories().await?;

    let addr = config.listen_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| Zip2PdfError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Listening on {} (engine: {})", addr, engine.name());

    let app = router(Pipeline::new(config, engine));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| Zip2PdfError::Internal(format!("server error: {}", e)))
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn upload(
    State(pipeline): State<Pipeline>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, Zip2PdfError> {
    let limit = pipeline.config.max_upload_bytes;
    if content_length(&headers).is_some_and(|len| len > limit) {
        return Err(Zip2PdfError::PayloadTooLarge { limit });
    }
    let mut multipart = multipart.map_err(|e| Zip2PdfError::BadRequest(e.body_text()))?;

    let wanted = pipeline.config.upload_field.as_str();
    let field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            Some(field) if field.name() == Some(wanted) => break field,
            Some(field) => debug!("Ignoring multipart field {:?}", field.name()),
            None => {
                return Err(Zip2PdfError::MissingFileField {
                    field: wanted.to_string(),
                })
            }
        }
    };
    let original_filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| Zip2PdfError::MissingFileField {
            field: wanted.to_string(),
        })?;

    let mut body = Box::pin(field.map_err(move |e| multipart_error(e, limit)));
    let head = validate::read_head(&mut body).await?;
    if head.is_empty() {
        return Err(Zip2PdfError::EmptyUpload);
    }
    validate::ensure_zip(&head)?;

    let job_id = Uuid::new_v4();
    let stored_path = pipeline.config.upload_path(job_id);
    let size_bytes = store::store_upload(&head, &mut body, &stored_path, limit).await?;
    info!(
        "Uploaded file {:?} stored as {} ({} bytes)",
        original_filename,
        stored_path.display(),
        size_bytes
    );

    let upload = UploadedArchive {
        job_id,
        original_filename,
        stored_path,
        size_bytes,
        content_type: validate::ZIP_MIME.to_string(),
    };
    pipeline.jobs.insert(&upload).await;
    pipeline.spawn_job(upload);

    let mut out = HeaderMap::new();
    out.insert(JOB_ID_HEADER, header_value(job_id.to_string())?);
    out.insert(header::LOCATION, header_value(format!("/jobs/{}", job_id))?);
    Ok((StatusCode::OK, out, UPLOAD_OK).into_response())
}

async fn job_status(
    State(pipeline): State<Pipeline>,
    Path(raw): Path<String>,
) -> Result<Json<JobRecord>, Zip2PdfError> {
    let id = Uuid::parse_str(&raw).map_err(|_| Zip2PdfError::InvalidJobId(raw.clone()))?;
    pipeline
        .jobs
        .get(id)
        .await
        .map(Json)
        .ok_or(Zip2PdfError::JobNotFound { id })
}

async fn method_not_allowed() -> Zip2PdfError {
    Zip2PdfError::MethodNotAllowed
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// The body limit surfaces inside multipart parsing; keep it a 413.
fn multipart_error(e: MultipartError, limit: u64) -> Zip2PdfError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Zip2PdfError::PayloadTooLarge { limit }
    } else {
        Zip2PdfError::BadRequest(e.body_text())
    }
}

fn header_value(value: String) -> Result<HeaderValue, Zip2PdfError> {
    HeaderValue::try_from(value).map_err(|e| Zip2PdfError::Internal(e.to_string()))
}

impl IntoResponse for Zip2PdfError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        (status, format!("{}\n", self)).into_response()
    }
}
