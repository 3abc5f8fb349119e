//! Error types for the zip2pdf library.
//!
//! Two distinct error types reflect two distinct points in a job's life:
//!
//! * [`Zip2PdfError`] (**fatal, client-visible**): raised before the upload
//!   response is written (bad request, oversized body, storage failure) or
//!   during startup. The HTTP layer turns it into a status code and a
//!   plain-text message.
//!
//! * [`JobError`] (**post-response**): extraction or rendering failed after
//!   the client was already told the upload succeeded. Stored inside
//!   [`crate::jobs::JobState::Failed`] so it can be reported through
//!   `GET /jobs/{id}` instead of vanishing into the log.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the zip2pdf library.
#[derive(Debug, Error)]
pub enum Zip2PdfError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Anything but POST on the upload route.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Request body is larger than the configured ceiling.
    #[error("The uploaded file is too big. Please choose a file that's less than {} MB in size", limit / (1024 * 1024))]
    PayloadTooLarge { limit: u64 },

    /// Malformed multipart body or otherwise unreadable request.
    #[error("{0}")]
    BadRequest(String),

    /// The multipart form had no file part under the expected name.
    #[error("http: no such file (expected multipart field '{field}')")]
    MissingFileField { field: String },

    /// The file part was present but contained no bytes.
    #[error("The uploaded file is empty")]
    EmptyUpload,

    /// Content sniffing did not classify the upload as a zip archive.
    #[error("The provided file format is not allowed. Please upload a zip archive (expected application/zip, detected {detected})")]
    NotAZip { detected: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not create or write the stored copy of the upload.
    #[error("Failed to store upload at '{path}': {source}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Job lookup errors ─────────────────────────────────────────────────
    /// No job with this id is tracked.
    #[error("Job {id} not found")]
    JobNotFound { id: Uuid },

    /// The path segment is not a job id.
    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),

    // ── Startup errors ────────────────────────────────────────────────────
    /// The render engine could not be found or probed.
    #[error(
        "Render engine unavailable: {0}\n\n\
Install wkhtmltopdf (https://wkhtmltopdf.org/downloads.html) or pass\n\
--engine /path/to/wkhtmltopdf.\n"
    )]
    EngineUnavailable(String),

    /// The listener could not bind.
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Extraction or rendering failed in a synchronous run.
    #[error(transparent)]
    Job(#[from] JobError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Zip2PdfError {
    /// HTTP status used when this error is written to a client.
    pub fn status_code(&self) -> u16 {
        match self {
            Zip2PdfError::MethodNotAllowed => 405,
            Zip2PdfError::PayloadTooLarge { .. } => 413,
            Zip2PdfError::BadRequest(_)
            | Zip2PdfError::MissingFileField { .. }
            | Zip2PdfError::EmptyUpload
            | Zip2PdfError::NotAZip { .. }
            | Zip2PdfError::InvalidJobId(_) => 400,
            Zip2PdfError::JobNotFound { .. } => 404,
            Zip2PdfError::StorageFailed { .. }
            | Zip2PdfError::EngineUnavailable(_)
            | Zip2PdfError::Bind { .. }
            | Zip2PdfError::InvalidConfig(_)
            | Zip2PdfError::Job(_)
            | Zip2PdfError::Internal(_) => 500,
        }
    }
}

/// A failure in the extract/render tail of a job.
///
/// Stored in [`crate::jobs::JobState::Failed`]; the HTTP response for the
/// upload has already been sent when one of these is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    /// The stored upload could not be parsed as a zip container.
    #[error("Invalid zip archive '{path}': {detail}")]
    InvalidArchive { path: PathBuf, detail: String },

    /// An entry name is absolute or climbs out of the extraction root.
    #[error("Archive entry '{entry}' escapes the extraction directory")]
    UnsafeEntryPath { entry: String },

    /// Opening, creating, or copying one entry failed.
    #[error("Failed to extract '{entry}': {detail}")]
    ExtractionFailed { entry: String, detail: String },

    /// The HTML entry file is not in the extracted tree.
    #[error("open {}: no such file or directory", path.display())]
    EntryNotFound { path: PathBuf },

    /// The engine exited with an error or produced no PDF.
    #[error("Render failed: {detail}")]
    RenderFailure { detail: String },

    /// The engine ran past the configured timeout and was killed.
    #[error("Render timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    /// Writing the PDF into the output directory failed.
    #[error("Failed to write PDF '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    /// Unexpected internal error (e.g. a panicked blocking task).
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}
