//! Configuration for the upload-extract-render service.
//!
//! Every knob lives in [`ServiceConfig`], built via [`ServiceConfigBuilder`].
//! The defaults reproduce the fixed layout the service has always used
//! (`./uploads`, `./unziped`, `./pdfs`, `./logs`, port 3333, 2000 MB
//! ceiling), so `ServiceConfig::default()` is a drop-in for the historical
//! behaviour. There is no environment-variable layer; the binary maps its
//! command-line flags onto the builder.

use crate::error::Zip2PdfError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on an upload request body: 2000 MiB.
pub const MAX_UPLOAD_SIZE: u64 = 1024 * 1024 * 2000;
/// Name of the HTML file rendered from each archive.
pub const HTML_FILE_NAME: &str = "index.html";
/// Multipart field carrying the archive.
pub const UPLOAD_FIELD: &str = "file";
pub const UPLOADS_DIR: &str = "./uploads";
pub const UNZIP_DIR: &str = "./unziped";
pub const PDF_DIR: &str = "./pdfs";
pub const LOG_FILE: &str = "./logs";
pub const LISTEN_ADDR: &str = "0.0.0.0:3333";

/// Configuration for the zip2pdf service.
///
/// # Example
/// ```rust
/// use zip2pdf::{OutputNaming, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .listen_addr("127.0.0.1:8080")
///     .max_concurrent_jobs(2)
///     .output_naming(OutputNaming::Timestamp)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_concurrent_jobs, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Socket address the HTTP listener binds. Default: `0.0.0.0:3333`.
    pub listen_addr: String,

    /// Where original uploads are stored as `<job-id>.zip`.
    pub uploads_dir: PathBuf,

    /// Root of the per-job extraction directories.
    pub extract_dir: PathBuf,

    /// Where rendered PDFs are written.
    pub pdf_dir: PathBuf,

    /// Append-only log file used by the binary.
    pub log_file: PathBuf,

    /// Request body ceiling in bytes. Default: [`MAX_UPLOAD_SIZE`].
    pub max_upload_bytes: u64,

    /// Multipart field name carrying the archive. Default: `file`.
    pub upload_field: String,

    /// HTML file, relative to the extraction root, handed to the engine.
    pub entry_file: String,

    /// Maximum number of jobs extracting or rendering at the same time. Default: 4.
    ///
    /// Uploads are never refused because of this limit; surplus jobs wait
    /// in the `queued` state until a slot frees up.
    pub max_concurrent_jobs: usize,

    /// Number of job records kept in memory for status queries. Default: 1024.
    ///
    /// When full, the oldest finished job is forgotten first.
    pub max_tracked_jobs: usize,

    /// Kill the engine after this many seconds. Default: no limit.
    pub render_timeout_secs: Option<u64>,

    /// Explicit path to the engine executable. Default: search `PATH`.
    pub engine_path: Option<PathBuf>,

    /// How rendered PDFs are named. Default: [`OutputNaming::TimestampJob`].
    pub output_naming: OutputNaming,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: LISTEN_ADDR.to_string(),
            uploads_dir: PathBuf::from(UPLOADS_DIR),
            extract_dir: PathBuf::from(UNZIP_DIR),
            pdf_dir: PathBuf::from(PDF_DIR),
            log_file: PathBuf::from(LOG_FILE),
            max_upload_bytes: MAX_UPLOAD_SIZE,
            upload_field: UPLOAD_FIELD.to_string(),
            entry_file: HTML_FILE_NAME.to_string(),
            max_concurrent_jobs: 4,
            max_tracked_jobs: 1024,
            render_timeout_secs: None,
            engine_path: None,
            output_naming: OutputNaming::default(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create the uploads, extraction, and PDF directories if missing.
    pub async fn ensure_directories(&self) -> Result<(), Zip2PdfError> {
        for dir in [&self.uploads_dir, &self.extract_dir, &self.pdf_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Zip2PdfError::Internal(format!("Failed to create '{}': {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Path of the stored upload for a job.
    pub fn upload_path(&self, job_id: uuid::Uuid) -> PathBuf {
        self.uploads_dir.join(format!("{}.zip", job_id))
    }

    /// Extraction root for a job.
    pub fn job_extract_dir(&self, job_id: uuid::Uuid) -> PathBuf {
        self.extract_dir.join(job_id.to_string())
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn uploads_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.uploads_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn extract_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.extract_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn pdf_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.pdf_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config.log_file = path.as_ref().to_path_buf();
        self
    }

    /// Place uploads, extraction trees, PDFs, and the log under one root.
    pub fn base_dir(self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.uploads_dir(root.join("uploads"))
            .extract_dir(root.join("unziped"))
            .pdf_dir(root.join("pdfs"))
            .log_file(root.join("logs"))
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn upload_field(mut self, name: impl Into<String>) -> Self {
        self.config.upload_field = name.into();
        self
    }

    pub fn entry_file(mut self, name: impl Into<String>) -> Self {
        self.config.entry_file = name.into();
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn max_tracked_jobs(mut self, n: usize) -> Self {
        self.config.max_tracked_jobs = n.max(1);
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = Some(secs);
        self
    }

    pub fn engine_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.engine_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn output_naming(mut self, naming: OutputNaming) -> Self {
        self.config.output_naming = naming;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Zip2PdfError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(Zip2PdfError::InvalidConfig(
                "max_upload_bytes must be > 0".into(),
            ));
        }
        if usize::try_from(c.max_upload_bytes).is_err() {
            return Err(Zip2PdfError::InvalidConfig(format!(
                "max_upload_bytes {} does not fit this platform's address space",
                c.max_upload_bytes
            )));
        }
        if c.upload_field.is_empty() {
            return Err(Zip2PdfError::InvalidConfig(
                "upload_field must not be empty".into(),
            ));
        }
        let entry = Path::new(&c.entry_file);
        if c.entry_file.is_empty()
            || entry.is_absolute()
            || entry
                .components()
                .any(|part| matches!(part, std::path::Component::ParentDir))
        {
            return Err(Zip2PdfError::InvalidConfig(format!(
                "entry_file must be a relative path inside the archive, got '{}'",
                c.entry_file
            )));
        }
        if c.render_timeout_secs == Some(0) {
            return Err(Zip2PdfError::InvalidConfig(
                "render_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How rendered PDF files are named in the output directory.
///
/// | Variant | Example | Unique? |
/// |---------|---------|---------|
/// | `Timestamp` | `20240131235959.pdf` | No: same-second renders overwrite each other |
/// | `TimestampJob` | `20240131235959-<job id>.pdf` | Yes (default) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// `YYYYMMDDhhmmss.pdf`, the legacy layout.
    Timestamp,
    /// `YYYYMMDDhhmmss-<job id>.pdf`. (default)
    #[default]
    TimestampJob,
}
