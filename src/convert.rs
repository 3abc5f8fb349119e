//! Job execution: the extract + render tail of every conversion.
//!
//! ## Two entry points
//!
//! * [`Pipeline::spawn_job`] runs after the HTTP response has been sent. It
//!   cannot report to the uploader directly, so every outcome is written to
//!   the [`JobRegistry`] and logged.
//! * [`convert_archive`] runs the same tail synchronously for an archive
//!   already on disk and returns the result to the caller (the CLI `convert`
//!   subcommand).

use crate::config::ServiceConfig;
use crate::error::{JobError, Zip2PdfError};
use crate::jobs::{JobRegistry, JobState};
use crate::output::{RenderedDocument, UploadedArchive};
use crate::pipeline::render::{render_document, RenderEngine};
use crate::pipeline::{extract, validate};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared handles every job needs. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<ServiceConfig>,
    pub engine: Arc<dyn RenderEngine>,
    pub jobs: Arc<JobRegistry>,
}

impl Pipeline {
    pub fn new(config: ServiceConfig, engine: Arc<dyn RenderEngine>) -> Self {
        let jobs = Arc::new(JobRegistry::from_config(&config));
        Self {
            config: Arc::new(config),
            engine,
            jobs,
        }
    }

    /// Run a stored upload to completion on its own task.
    pub fn spawn_job(&self, upload: UploadedArchive) -> JoinHandle<JobState> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run_job(upload).await })
    }

    /// Wait for a slot, extract, render, and record the terminal state.
    ///
    /// The upload must already be registered with [`JobRegistry::insert`].
    /// The job's extraction directory is removed once the state is recorded.
    pub async fn run_job(&self, upload: UploadedArchive) -> JobState {
        let id = upload.job_id;

        let state = match self.extract_and_render(&upload).await {
            Ok(doc) => {
                info!("Job {} produced {}", id, doc.path.display());
                JobState::succeeded(&doc)
            }
            Err(e) => {
                error!("Job {} ({:?}) failed: {}", id, upload.original_filename, e);
                JobState::Failed { error: e }
            }
        };

        self.jobs.transition(id, state.clone()).await;
        remove_working_dir(&self.config.job_extract_dir(id)).await;
        state
    }

    async fn extract_and_render(&self, upload: &UploadedArchive) -> Result<RenderedDocument, JobError> {
        let _permit = self.jobs.acquire().await?;
        let id = upload.job_id;

        self.jobs.transition(id, JobState::Extracting).await;
        let root = self.config.job_extract_dir(id);
        let tree = extract::extract_archive(&upload.stored_path, &root).await?;

        self.jobs.transition(id, JobState::Rendering).await;
        render_document(&tree.root, id, &self.config, Arc::clone(&self.engine)).await
    }
}

/// Convert a zip archive on disk to a PDF in `config.pdf_dir`.
///
/// The archive must sniff as a zip. It is extracted under a fresh job
/// directory in `config.extract_dir`; the uploads directory is not touched.
///
/// # Errors
/// [`Zip2PdfError::NotAZip`] for anything that is not a zip archive,
/// [`Zip2PdfError::Job`] for extraction or render failures.
pub async fn convert_archive(
    archive: impl AsRef<Path>,
    config: &ServiceConfig,
    engine: Arc<dyn RenderEngine>,
) -> Result<RenderedDocument, Zip2PdfError> {
    let archive = archive.as_ref();
    let read_failed = |e: std::io::Error| Zip2PdfError::StorageFailed {
        path: archive.to_path_buf(),
        source: e,
    };

    let mut head = Vec::with_capacity(validate::SNIFF_LEN);
    tokio::fs::File::open(archive)
        .await
        .map_err(read_failed)?
        .take(validate::SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await
        .map_err(read_failed)?;
    if head.is_empty() {
        return Err(Zip2PdfError::EmptyUpload);
    }
    validate::ensure_zip(&head)?;

    tokio::fs::create_dir_all(&config.pdf_dir)
        .await
        .map_err(|e| Zip2PdfError::Internal(format!("Failed to create '{}': {}", config.pdf_dir.display(), e)))?;

    let id = Uuid::new_v4();
    let root = config.job_extract_dir(id);
    info!("Converting {} as job {}", archive.display(), id);
    let result = match extract::extract_archive(archive, &root).await {
        Ok(tree) => render_document(&tree.root, id, config, engine).await,
        Err(e) => Err(e),
    };
    remove_working_dir(&root).await;
    Ok(result?)
}

/// Delete a job's extraction directory. Failures are logged, not returned.
async fn remove_working_dir(root: &Path) {
    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => debug!("Removed {}", root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", root.display(), e),
    }
}
