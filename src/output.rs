//! Values produced by each pipeline stage.
//!
//! Each struct is owned by the stage that creates it and handed forward by
//! value; none of them is shared between jobs.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// An upload that passed validation and was written to the uploads directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedArchive {
    pub job_id: Uuid,
    /// File name the client declared. Metadata only; never used as a path.
    pub original_filename: String,
    /// Server-assigned location, `<uploads>/<job-id>.zip`.
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    /// MIME type from content sniffing (always `application/zip` once stored).
    pub content_type: String,
}

/// Regular files materialised from one archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedTree {
    pub root: PathBuf,
    /// Paths relative to `root`, in archive order.
    pub files: Vec<PathBuf>,
    pub total_bytes: u64,
    pub skipped_dirs: usize,
    pub skipped_links: usize,
}

impl ExtractedTree {
    pub fn contains(&self, relative: &str) -> bool {
        self.files.iter().any(|f| f == std::path::Path::new(relative))
    }
}

/// Elapsed time and heap movement for one render.
///
/// The heap figure comes from [`crate::metrics::CountingAllocator`] and is
/// zero unless the binary installs it as the global allocator. It is a coarse
/// signal: other tasks allocating at the same time show up in it too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub elapsed_ms: u64,
    pub heap_delta_bytes: i64,
}

/// A PDF written to the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedDocument {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub completed_at: DateTime<Local>,
    pub metrics: PipelineMetrics,
}
