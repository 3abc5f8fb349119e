//! # zip2pdf
//!
//! Accept a zipped static HTML site over HTTP and render its `index.html` to
//! PDF with an external engine (`wkhtmltopdf`).
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /upload (multipart field "file")
//!  │
//!  ├─ 1. Validate  size ceiling + sniff first 512 bytes (zip only)
//!  ├─ 2. Store     stream to ./uploads/<job-id>.zip
//!  │     ── 200 "File was uploaded successfully." ──
//!  ├─ 3. Extract   regular files into ./unziped/<job-id>/ (spawn_blocking)
//!  ├─ 4. Render    index.html → engine → ./pdfs/<timestamp>-<job-id>.pdf
//!  └─ 5. Record    terminal state readable at GET /jobs/<job-id>
//! ```
//!
//! Steps 3 and 4 run after the response, bounded by a semaphore of
//! `max_concurrent_jobs` permits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zip2pdf::{serve, ServiceConfig, WkHtmlToPdf};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let engine = WkHtmlToPdf::from_config(&config)?;
//!     serve(config, Arc::new(engine)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `zip2pdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! zip2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OutputNaming, ServiceConfig, ServiceConfigBuilder};
pub use convert::{convert_archive, Pipeline};
pub use error::{JobError, Zip2PdfError};
pub use jobs::{JobRecord, JobRegistry, JobState};
pub use metrics::{CountingAllocator, COUNTING_ALLOCATOR};
pub use output::{ExtractedTree, PipelineMetrics, RenderedDocument, UploadedArchive};
pub use pipeline::render::{RenderEngine, WkHtmlToPdf};
pub use server::{router, serve};
