//! HTML rendering: drive the external engine and persist the PDF.
//!
//! The engine is an external process and is only ever waited on from the
//! blocking pool.
//!
//! PDFs are written to a temp file in the output directory and renamed into
//! place, so a document under its final name is always complete.

use crate::config::{OutputNaming, ServiceConfig};
use crate::error::{JobError, Zip2PdfError};
use crate::metrics::MetricsSampler;
use crate::output::RenderedDocument;
use chrono::{DateTime, Local};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often a running engine is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Something that can turn an HTML file into PDF bytes.
///
/// Implementations are called from `spawn_blocking` and may block freely.
/// The HTML path points into the job's extraction root, so relative links to
/// stylesheets and images resolve against the extracted tree.
pub trait RenderEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Render `html` and return the complete PDF document.
    fn render(&self, html: &Path) -> Result<Vec<u8>, JobError>;
}

/// [`RenderEngine`] backed by the `wkhtmltopdf` executable.
#[derive(Debug, Clone)]
pub struct WkHtmlToPdf {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl WkHtmlToPdf {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Use the configured engine path, or search `PATH` and the usual install
    /// directories.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, Zip2PdfError> {
        let binary = match &config.engine_path {
            Some(path) => path.clone(),
            None => wkhtmltopdf_locate::locate_engine()
                .map_err(|e| Zip2PdfError::EngineUnavailable(e.to_string()))?,
        };
        let mut engine = Self::new(binary);
        if let Some(secs) = config.render_timeout_secs {
            engine = engine.with_timeout(Duration::from_secs(secs));
        }
        Ok(engine)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Version string reported by the executable.
    pub fn version(&self) -> Result<String, Zip2PdfError> {
        wkhtmltopdf_locate::engine_version(&self.binary)
            .map_err(|e| Zip2PdfError::EngineUnavailable(e.to_string()))
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, JobError> {
        let waited = |e: std::io::Error| JobError::RenderFailure {
            detail: format!("waiting for {}: {}", self.binary.display(), e),
        };

        let Some(limit) = self.timeout else {
            return child.wait().map_err(waited);
        };

        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait().map_err(waited)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("Engine exceeded {}s, killing pid {}", limit.as_secs(), child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(JobError::RenderTimeout {
                    secs: limit.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl RenderEngine for WkHtmlToPdf {
    fn name(&self) -> &str {
        "wkhtmltopdf"
    }

    fn render(&self, html: &Path) -> Result<Vec<u8>, JobError> {
        let internal = |e: std::io::Error| JobError::Internal {
            detail: format!("engine scratch space: {}", e),
        };

        let scratch = tempfile::tempdir().map_err(internal)?;
        let out_path = scratch.path().join("out.pdf");
        let mut stderr_log = tempfile::tempfile().map_err(internal)?;

        let mut child = Command::new(&self.binary)
            .arg("--quiet")
            .arg("--enable-local-file-access")
            .arg(html)
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_log.try_clone().map_err(internal)?))
            .spawn()
            .map_err(|e| JobError::RenderFailure {
                detail: format!("failed to start {}: {}", self.binary.display(), e),
            })?;

        let status = self.wait(&mut child)?;
        let pdf = std::fs::read(&out_path).unwrap_or_default();

        if !status.success() {
            let mut stderr = String::new();
            let _ = stderr_log.seek(SeekFrom::Start(0));
            let _ = stderr_log.read_to_string(&mut stderr);
            let stderr = stderr.trim();

            // wkhtmltopdf exits non-zero when a linked asset fails to load but
            // still writes the document.
            if pdf.is_empty() {
                return Err(JobError::RenderFailure {
                    detail: format!("{} exited with {}: {}", self.name(), status, stderr),
                });
            }
            warn!("{} exited with {} but produced a PDF: {}", self.name(), status, stderr);
        }

        if pdf.is_empty() {
            return Err(JobError::RenderFailure {
                detail: format!("{} produced an empty document", self.name()),
            });
        }
        Ok(pdf)
    }
}

/// File name for a PDF completed at `completed_at`.
///
/// With [`OutputNaming::Timestamp`] two renders finishing in the same second
/// get the same name.
pub fn output_file_name(naming: OutputNaming, completed_at: DateTime<Local>, job_id: Uuid) -> String {
    let stamp = completed_at.format("%Y%m%d%H%M%S");
    match naming {
        OutputNaming::Timestamp => format!("{}.pdf", stamp),
        OutputNaming::TimestampJob => format!("{}-{}.pdf", stamp, job_id),
    }
}

/// Write `pdf` to `dir/file_name` through a temp file and rename.
///
/// An existing file with the same name is replaced.
pub async fn persist_pdf(dir: &Path, file_name: &str, pdf: Vec<u8>) -> Result<PathBuf, JobError> {
    let dir = dir.to_path_buf();
    let dest = dir.join(file_name);
    let target = dest.clone();

    tokio::task::spawn_blocking(move || -> Result<(), JobError> {
        let failed = |detail: String| JobError::OutputWriteFailed {
            path: target.clone(),
            detail,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| failed(e.to_string()))?;
        tmp.write_all(&pdf).map_err(|e| failed(e.to_string()))?;
        tmp.as_file().sync_all().map_err(|e| failed(e.to_string()))?;
        tmp.persist(&target).map_err(|e| failed(e.error.to_string()))?;
        Ok(())
    })
    .await
    .map_err(|e| JobError::Internal {
        detail: format!("PDF write task panicked: {}", e),
    })??;

    Ok(dest)
}

/// Render `root/<entry_file>` with `engine` and persist the result.
pub async fn render_document(
    root: &Path,
    job_id: Uuid,
    config: &ServiceConfig,
    engine: Arc<dyn RenderEngine>,
) -> Result<RenderedDocument, JobError> {
    let html = root.join(&config.entry_file);
    let is_file = tokio::fs::metadata(&html)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(JobError::EntryNotFound { path: html });
    }

    let sampler = MetricsSampler::start();
    debug!("Rendering {} with {}", html.display(), engine.name());

    let pdf = tokio::task::spawn_blocking(move || engine.render(&html))
        .await
        .map_err(|e| JobError::Internal {
            detail: format!("Render task panicked: {}", e),
        })??;

    let completed_at = Local::now();
    let file_name = output_file_name(config.output_naming, completed_at, job_id);
    let size_bytes = pdf.len() as u64;
    let path = persist_pdf(&config.pdf_dir, &file_name, pdf).await?;
    let metrics = sampler.finish();

    info!(
        "Converted file: {}. Time taken: {}ms. Memory used: {} bytes",
        file_name, metrics.elapsed_ms, metrics.heap_delta_bytes
    );

    Ok(RenderedDocument {
        file_name,
        path,
        size_bytes,
        completed_at,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct EchoEngine;

    impl RenderEngine for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }

        fn render(&self, html: &Path) -> Result<Vec<u8>, JobError> {
            let mut pdf = b"%PDF-1.4\n".to_vec();
            pdf.extend(std::fs::read(html).map_err(|e| JobError::RenderFailure {
                detail: e.to_string(),
            })?);
            Ok(pdf)
        }
    }

    struct BrokenEngine;

    impl RenderEngine for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }

        fn render(&self, _html: &Path) -> Result<Vec<u8>, JobError> {
            Err(JobError::RenderFailure {
                detail: "engine crashed".into(),
            })
        }
    }

    fn config_in(root: &Path, naming: OutputNaming) -> ServiceConfig {
        let config = ServiceConfig::builder()
            .base_dir(root)
            .output_naming(naming)
            .build()
            .unwrap();
        std::fs::create_dir_all(&config.pdf_dir).unwrap();
        config
    }

    #[test]
    fn timestamp_name_has_fourteen_digits() {
        let at = Local.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap();
        let id = Uuid::nil();
        assert_eq!(
            output_file_name(OutputNaming::Timestamp, at, id),
            "20240131235958.pdf"
        );
        assert_eq!(
            output_file_name(OutputNaming::TimestampJob, at, id),
            "20240131235958-00000000-0000-0000-0000-000000000000.pdf"
        );
    }

    #[tokio::test]
    async fn same_second_timestamp_names_collide_and_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let first = output_file_name(OutputNaming::Timestamp, at, Uuid::new_v4());
        let second = output_file_name(OutputNaming::Timestamp, at, Uuid::new_v4());
        assert_eq!(first, second);

        persist_pdf(tmp.path(), &first, b"%PDF first".to_vec()).await.unwrap();
        let path = persist_pdf(tmp.path(), &second, b"%PDF second".to_vec())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF second");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn job_naming_never_collides_within_a_second() {
        let at = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let a = output_file_name(OutputNaming::TimestampJob, at, Uuid::new_v4());
        let b = output_file_name(OutputNaming::TimestampJob, at, Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn renders_index_html_into_pdf_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path(), OutputNaming::TimestampJob);
        let root = tmp.path().join("site");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("index.html"), "<h1>Hello</h1>").unwrap();

        let doc = render_document(&root, Uuid::new_v4(), &config, Arc::new(EchoEngine))
            .await
            .unwrap();

        assert!(doc.size_bytes > 0);
        assert_eq!(doc.path, config.pdf_dir.join(&doc.file_name));
        let bytes = std::fs::read(&doc.path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(String::from_utf8_lossy(&bytes).contains("Hello"));
    }

    #[tokio::test]
    async fn missing_entry_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path(), OutputNaming::TimestampJob);
        let root = tmp.path().join("site");
        std::fs::create_dir_all(&root).unwrap();

        let err = render_document(&root, Uuid::new_v4(), &config, Arc::new(EchoEngine))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::EntryNotFound { .. }));
        assert_eq!(std::fs::read_dir(&config.pdf_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn engine_failure_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path(), OutputNaming::TimestampJob);
        let root = tmp.path().join("site");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("index.html"), "<p>x</p>").unwrap();

        let err = render_document(&root, Uuid::new_v4(), &config, Arc::new(BrokenEngine))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            JobError::RenderFailure {
                detail: "engine crashed".into()
            }
        );
        assert_eq!(std::fs::read_dir(&config.pdf_dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    mod wkhtmltopdf_process {
        use super::*;

        fn script(dir: &Path, body: &str) -> PathBuf {
            use std::os::unix::fs::PermissionsExt;
            let path = dir.join("fake-wkhtmltopdf");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn page(dir: &Path) -> PathBuf {
            let html = dir.join("index.html");
            std::fs::write(&html, "<p>page</p>").unwrap();
            html
        }

        #[test]
        fn passes_html_and_output_paths() {
            let tmp = tempfile::tempdir().unwrap();
            let bin = script(tmp.path(), r#"printf '%%PDF-1.4\n' > "$4"; cat "$3" >> "$4""#);

            let pdf = WkHtmlToPdf::new(bin).render(&page(tmp.path())).unwrap();

            assert!(pdf.starts_with(b"%PDF-1.4"));
            assert!(String::from_utf8_lossy(&pdf).contains("<p>page</p>"));
        }

        #[test]
        fn non_zero_exit_without_output_is_failure() {
            let tmp = tempfile::tempdir().unwrap();
            let bin = script(tmp.path(), "echo 'cannot load page' >&2; exit 2");

            let err = WkHtmlToPdf::new(bin).render(&page(tmp.path())).unwrap_err();

            match err {
                JobError::RenderFailure { detail } => {
                    assert!(detail.contains("cannot load page"), "got: {detail}")
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn non_zero_exit_with_output_is_accepted() {
            let tmp = tempfile::tempdir().unwrap();
            let bin = script(tmp.path(), r#"printf '%%PDF-1.4\n' > "$4"; exit 1"#);

            let pdf = WkHtmlToPdf::new(bin).render(&page(tmp.path())).unwrap();
            assert!(pdf.starts_with(b"%PDF"));
        }

        #[test]
        fn hung_engine_is_killed_after_timeout() {
            let tmp = tempfile::tempdir().unwrap();
            let bin = script(tmp.path(), "sleep 30");

            let started = Instant::now();
            let err = WkHtmlToPdf::new(bin)
                .with_timeout(Duration::from_secs(1))
                .render(&page(tmp.path()))
                .unwrap_err();

            assert_eq!(err, JobError::RenderTimeout { secs: 1 });
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn missing_binary_is_failure() {
            let tmp = tempfile::tempdir().unwrap();
            let err = WkHtmlToPdf::new(tmp.path().join("absent"))
                .render(&page(tmp.path()))
                .unwrap_err();
            assert!(matches!(err, JobError::RenderFailure { .. }));
        }
    }
}
