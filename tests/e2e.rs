//! End-to-end tests against a real wkhtmltopdf install.
//!
//! Gated behind the `E2E_ENABLED` environment variable so they do not run in
//! CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;
use zip2pdf::{convert_archive, JobError, ServiceConfig, WkHtmlToPdf, Zip2PdfError};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and an engine can be found.
macro_rules! e2e_engine_or_skip {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match wkhtmltopdf_locate::locate_engine() {
            Ok(path) => WkHtmlToPdf::new(path).with_timeout(Duration::from_secs(120)),
            Err(e) => {
                println!("SKIP: {e}");
                return;
            }
        }
    }};
}

fn write_zip(dir: &Path, files: &[(&str, &[u8])]) -> std::path::PathBuf {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in files {
        w.start_file(*name, SimpleFileOptions::default()).unwrap();
        w.write_all(body).unwrap();
    }
    let path = dir.join("site.zip");
    std::fs::write(&path, w.finish().unwrap().into_inner()).unwrap();
    path
}

fn config_in(dir: &Path) -> ServiceConfig {
    ServiceConfig::builder().base_dir(dir).build().unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn test_engine_reports_version() {
    let engine = e2e_engine_or_skip!();
    let version = engine.version().unwrap();
    println!("{} → {}", engine.binary().display(), version);
    assert!(version.to_lowercase().contains("wkhtmltopdf"));
}

#[tokio::test]
async fn test_renders_site_with_relative_stylesheet() {
    let engine = e2e_engine_or_skip!();
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(
        tmp.path(),
        &[
            (
                "index.html",
                b"<!doctype html><html><head><link rel=\"stylesheet\" href=\"css/site.css\"></head>\
                  <body><h1>Quarterly report</h1><p>Rendered end to end.</p></body></html>",
            ),
            ("css/site.css", b"h1 { font-family: sans-serif; color: #336; }"),
        ],
    );
    let config = config_in(tmp.path());

    let doc = convert_archive(&archive, &config, Arc::new(engine)).await.unwrap();

    let bytes = std::fs::read(&doc.path).unwrap();
    assert!(bytes.starts_with(b"%PDF"), "output is not a PDF");
    assert_eq!(bytes.len() as u64, doc.size_bytes);
    println!("{} ({} bytes, {}ms)", doc.file_name, doc.size_bytes, doc.metrics.elapsed_ms);
}

#[tokio::test]
async fn test_missing_index_is_reported() {
    let engine = e2e_engine_or_skip!();
    let tmp = tempfile::tempdir().unwrap();
    let archive = write_zip(tmp.path(), &[("readme.txt", b"no html here")]);
    let config = config_in(tmp.path());

    let err = convert_archive(&archive, &config, Arc::new(engine))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Zip2PdfError::Job(JobError::EntryNotFound { .. })
    ));
}
