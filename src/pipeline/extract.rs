//! Archive extraction: materialise the regular files of a stored zip.
//!
//! ## Rules
//!
//! * Directory entries are skipped; parent directories of file entries are
//!   created on demand instead.
//! * Symlink entries are skipped with a warning.
//! * Every destination must stay under the extraction root. An entry whose
//!   name is absolute or climbs out with `..` aborts extraction with
//!   [`JobError::UnsafeEntryPath`].
//! * The first failing entry aborts the run. Files written before it stay on
//!   disk; there is no rollback.
//!
//! Decompression is CPU-bound blocking I/O, so it runs in `spawn_blocking`.

use crate::error::JobError;
use crate::output::ExtractedTree;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Extract `archive` into `dest`, creating `dest` if needed.
pub async fn extract_archive(archive: &Path, dest: &Path) -> Result<ExtractedTree, JobError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &dest))
        .await
        .map_err(|e| JobError::Internal {
            detail: format!("Extraction task panicked: {}", e),
        })?
}

/// Blocking implementation of [`extract_archive`].
pub fn extract_archive_blocking(archive_path: &Path, dest: &Path) -> Result<ExtractedTree, JobError> {
    let invalid = |detail: String| JobError::InvalidArchive {
        path: archive_path.to_path_buf(),
        detail,
    };

    let file = File::open(archive_path).map_err(|e| invalid(e.to_string()))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| invalid(e.to_string()))?;
    info!(
        "Extracting {} entries from {} into {}",
        archive.len(),
        archive_path.display(),
        dest.display()
    );

    std::fs::create_dir_all(dest).map_err(|e| JobError::ExtractionFailed {
        entry: dest.display().to_string(),
        detail: e.to_string(),
    })?;

    let mut tree = ExtractedTree {
        root: dest.to_path_buf(),
        ..ExtractedTree::default()
    };

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| JobError::ExtractionFailed {
                entry: format!("#{}", index),
                detail: e.to_string(),
            })?;
        let name = entry.name().to_string();
        let mode = entry.unix_mode().map(|m| m & S_IFMT);

        if entry.is_dir() || mode == Some(S_IFDIR) {
            tree.skipped_dirs += 1;
            continue;
        }
        if mode == Some(S_IFLNK) {
            warn!("Skipping symlink entry '{}'", name);
            tree.skipped_links += 1;
            continue;
        }

        let relative = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| JobError::UnsafeEntryPath {
                entry: name.clone(),
            })?;
        let target = dest.join(&relative);

        let failed = |detail: String| JobError::ExtractionFailed {
            entry: name.clone(),
            detail,
        };

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
        }
        let mut out = File::create(&target).map_err(|e| failed(e.to_string()))?;
        let copied = std::io::copy(&mut entry, &mut out).map_err(|e| failed(e.to_string()))?;

        debug!("Extracted {} ({} bytes)", relative.display(), copied);
        tree.total_bytes += copied;
        tree.files.push(relative);
    }

    info!(
        "Extracted {} files ({} bytes), skipped {} directories and {} links",
        tree.files.len(),
        tree.total_bytes,
        tree.skipped_dirs,
        tree.skipped_links
    );
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    enum Item<'a> {
        File(&'a str, &'a [u8]),
        Dir(&'a str),
        Link(&'a str, &'a str),
    }

    fn build_zip(dir: &Path, items: &[Item<'_>]) -> PathBuf {
        let mut w = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        for item in items {
            match item {
                Item::File(name, body) => {
                    w.start_file(*name, opts).unwrap();
                    w.write_all(body).unwrap();
                }
                Item::Dir(name) => w.add_directory(*name, opts).unwrap(),
                Item::Link(name, target) => w.add_symlink(*name, *target, opts).unwrap(),
            }
        }
        let bytes = w.finish().unwrap().into_inner();
        let path = dir.join("site.zip");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn extracts_regular_files_and_skips_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_zip(
            tmp.path(),
            &[
                Item::Dir("assets/"),
                Item::File("index.html", b"<html><body>hi</body></html>"),
                Item::File("assets/style.css", b"body{}"),
            ],
        );
        let dest = tmp.path().join("out");

        let tree = extract_archive_blocking(&archive, &dest).unwrap();

        assert_eq!(tree.files.len(), 2);
        assert!(tree.contains("index.html"));
        assert!(tree.contains("assets/style.css"));
        assert_eq!(tree.skipped_dirs, 1);
        assert_eq!(tree.total_bytes, 28 + 6);
        assert_eq!(
            std::fs::read(dest.join("assets/style.css")).unwrap(),
            b"body{}"
        );
    }

    #[test]
    fn nested_file_without_directory_entry_gets_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_zip(tmp.path(), &[Item::File("a/b/c.txt", b"deep")]);
        let dest = tmp.path().join("out");

        extract_archive_blocking(&archive, &dest).unwrap();
        assert_eq!(std::fs::read(dest.join("a/b/c.txt")).unwrap(), b"deep");
    }

    #[test]
    fn traversal_entry_aborts_and_keeps_earlier_files() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_zip(
            tmp.path(),
            &[
                Item::File("first.txt", b"1"),
                Item::File("../escaped.txt", b"evil"),
                Item::File("never.txt", b"3"),
            ],
        );
        let dest = tmp.path().join("out");

        let err = extract_archive_blocking(&archive, &dest).unwrap_err();

        assert_eq!(
            err,
            JobError::UnsafeEntryPath {
                entry: "../escaped.txt".into()
            }
        );
        assert!(dest.join("first.txt").exists());
        assert!(!tmp.path().join("escaped.txt").exists());
        assert!(!dest.join("never.txt").exists());
    }

    #[test]
    fn absolute_entry_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_zip(tmp.path(), &[Item::File("/etc/evil.conf", b"x")]);
        let err = extract_archive_blocking(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, JobError::UnsafeEntryPath { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_zip(
            tmp.path(),
            &[
                Item::Link("passwd", "/etc/passwd"),
                Item::File("index.html", b"<html></html>"),
            ],
        );
        let dest = tmp.path().join("out");

        let tree = extract_archive_blocking(&archive, &dest).unwrap();
        assert_eq!(tree.skipped_links, 1);
        assert_eq!(tree.files, vec![PathBuf::from("index.html")]);
        assert!(!dest.join("passwd").exists());
    }

    #[test]
    fn garbage_is_invalid_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.zip");
        std::fs::write(&path, b"PK\x03\x04 but not really a zip").unwrap();

        let err = extract_archive_blocking(&path, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, JobError::InvalidArchive { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn async_wrapper_runs_on_blocking_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_zip(tmp.path(), &[Item::File("index.html", b"<p>x</p>")]);
        let tree = extract_archive(&archive, &tmp.path().join("out")).await.unwrap();
        assert!(tree.contains("index.html"));
    }
}
