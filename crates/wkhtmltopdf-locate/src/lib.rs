//! # wkhtmltopdf-locate
//!
//! Find a [wkhtmltopdf](https://wkhtmltopdf.org/) executable on the local
//! machine so that callers can drive it as an external HTML-to-PDF engine
//! without hard-coding an install location.
//!
//! ## How it works
//!
//! On first call to [`locate_engine`]:
//!
//! 1. Walks every directory listed in `PATH`.
//! 2. Falls back to the platform's usual install directories
//!    (`/usr/local/bin`, `/opt/homebrew/bin`, `C:\Program Files\wkhtmltopdf\bin`, …).
//! 3. Returns the first regular, executable file named [`ENGINE_BINARY`].
//!
//! The hit is cached for the lifetime of the process; later calls never touch
//! the file system.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wkhtmltopdf_locate::{engine_version, locate_engine};
//!
//! let path = locate_engine().expect("wkhtmltopdf not installed");
//! let version = engine_version(&path).expect("engine did not answer --version");
//! println!("{} ({})", path.display(), version);
//! ```
//!
//! ## Platform support
//!
//! | OS      | Binary            | Extra search directories                         |
//! |---------|-------------------|--------------------------------------------------|
//! | Linux   | `wkhtmltopdf`     | `/usr/local/bin`, `/usr/bin`, `/opt/wkhtmltox/bin` |
//! | macOS   | `wkhtmltopdf`     | `/usr/local/bin`, `/opt/homebrew/bin`            |
//! | Windows | `wkhtmltopdf.exe` | `C:\Program Files\wkhtmltopdf\bin`               |

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// File name of the engine executable on this platform.
#[cfg(windows)]
pub const ENGINE_BINARY: &str = "wkhtmltopdf.exe";

/// File name of the engine executable on this platform.
#[cfg(not(windows))]
pub const ENGINE_BINARY: &str = "wkhtmltopdf";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by wkhtmltopdf-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// No executable named [`ENGINE_BINARY`] in any searched directory.
    #[error("{binary} not found (searched {} directories)", searched.len())]
    NotFound {
        binary: &'static str,
        searched: Vec<PathBuf>,
    },

    /// The executable exists but `--version` failed.
    #[error("Failed to probe engine at '{path}': {reason}")]
    Probe { path: PathBuf, reason: String },
}

// ── Internal: platform install directories ──────────────────────────────────

fn platform_dirs() -> Vec<PathBuf> {
    let dirs: &[&str] = match std::env::consts::OS {
        "linux" => &["/usr/local/bin", "/usr/bin", "/opt/wkhtmltox/bin"],
        "macos" => &["/usr/local/bin", "/opt/homebrew/bin"],
        "windows" => &[
            r"C:\Program Files\wkhtmltopdf\bin",
            r"C:\Program Files (x86)\wkhtmltopdf\bin",
        ],
        _ => &["/usr/local/bin", "/usr/bin"],
    };
    dirs.iter().map(PathBuf::from).collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Directories searched by [`locate_engine`], in order: `PATH` entries first,
/// then the platform install directories. Duplicates are removed.
pub fn search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();

    for dir in platform_dirs() {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Returns the first `dir/ENGINE_BINARY` that is an executable file.
pub fn locate_in<I>(dirs: I) -> Option<PathBuf>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    dirs.into_iter()
        .map(|d| d.as_ref().join(ENGINE_BINARY))
        .find(|candidate| is_executable(candidate))
}

/// Finds the engine executable, caching the result for the process lifetime.
///
/// # Thread safety
///
/// Safe to call from multiple threads; concurrent first calls may both
/// search, but they agree on the answer.
pub fn locate_engine() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let searched = search_dirs();
    let path = locate_in(&searched).ok_or(LocateError::NotFound {
        binary: ENGINE_BINARY,
        searched,
    })?;

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Runs `<path> --version` and returns its trimmed standard output.
pub fn engine_version(path: &Path) -> Result<String, LocateError> {
    let output = Command::new(path)
        .arg("--version")
        .output()
        .map_err(|e| LocateError::Probe {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(LocateError::Probe {
            path: path.to_path_buf(),
            reason: format!("exited with {}", output.status),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        return Err(LocateError::Probe {
            path: path.to_path_buf(),
            reason: "empty --version output".into(),
        });
    }
    Ok(version)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
