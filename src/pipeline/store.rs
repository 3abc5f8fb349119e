//! Storage of the original upload.
//!
//! The archive is streamed to disk chunk by chunk; the request body is never
//! held in memory as a whole. The sniffed head is written first, followed by
//! the remainder of the stream, so the stored file is byte-for-byte what the
//! client sent.
//!
//! The destination name is chosen by the server (`<job-id>.zip`). The
//! client-declared file name is never joined onto a path.

use crate::error::Zip2PdfError;
use futures::{Stream, StreamExt};
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Write `head` followed by every chunk of `rest` to `dest`.
///
/// Returns the number of bytes written. If the total crosses `limit`, or any
/// write fails, the partial file is removed before the error is returned.
pub async fn store_upload<S, B>(
    head: &[u8],
    rest: &mut S,
    dest: &Path,
    limit: u64,
) -> Result<u64, Zip2PdfError>
where
    S: Stream<Item = Result<B, Zip2PdfError>> + Unpin,
    B: AsRef<[u8]>,
{
    let file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| storage_failed(dest, e))?;

    match copy_into(file, head, rest, dest, limit).await {
        Ok(written) => {
            debug!("Stored {} bytes at {}", written, dest.display());
            Ok(written)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                warn!("Could not remove partial upload {}: {}", dest.display(), rm);
            }
            Err(e)
        }
    }
}

async fn copy_into<S, B>(
    file: tokio::fs::File,
    head: &[u8],
    rest: &mut S,
    dest: &Path,
    limit: u64,
) -> Result<u64, Zip2PdfError>
where
    S: Stream<Item = Result<B, Zip2PdfError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut writer = BufWriter::new(file);
    let mut written: u64 = 0;

    write_chunk(&mut writer, head, &mut written, dest, limit).await?;
    while let Some(chunk) = rest.next().await {
        let chunk = chunk?;
        write_chunk(&mut writer, chunk.as_ref(), &mut written, dest, limit).await?;
    }

    writer.flush().await.map_err(|e| storage_failed(dest, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| storage_failed(dest, e))?;
    Ok(written)
}

async fn write_chunk(
    writer: &mut BufWriter<tokio::fs::File>,
    chunk: &[u8],
    written: &mut u64,
    dest: &Path,
    limit: u64,
) -> Result<(), Zip2PdfError> {
    *written += chunk.len() as u64;
    if *written > limit {
        return Err(Zip2PdfError::PayloadTooLarge { limit });
    }
    writer
        .write_all(chunk)
        .await
        .map_err(|e| storage_failed(dest, e))
}

fn storage_failed(path: &Path, source: std::io::Error) -> Zip2PdfError {
    Zip2PdfError::StorageFailed {
        path: path.to_path_buf(),
        source,
    }
}
