//! Upload validation: size ceiling and content sniffing.
//!
//! The client's file name and `Content-Type` are never consulted. The first
//! [`SNIFF_LEN`] bytes decide what the upload is, the same way a browser
//! sniffs an untrusted response body. Bytes read while sniffing are returned
//! to the caller so they can be written out ahead of the rest of the stream;
//! nothing is lost or reordered.

use crate::error::Zip2PdfError;
use futures::{Stream, StreamExt};
use tracing::debug;

/// Number of leading bytes inspected by [`sniff_content_type`].
pub const SNIFF_LEN: usize = 512;

/// The only MIME type accepted for uploads.
pub const ZIP_MIME: &str = "application/zip";

/// Magic-byte signatures, checked in order against the sniffed prefix.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", ZIP_MIME),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"Rar!\x1a\x07", "application/x-rar-compressed"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
];

/// Leading tags that mark an HTML document (matched case-insensitively
/// after leading whitespace).
const HTML_TAGS: &[&[u8]] = &[b"<!doctype html", b"<html", b"<head", b"<body", b"<!--"];

/// Classify a byte prefix by magic bytes. Only the first [`SNIFF_LEN`]
/// bytes are considered.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(SNIFF_LEN)];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| head.starts_with(sig)) {
        return *mime;
    }

    let trimmed = trim_leading_whitespace(head);
    if HTML_TAGS.iter().any(|tag| starts_with_ignore_case(trimmed, tag)) {
        return "text/html; charset=utf-8";
    }

    if head.is_empty() || head.iter().any(|&b| is_binary_byte(b)) {
        "application/octet-stream"
    } else {
        "text/plain; charset=utf-8"
    }
}

/// Reject anything that does not sniff as a zip archive.
pub fn ensure_zip(head: &[u8]) -> Result<(), Zip2PdfError> {
    let detected = sniff_content_type(head);
    if detected != ZIP_MIME {
        return Err(Zip2PdfError::NotAZip {
            detected: detected.to_string(),
        });
    }
    Ok(())
}

/// Pull chunks from `stream` until at least [`SNIFF_LEN`] bytes are buffered
/// or the stream ends.
///
/// Every byte read is in the returned buffer (it may hold more than
/// `SNIFF_LEN` if a chunk straddles the boundary), so writing the buffer and
/// then draining the stream reproduces the upload exactly.
pub async fn read_head<S, B>(stream: &mut S) -> Result<Vec<u8>, Zip2PdfError>
where
    S: Stream<Item = Result<B, Zip2PdfError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut head = Vec::with_capacity(SNIFF_LEN);
    while head.len() < SNIFF_LEN {
        match stream.next().await {
            Some(chunk) => head.extend_from_slice(chunk?.as_ref()),
            None => break,
        }
    }
    debug!("Sniff buffer holds {} bytes", head.len());
    Ok(head)
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
