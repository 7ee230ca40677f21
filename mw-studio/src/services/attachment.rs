//! Attachment encoding
//!
//! Turns an uploaded lesson document into a [`FileAttachment`] carrying a
//! standard (padded) base64 payload.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use mw_common::{Error, FileAttachment, Result};

/// MIME type used when nothing better can be determined
pub const DEFAULT_MIME_TYPE: &str = "application/pdf";

/// Encode raw bytes as an attachment.
///
/// MIME type resolution: declared type → content sniffing → extension → PDF.
pub fn encode_bytes(name: &str, declared_mime: Option<&str>, bytes: &[u8]) -> FileAttachment {
    FileAttachment {
        name: name.to_string(),
        mime_type: resolve_mime_type(name, declared_mime, bytes),
        base64: STANDARD.encode(bytes),
    }
}

/// Reject uploads larger than `max_bytes`
pub fn check_size(len: usize, max_bytes: usize) -> Result<()> {
    if len > max_bytes {
        return Err(Error::TooLarge {
            size: len,
            limit: max_bytes,
        });
    }
    Ok(())
}

pub fn resolve_mime_type(name: &str, declared_mime: Option<&str>, bytes: &[u8]) -> String {
    // Generic types carry no information; fall through to sniffing
    if let Some(declared) = declared_mime
        .map(str::trim)
        .filter(|m| !m.is_empty() && *m != "application/octet-stream")
    {
        return declared.to_string();
    }

    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }

    mime_from_extension(name)
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "txt" | "md" => Some("text/plain"),
        _ => None,
    }
}
