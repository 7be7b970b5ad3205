//! Resource stages: path mapping and file loading.

use std::io;
use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use percent_encoding::percent_decode_str;

use crate::chain::context::{keys, ChainContext};
use crate::chain::service::{Service, ServiceId, ServiceResult};
use crate::http::response::Response;

/// A file read for the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedResource {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Content type by file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Decode `%XX` escapes. `None` for malformed escapes or non-UTF-8 results.
fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let well_formed = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return None;
    }
    percent_decode_str(input).decode_utf8().ok().map(|s| s.into_owned())
}

/// Maps the request path onto the document root.
pub struct MapResourcePath;

impl Service for MapResourcePath {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let Some(decoded) = percent_decode(ctx.request().path()) else {
            return ServiceResult::Abort(Response::status_page(StatusCode::BAD_REQUEST));
        };

        let domain = ctx.domain();
        let mut path = domain.document_root.clone();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return ServiceResult::Abort(Response::status_page(StatusCode::FORBIDDEN)),
                s if s.contains(['\\', '\0']) => {
                    return ServiceResult::Abort(Response::status_page(StatusCode::FORBIDDEN))
                }
                s => path.push(s),
            }
        }

        if decoded.ends_with('/') || path.is_dir() {
            path.push(&domain.index_file);
        }

        ctx.insert::<keys::ResourcePath>(path);
        ServiceResult::Next
    }
}

/// Reads the mapped file.
pub struct LoadResource;

impl Service for LoadResource {
    fn execute(&self, ctx: &mut ChainContext) -> ServiceResult {
        let Some(path) = ctx.get::<keys::ResourcePath>().cloned() else {
            return ServiceResult::error(&ServiceId::LOAD_RESOURCE, "no resource path in context");
        };

        match std::fs::read(&path) {
            Ok(body) => {
                ctx.insert::<keys::Resource>(LoadedResource {
                    content_type: content_type_for(&path),
                    path,
                    body,
                });
                ServiceResult::Next
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound || !path.exists() => {
                tracing::debug!(path = %path.display(), "Resource not found");
                ServiceResult::Abort(Response::status_page(StatusCode::NOT_FOUND))
            }
            Err(e) => ServiceResult::error(
                &ServiceId::LOAD_RESOURCE,
                format!("reading {}: {}", path.display(), e),
            ),
        }
    }
}
