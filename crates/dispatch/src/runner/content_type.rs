//! Extension to MIME type resolution for `Content-Type`.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const DEFAULT_MIME: &str = "application/octet-stream";

static MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("html", "text/html"),
        ("htm", "text/html"),
        ("txt", "text/plain"),
        ("text", "text/plain"),
        ("css", "text/css"),
        ("csv", "text/csv"),
        ("md", "text/markdown"),
        ("js", "application/javascript"),
        ("mjs", "application/javascript"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("atom", "application/atom+xml"),
        ("rss", "application/rss+xml"),
        ("xhtml", "application/xhtml+xml"),
        ("svg", "image/svg+xml"),
        ("png", "image/png"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("ico", "image/vnd.microsoft.icon"),
        ("pdf", "application/pdf"),
        ("zip", "application/zip"),
        ("gz", "application/gzip"),
        ("tar", "application/x-tar"),
        ("wasm", "application/wasm"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("mp3", "audio/mpeg"),
        ("ogg", "audio/ogg"),
        ("wav", "audio/wav"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
    ])
});

/// Looks up an extension, with or without its leading dot.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    MIME_TYPES.get(ext.as_str()).copied()
}

/// Resolves `ext_or_mime` and renders a `Content-Type` value.
///
/// A value containing `/` is used as given. `params` are appended as `;key=value`, and textual
/// types get `charset=<default_charset>` unless `params` already name a charset.
pub fn content_type_value(ext_or_mime: &str, params: &[(&str, &str)], default_charset: &str) -> String {
    let essence = if ext_or_mime.contains('/') {
        ext_or_mime.to_string()
    } else {
        mime_for_extension(ext_or_mime).unwrap_or(DEFAULT_MIME).to_string()
    };

    let mut value = essence.clone();
    for (key, param) in params {
        value.push_str(&format!(";{key}={param}"));
    }

    let has_charset = params.iter().any(|(key, _)| key.eq_ignore_ascii_case("charset")) || essence.contains("charset=");
    if !has_charset && !default_charset.is_empty() && is_textual(&essence) {
        value.push_str(&format!(";charset={default_charset}"));
    }
    value
}

fn is_textual(essence: &str) -> bool {
    let essence = essence.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("json")
        || essence.ends_with("javascript")
        || essence.ends_with("xml")
}

#[cfg(test)]
mod tests {
    use super::{content_type_value, mime_for_extension};

    #[test]
    fn test_lookup() {
        assert_eq!(mime_for_extension("png"), Some("image/png"));
        assert_eq!(mime_for_extension(".HTML"), Some("text/html"));
        assert_eq!(mime_for_extension("unknown"), None);
    }

    #[test]
    fn test_content_type_value() {
        assert_eq!(content_type_value("html", &[], "utf-8"), "text/html;charset=utf-8");
        assert_eq!(content_type_value("png", &[], "utf-8"), "image/png");
        assert_eq!(content_type_value("bin", &[], "utf-8"), "application/octet-stream");
        assert_eq!(content_type_value("json", &[("charset", "latin1")], "utf-8"), "application/json;charset=latin1");
        assert_eq!(content_type_value("text/x-custom", &[("q", "1")], "utf-8"), "text/x-custom;q=1;charset=utf-8");
        assert_eq!(content_type_value("atom", &[], "iso-8859-1"), "application/atom+xml;charset=iso-8859-1");
        assert_eq!(content_type_value("txt", &[], ""), "text/plain");
    }
}
