//! Content-Type inference from object key extensions

/// Fallback for unknown or missing extensions
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for a lowercased extension
pub fn content_type_for_extension(extension: Option<&str>) -> &'static str {
    match extension {
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",

        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",

        Some("mp4") => "video/mp4",
        Some("pdf") => "application/pdf",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("eot") => "application/vnd.ms-fontobject",

        // Unity WebGL build output
        Some("wasm") => "application/wasm",
        Some("bundle" | "data") => DEFAULT_CONTENT_TYPE,

        _ => DEFAULT_CONTENT_TYPE,
    }
}
