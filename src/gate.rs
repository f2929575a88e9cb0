//! Decides whether a response is worth compressing.

use crate::codec::Codec;
use http::header::{self, HeaderMap};

/// Default minimum body size for compression, in bytes.
pub const DEFAULT_THRESHOLD: usize = 1024;

/// Classifies MIME types by whether compressing them pays off.
pub trait MimeClassifier: Send + Sync + 'static {
    /// Returns true if bodies of `content_type` should be compressed.
    ///
    /// `content_type` is the raw header value and may carry parameters.
    fn is_compressible(&self, content_type: &str) -> bool;
}

impl<F> MimeClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    fn is_compressible(&self, content_type: &str) -> bool {
        self(content_type)
    }
}

/// The built-in classifier, backed by [`is_compressible`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl MimeClassifier for DefaultClassifier {
    fn is_compressible(&self, content_type: &str) -> bool {
        is_compressible(content_type)
    }
}

const COMPRESSIBLE: &[&str] = &[
    "application/atom+xml",
    "application/ecmascript",
    "application/graphql",
    "application/javascript",
    "application/json",
    "application/manifest+json",
    "application/rtf",
    "application/wasm",
    "application/x-javascript",
    "application/x-www-form-urlencoded",
    "application/xhtml+xml",
    "application/xml",
    "application/vnd.ms-fontobject",
    "font/otf",
    "font/ttf",
    "image/bmp",
    "image/svg+xml",
    "image/vnd.microsoft.icon",
    "image/x-icon",
];

const INCOMPRESSIBLE: &[&str] = &[
    "application/gzip",
    "application/octet-stream",
    "application/pdf",
    "application/vnd.rar",
    "application/x-7z-compressed",
    "application/x-bzip2",
    "application/x-gzip",
    "application/x-rar-compressed",
    "application/x-xz",
    "application/zip",
    "application/zstd",
    "font/woff",
    "font/woff2",
];

/// Classifies a `Content-Type` value.
///
/// Parameters and case are ignored. Text-like types are compressible, media
/// and archive formats are not, and anything unrecognized is compressible.
pub fn is_compressible(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if mime.starts_with("text/") || COMPRESSIBLE.contains(&mime.as_str()) {
        return true;
    }
    if INCOMPRESSIBLE.contains(&mime.as_str()) {
        return false;
    }

    // gRPC frames carry their own compression, grpc-web does not
    if mime.starts_with("application/grpc") {
        return mime.starts_with("application/grpc-web");
    }

    if mime.ends_with("+json") || mime.ends_with("+xml") || mime.ends_with("+text") {
        return true;
    }

    let top_level = mime.split('/').next().unwrap_or("");
    !matches!(top_level, "image" | "audio" | "video")
}

/// Decides whether a response with `content_type` should be compressed with
/// the negotiated codec (`None` meaning identity).
pub fn should_compress(
    content_type: Option<&str>,
    codec: Option<Codec>,
    classifier: &dyn MimeClassifier,
) -> bool {
    if codec.is_none() {
        return false;
    }
    match content_type {
        None => true,
        Some(content_type) => classifier.is_compressible(content_type),
    }
}

/// Returns true if a body of `len` bytes is large enough to compress.
pub fn meets_threshold(len: u64, threshold: usize) -> bool {
    len >= threshold as u64
}

/// The outcome of negotiation and gating for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Send the body unchanged.
    Skip,
    /// Compress the body with the given codec.
    Compress(Codec),
}

/// Decides whether a response gets compressed.
///
/// `codec` is the negotiated codec (`None` for identity) and `body_len` the
/// body's length when known. Responses that are already encoded or that
/// carry a byte range are left alone. When `body_len` is unknown the
/// `Content-Length` header is consulted; a body of unknown size is never
/// held back by the threshold.
pub fn decide(
    headers: &HeaderMap,
    body_len: Option<u64>,
    codec: Option<Codec>,
    threshold: usize,
    classifier: &dyn MimeClassifier,
) -> Decision {
    let Some(codec) = codec else {
        return Decision::Skip;
    };

    if headers.contains_key(header::CONTENT_ENCODING)
        || headers.contains_key(header::CONTENT_RANGE)
    {
        return Decision::Skip;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap_or_default());
    if !should_compress(content_type, Some(codec), classifier) {
        return Decision::Skip;
    }

    let len = body_len.or_else(|| content_length(headers));
    if len.is_some_and(|len| !meets_threshold(len, threshold)) {
        return Decision::Skip;
    }

    Decision::Compress(codec)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
