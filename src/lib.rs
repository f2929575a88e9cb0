//! HTTP response compression middleware for Tower.
//!
//! This crate provides a Tower layer that negotiates a content coding from
//! the client's `Accept-Encoding` header and streams the response body
//! through Gzip, Deflate or Brotli.
//!
//! # Example
//!
//! ```ignore
//! use http_compress_layer::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new().threshold(512))
//!     .service(my_service);
//! ```
//!
//! # Negotiation
//!
//! Codings are chosen by quality weight, with ties going to the server's
//! preference order (`gzip`, `deflate`, then `br`). A request without an
//! `Accept-Encoding` header is always answered uncompressed, and `*` stands
//! for the first supported coding the client did not name. `br` is offered
//! when the `brotli` feature is enabled or a compressor is supplied through
//! [`CompressionLayer::brotli`].
//!
//! # Compression Rules
//!
//! The middleware will **not** compress responses when:
//! - No supported coding is acceptable to the client
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - The [`MimeClassifier`] rejects the `Content-Type` (by default most
//!   images, audio, video and archives)
//! - The body is known to be smaller than the threshold (default: 1024 bytes)
//!
//! The middleware will **always flush** after each chunk when:
//! - `X-Accel-Buffering: no` header is present
//! - `Content-Type` is `text/event-stream`
//! - `Content-Type` starts with `application/grpc-web`
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`, unless it is `*`
//!
//! # Failures
//!
//! Errors while streaming are yielded by the body and logged with `tracing`
//! in the request's span. A body dropped before it finished is logged as
//! aborted. [`compress`] additionally hands back a [`Completion`] future for
//! callers that want to observe the outcome.

#![deny(missing_docs)]

mod body;
mod codec;
mod completion;
mod error;
mod future;
mod gate;
mod header;
mod layer;
mod negotiate;
mod payload;
mod service;

pub use body::{CompressionBody, compress};
pub use codec::{Codec, CompressStream, Compressors, Encoder};
pub use completion::Completion;
pub use error::{BoxError, Error};
pub use future::ResponseFuture;
pub use gate::{
    DEFAULT_THRESHOLD, Decision, DefaultClassifier, MimeClassifier, decide, is_compressible,
    meets_threshold, should_compress,
};
pub use header::{HeaderAccess, apply_headers, merge_vary};
pub use layer::CompressionLayer;
pub use negotiate::{EncodingToken, SupportedEncodings, negotiate, parse_accept_encoding};
pub use payload::Payload;
pub use service::CompressionService;
