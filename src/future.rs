use crate::body::CompressionBody;
use crate::codec::Codec;
use crate::completion::CompletionSink;
use crate::gate::{Decision, decide};
use crate::header::apply_headers;
use crate::layer::Config;
use http::{Response, header};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::Span;

pin_project! {
    /// Response future of [`CompressionService`](crate::CompressionService).
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        accepted_codec: Option<Codec>,
        config: Arc<Config>,
        span: Span,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn new(
        inner: F,
        accepted_codec: Option<Codec>,
        config: Arc<Config>,
        span: Span,
    ) -> Self {
        Self {
            inner,
            accepted_codec,
            config,
            span,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response =
                    wrap_response(response, *this.accepted_codec, this.config, this.span);
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Applies the gate to a finished response and wraps its body.
///
/// All header changes happen here, before the body is handed to the caller.
fn wrap_response<B: Body>(
    response: Response<B>,
    accepted_codec: Option<Codec>,
    config: &Config,
    span: &Span,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    let decision = decide(
        &parts.headers,
        body.size_hint().exact(),
        accepted_codec,
        config.threshold,
        config.classifier.as_ref(),
    );

    let encoder = match decision {
        Decision::Compress(codec) => config.compressors.encoder(codec).map(|e| (codec, e)),
        Decision::Skip => None,
    };

    let Some((codec, encoder)) = encoder else {
        tracing::debug!(parent: span, "sending response uncompressed");
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    };

    // Proxies and event streams need every chunk delivered as it is produced
    let always_flush = parts
        .headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
        || is_streaming_content_type(&parts.headers);

    apply_headers(&mut parts.headers, codec);

    tracing::debug!(parent: span, %codec, always_flush, "compressing response");

    let sink = CompletionSink::new(span.clone(), codec);
    let body = CompressionBody::compressed(body, encoder, codec, always_flush, sink);
    Response::from_parts(parts, body)
}

/// Returns true for content types whose consumers read incrementally.
fn is_streaming_content_type(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::CompressState;
    use bytes::Bytes;
    use http_body_util::Full;

    const LARGE: &str = "a body that is comfortably larger than the test threshold";

    fn config(threshold: usize) -> Config {
        Config {
            threshold,
            ..Config::default()
        }
    }

    fn make_response(body: &'static str) -> Response<Full<Bytes>> {
        Response::new(Full::new(Bytes::from_static(body.as_bytes())))
    }

    fn make_response_with_headers<I>(body: &'static str, headers: I) -> Response<Full<Bytes>>
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let mut response = make_response(body);
        for (name, value) in headers {
            response
                .headers_mut()
                .insert(name, header::HeaderValue::from_static(value));
        }
        response
    }

    fn wrap(
        response: Response<Full<Bytes>>,
        codec: Option<Codec>,
    ) -> Response<CompressionBody<Full<Bytes>>> {
        wrap_response(response, codec, &config(0), &Span::none())
    }

    fn is_compressed<B>(response: &Response<CompressionBody<B>>) -> bool {
        matches!(response.body(), CompressionBody::Compressed { .. })
    }

    fn always_flush<B>(response: &Response<CompressionBody<B>>) -> bool {
        match response.body() {
            CompressionBody::Compressed { state, .. } => state.always_flush(),
            _ => panic!("Expected compressed body"),
        }
    }

    #[test]
    fn test_compress_when_accept_encoding_present() {
        let wrapped = wrap(make_response(LARGE), Some(Codec::Gzip));

        match wrapped.body() {
            CompressionBody::Compressed { state, .. } => {
                assert_eq!(state.state(), CompressState::Reading);
            }
            _ => panic!("Expected compressed body"),
        }
        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "gzip"
        );
        assert_eq!(wrapped.headers().get(header::VARY).unwrap(), "Accept-Encoding");
    }

    #[test]
    fn test_no_compress_when_identity() {
        let wrapped = wrap(make_response(LARGE), None);

        assert!(!is_compressed(&wrapped));
        assert!(wrapped.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(wrapped.headers().get(header::VARY).is_none());
    }

    #[test]
    fn test_no_compress_when_content_encoding_present() {
        let response = make_response_with_headers(LARGE, [("content-encoding", "identity")]);
        let wrapped = wrap(response, Some(Codec::Gzip));
        assert!(!is_compressed(&wrapped));
    }

    #[test]
    fn test_no_compress_range_response() {
        let response = make_response_with_headers(LARGE, [("content-range", "bytes 0-99/200")]);
        let wrapped = wrap(response, Some(Codec::Gzip));
        assert!(!is_compressed(&wrapped));
    }

    #[test]
    fn test_no_compress_image_png() {
        let response = make_response_with_headers(LARGE, [("content-type", "image/png")]);
        let wrapped = wrap(response, Some(Codec::Gzip));
        assert!(!is_compressed(&wrapped));
        assert!(wrapped.headers().get(header::VARY).is_none());
    }

    #[test]
    fn test_compress_image_svg_with_charset() {
        let response = make_response_with_headers(
            "<svg></svg>",
            [("content-type", "image/svg+xml; charset=utf-8")],
        );
        let wrapped = wrap(response, Some(Codec::Gzip));
        assert!(is_compressed(&wrapped));
    }

    #[test]
    fn test_threshold_uses_body_length() {
        let at = "x".repeat(64);
        let below = "x".repeat(63);
        let at = Response::new(Full::new(Bytes::from(at)));
        let below = Response::new(Full::new(Bytes::from(below)));

        let wrapped = wrap_response(at, Some(Codec::Gzip), &config(64), &Span::none());
        assert!(is_compressed(&wrapped));

        let wrapped = wrap_response(below, Some(Codec::Gzip), &config(64), &Span::none());
        assert!(!is_compressed(&wrapped));
    }

    #[test]
    fn test_content_length_and_accept_ranges_removed() {
        let response = make_response_with_headers(
            LARGE,
            [("content-length", "57"), ("accept-ranges", "bytes")],
        );
        let wrapped = wrap(response, Some(Codec::Deflate));

        assert!(wrapped.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(wrapped.headers().get(header::ACCEPT_RANGES).is_none());
    }

    #[test]
    fn test_accept_ranges_kept_when_not_compressing() {
        let response = make_response_with_headers(LARGE, [("accept-ranges", "bytes")]);
        let wrapped = wrap(response, None);

        assert_eq!(
            wrapped.headers().get(header::ACCEPT_RANGES).unwrap(),
            "bytes"
        );
    }

    #[test]
    fn test_always_flush_when_x_accel_buffering_no() {
        let response = make_response_with_headers(LARGE, [("x-accel-buffering", "NO")]);
        assert!(always_flush(&wrap(response, Some(Codec::Gzip))));
    }

    #[test]
    fn test_no_always_flush_by_default() {
        assert!(!always_flush(&wrap(make_response(LARGE), Some(Codec::Gzip))));
    }

    #[test]
    fn test_always_flush_text_event_stream() {
        let response = make_response_with_headers(
            "event: data\n\n",
            [("content-type", "text/event-stream; charset=utf-8")],
        );
        assert!(always_flush(&wrap(response, Some(Codec::Gzip))));
    }

    #[test]
    fn test_always_flush_grpc_web() {
        let response =
            make_response_with_headers(LARGE, [("content-type", "application/grpc-web+proto")]);
        assert!(always_flush(&wrap(response, Some(Codec::Gzip))));
    }

    #[test]
    #[cfg(feature = "brotli")]
    fn test_brotli_content_encoding() {
        let wrapped = wrap(make_response(LARGE), Some(Codec::Brotli));
        assert_eq!(
            wrapped.headers().get(header::CONTENT_ENCODING).unwrap(),
            "br"
        );
    }
}
