use crate::future::ResponseFuture;
use crate::header::HeaderAccess;
use crate::layer::Config;
use crate::negotiate::negotiate;
use http::{Request, header};
use http_body::Body;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    config: Arc<Config>,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service with default settings.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, Arc::default())
    }

    pub(crate) fn with_config(inner: S, config: Arc<Config>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    ResBody: Body,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let codec = {
            let accept_encoding = req.headers().get_header(&header::ACCEPT_ENCODING);
            negotiate(accept_encoding.as_deref(), self.config.compressors.supported())
        };

        let span = tracing::debug_span!(
            "compression",
            method = %req.method(),
            uri = %req.uri(),
            negotiated = codec.map_or("identity", |c| c.content_encoding()),
        );

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, codec, self.config.clone(), span)
    }
}
