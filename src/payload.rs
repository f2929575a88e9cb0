use crate::error::BoxError;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::Full;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response payload: either fully materialized or a lazy stream.
    ///
    /// Buffered payloads report their exact length, which lets the size
    /// threshold apply to them.
    #[project = PayloadProj]
    #[allow(missing_docs)]
    pub enum Payload<B> {
        /// A materialized buffer.
        Buffered {
            #[pin]
            inner: Full<Bytes>,
        },
        /// A streaming body.
        Stream {
            #[pin]
            inner: B,
        },
    }
}

impl<B> Payload<B> {
    /// Wraps a materialized buffer.
    pub fn buffered(data: impl Into<Bytes>) -> Self {
        Self::Buffered {
            inner: Full::new(data.into()),
        }
    }

    /// Wraps a streaming body.
    pub fn stream(inner: B) -> Self {
        Self::Stream { inner }
    }
}

impl<B> From<Bytes> for Payload<B> {
    fn from(data: Bytes) -> Self {
        Self::buffered(data)
    }
}

impl<B> From<Vec<u8>> for Payload<B> {
    fn from(data: Vec<u8>) -> Self {
        Self::buffered(data)
    }
}

impl<B> From<String> for Payload<B> {
    fn from(data: String) -> Self {
        Self::buffered(data)
    }
}

impl<B> From<&'static str> for Payload<B> {
    fn from(data: &'static str) -> Self {
        Self::buffered(data)
    }
}

impl<B> Body for Payload<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            PayloadProj::Buffered { inner } => inner
                .poll_frame(cx)
                .map_err(|never| match never {}),
            PayloadProj::Stream { inner } => inner.poll_frame(cx).map_err(Into::into),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Payload::Buffered { inner } => inner.is_end_stream(),
            Payload::Stream { inner } => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Payload::Buffered { inner } => inner.size_hint(),
            Payload::Stream { inner } => inner.size_hint(),
        }
    }
}
