use crate::codec::{Codec, Compressors, Encoder};
use crate::completion::{Completion, CompletionSink};
use crate::error::{BoxError, Error};
use bytes::{Buf, Bytes, BytesMut};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::Span;

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type wraps an inner body and either compresses it using the
    /// negotiated codec or passes it through unchanged. Dropping it tears
    /// down the inner body and the encoder.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// State of an actively compressed body.
pub(crate) struct CompressedBody {
    encoder: Option<Box<dyn Encoder>>,
    codec: Codec,
    always_flush: bool,
    state: CompressState,
    pending_trailers: Option<http::HeaderMap>,
    sink: CompletionSink,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete or has failed.
    Done,
}

impl CompressedBody {
    fn new(
        encoder: Box<dyn Encoder>,
        codec: Codec,
        always_flush: bool,
        sink: CompletionSink,
    ) -> Self {
        Self {
            encoder: Some(encoder),
            codec,
            always_flush,
            state: CompressState::Reading,
            pending_trailers: None,
            sink,
        }
    }

    /// Returns the current compression state.
    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn always_flush(&self) -> bool {
        self.always_flush
    }

    /// Polls the inner body and compresses data.
    ///
    /// The inner body is only polled when the consumer polls, and each input
    /// frame is encoded before the next one is requested.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<BoxError>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                CompressState::Reading => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => match self.finish() {
                        Ok(Some(data)) => return Poll::Ready(Some(Ok(Frame::data(data)))),
                        Ok(None) => continue,
                        Err(e) => return self.fail(e),
                    },
                    Poll::Ready(Some(Err(e))) => return self.fail(Error::body(e)),
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(mut data) => {
                            let input = data.copy_to_bytes(data.remaining());
                            match self.compress_chunk(&input) {
                                Ok(Some(output)) => {
                                    return Poll::Ready(Some(Ok(Frame::data(output))));
                                }
                                // Encoder is holding the input back
                                Ok(None) => continue,
                                Err(e) => return self.fail(e),
                            }
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Buffer trailers and finish compression first
                                self.pending_trailers = Some(trailers);
                                match self.finish() {
                                    Ok(Some(data)) => {
                                        return Poll::Ready(Some(Ok(Frame::data(data))));
                                    }
                                    Ok(None) => continue,
                                    Err(e) => return self.fail(e),
                                }
                            }
                        }
                    },
                },
            }
        }
    }

    /// Compresses a chunk of input data.
    fn compress_chunk(&mut self, input: &[u8]) -> Result<Option<Bytes>, Error> {
        let codec = self.codec.content_encoding();
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(None);
        };

        let mut output = BytesMut::new();
        encoder
            .encode(input, &mut output)
            .map_err(|e| Error::encoder(codec, e))?;

        if self.always_flush {
            encoder
                .flush(&mut output)
                .map_err(|e| Error::encoder(codec, e))?;
        }

        Ok((!output.is_empty()).then(|| output.freeze()))
    }

    /// Ends the encoded stream and records success.
    fn finish(&mut self) -> Result<Option<Bytes>, Error> {
        let mut output = BytesMut::new();
        if let Some(mut encoder) = self.encoder.take() {
            encoder
                .finish(&mut output)
                .map_err(|e| Error::encoder(self.codec.content_encoding(), e))?;
        }

        self.state = if self.pending_trailers.is_some() {
            CompressState::Trailers
        } else {
            CompressState::Done
        };
        self.sink.complete(Ok(()));

        Ok((!output.is_empty()).then(|| output.freeze()))
    }

    /// Stops the pipeline after a stage failed.
    fn fail(&mut self, err: Error) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        self.state = CompressState::Done;
        self.encoder = None;
        self.pending_trailers = None;
        self.sink.complete(Err(err.clone()));
        Poll::Ready(Some(Err(err)))
    }
}

impl<B> CompressionBody<B> {
    pub(crate) fn compressed(
        inner: B,
        encoder: Box<dyn Encoder>,
        codec: Codec,
        always_flush: bool,
        sink: CompletionSink,
    ) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(encoder, codec, always_flush, sink),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Returns the codec in use, or `None` for a passthrough body.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            CompressionBody::Compressed { state, .. } => Some(state.codec),
            CompressionBody::Passthrough { .. } => None,
        }
    }
}

/// Runs `payload` through a fresh encoder for `codec`.
///
/// Returns the compressed body together with a [`Completion`] that resolves
/// once the body has been fully produced, has failed, or has been dropped.
/// Failures are also logged within the current span.
pub fn compress<B>(
    payload: B,
    codec: Codec,
    compressors: &Compressors,
) -> Result<(CompressionBody<B>, Completion), Error>
where
    B: Body,
{
    let encoder = compressors
        .encoder(codec)
        .ok_or(Error::Unsupported(codec.content_encoding()))?;
    let (sink, completion) = CompletionSink::with_signal(Span::current(), codec);
    let body = CompressionBody::compressed(payload, encoder, codec, false, sink);
    Ok((body, completion))
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::body(e)))),
            },
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => http_body::SizeHint::default(),
        }
    }
}
