use crate::codec::Codec;
use crate::error::Error;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::Span;

/// Resolves once a compressed body reaches a terminal state.
///
/// Yields `Ok(())` when the compressed stream was fully produced, or the
/// error that ended it. A body dropped before finishing yields
/// [`Error::Aborted`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), Error>>,
}

impl Future for Completion {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(Error::Aborted)))
    }
}

/// Records the outcome of one compressed body, exactly once.
pub(crate) struct CompletionSink {
    span: Span,
    codec: Codec,
    tx: Option<oneshot::Sender<Result<(), Error>>>,
    done: bool,
}

impl CompletionSink {
    /// Creates a sink that only logs.
    pub(crate) fn new(span: Span, codec: Codec) -> Self {
        Self {
            span,
            codec,
            tx: None,
            done: false,
        }
    }

    /// Creates a sink that logs and also resolves the returned [`Completion`].
    pub(crate) fn with_signal(span: Span, codec: Codec) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            span,
            codec,
            tx: Some(tx),
            done: false,
        };
        (sink, Completion { rx })
    }

    /// Records the outcome. Calls after the first are ignored.
    pub(crate) fn complete(&mut self, result: Result<(), Error>) {
        if self.done {
            return;
        }
        self.done = true;

        match &result {
            Ok(()) => {
                tracing::trace!(parent: &self.span, codec = %self.codec, "compressed body finished");
            }
            Err(Error::Aborted) => {
                tracing::warn!(
                    parent: &self.span,
                    codec = %self.codec,
                    "compressed body dropped before it was fully sent"
                );
            }
            Err(err) => {
                tracing::error!(
                    parent: &self.span,
                    codec = %self.codec,
                    error = %err,
                    "failed to compress response body"
                );
            }
        }

        if let Some(tx) = self.tx.take() {
            // The receiver may already be gone; the outcome is logged either way
            let _ = tx.send(result);
        }
    }
}

impl Drop for CompletionSink {
    fn drop(&mut self) {
        self.complete(Err(Error::Aborted));
    }
}
