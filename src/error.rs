use std::io;
use std::sync::Arc;

/// Boxed error produced by a response body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by a compressed response body.
///
/// The same value is yielded to the consumer of the body and delivered to the
/// completion signal, so it is cheap to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The source body yielded an error.
    #[error("response body failed: {0}")]
    Body(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The encoder rejected its input or failed to finish.
    #[error("{codec} encoder failed: {source}")]
    Encoder {
        /// Content-Encoding name of the failing codec.
        codec: &'static str,
        /// Underlying codec error.
        #[source]
        source: Arc<io::Error>,
    },

    /// No encoder is configured for the requested Content-Encoding.
    #[error("no compressor available for {0}")]
    Unsupported(&'static str),

    /// The body was dropped before the compressed stream was finished.
    #[error("compressed body dropped before completion")]
    Aborted,
}

impl Error {
    pub(crate) fn body(err: impl Into<BoxError>) -> Self {
        Error::Body(Arc::from(err.into()))
    }

    pub(crate) fn encoder(codec: &'static str, err: io::Error) -> Self {
        Error::Encoder {
            codec,
            source: Arc::new(err),
        }
    }

    /// Returns true if the body was abandoned by its consumer.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
