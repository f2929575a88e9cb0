use crate::codec::{CompressStream, Compressors};
use crate::gate::{DEFAULT_THRESHOLD, DefaultClassifier, MimeClassifier};
use crate::service::CompressionService;
use std::fmt;
use std::sync::Arc;
use tower::Layer;

/// Settings shared by every service built from one layer.
#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) threshold: usize,
    pub(crate) compressors: Compressors,
    pub(crate) classifier: Arc<dyn MimeClassifier>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            compressors: Compressors::default(),
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("threshold", &self.threshold)
            .field("compressors", &self.compressors)
            .finish_non_exhaustive()
    }
}

/// A Tower layer that compresses HTTP response bodies.
///
/// This layer wraps services and compresses response bodies based on the
/// client's Accept-Encoding header, the response Content-Type and the body
/// size.
#[derive(Debug, Clone, Default)]
pub struct CompressionLayer {
    config: Config,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// The default minimum size for compression is 1024 bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Responses whose length is known and smaller than this value are sent
    /// unchanged. A threshold of `0` compresses every eligible response; it
    /// does not fall back to the 1024 byte default.
    pub fn threshold(mut self, size: usize) -> Self {
        self.config.threshold = size;
        self
    }

    /// Uses `compressor` for `br`, in place of the built-in brotli encoder.
    ///
    /// With the `brotli` feature disabled this is the only way to offer `br`.
    pub fn brotli<C: CompressStream>(mut self, compressor: C) -> Self {
        self.config.compressors = Compressors::new(Some(Arc::new(compressor)));
        self
    }

    /// Replaces the MIME compressibility classifier.
    pub fn classifier<M: MimeClassifier>(mut self, classifier: M) -> Self {
        self.config.classifier = Arc::new(classifier);
        self
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::with_config(inner, Arc::new(self.config.clone()))
    }
}
