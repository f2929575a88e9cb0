use crate::negotiate::SupportedEncodings;
use bytes::BytesMut;
#[cfg(feature = "brotli")]
use compression_codecs::brotli::{BrotliEncoder, params::EncoderParams as BrotliParams};
use compression_codecs::{EncodeV2, gzip::GzipEncoder, zlib::ZlibEncoder};
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::fmt;
use std::io;
use std::sync::Arc;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Supported compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Gzip compression.
    Gzip,
    /// Deflate compression (zlib framing, as HTTP defines it).
    Deflate,
    /// Brotli compression.
    Brotli,
}

impl Codec {
    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
            Codec::Brotli => "br",
        }
    }

    /// Looks up a codec by its Content-Encoding name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Codec> {
        [Codec::Gzip, Codec::Deflate, Codec::Brotli]
            .into_iter()
            .find(|codec| codec.content_encoding().eq_ignore_ascii_case(name))
    }

    /// Creates the built-in encoder for this codec, if one is compiled in.
    pub fn native_encoder(&self) -> Option<Box<dyn Encoder>> {
        let inner: Box<dyn EncodeV2 + Send> = match self {
            Codec::Gzip => Box::new(GzipEncoder::new(Level::Default.into())),
            Codec::Deflate => Box::new(ZlibEncoder::new(Level::Default.into())),
            #[cfg(feature = "brotli")]
            Codec::Brotli => Box::new(BrotliEncoder::new(BrotliParams::default())),
            #[cfg(not(feature = "brotli"))]
            Codec::Brotli => return None,
        };
        Some(Box::new(CodecEncoder::new(inner)))
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

/// A streaming compressor.
///
/// Output is appended to the provided buffer; an encoder may hold input back
/// until [`Encoder::flush`] or [`Encoder::finish`] is called.
pub trait Encoder: Send {
    /// Compresses all of `input`.
    fn encode(&mut self, input: &[u8], output: &mut BytesMut) -> io::Result<()>;

    /// Emits everything buffered so far without ending the stream.
    fn flush(&mut self, output: &mut BytesMut) -> io::Result<()>;

    /// Ends the stream, emitting any trailing bytes.
    fn finish(&mut self, output: &mut BytesMut) -> io::Result<()>;
}

/// A caller-supplied compressor factory, used for `br`.
///
/// A new encoder is requested for every compressed response.
pub trait CompressStream: Send + Sync + 'static {
    /// Creates a fresh encoder.
    fn compress_stream(&self) -> Box<dyn Encoder>;
}

impl<F> CompressStream for F
where
    F: Fn() -> Box<dyn Encoder> + Send + Sync + 'static,
{
    fn compress_stream(&self) -> Box<dyn Encoder> {
        self()
    }
}

/// Adapts a `compression-codecs` encoder to [`Encoder`].
struct CodecEncoder {
    inner: Box<dyn EncodeV2 + Send>,
    buffer: Vec<u8>,
}

impl CodecEncoder {
    fn new(inner: Box<dyn EncodeV2 + Send>) -> Self {
        Self {
            inner,
            buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
        }
    }
}

impl Encoder for CodecEncoder {
    fn encode(&mut self, input: &[u8], output: &mut BytesMut) -> io::Result<()> {
        let mut input_buf = PartialBuffer::new(input);

        // Keep encoding until all input is consumed
        while input_buf.written_len() < input.len() {
            let consumed = input_buf.written_len();
            let mut out = WriteBuffer::new_initialized(self.buffer.as_mut_slice());
            self.inner.encode(&mut input_buf, &mut out)?;

            let written = out.written_len();
            output.extend_from_slice(&self.buffer[..written]);

            if written == 0 && input_buf.written_len() == consumed {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "encoder made no progress",
                ));
            }
        }
        Ok(())
    }

    fn flush(&mut self, output: &mut BytesMut) -> io::Result<()> {
        loop {
            let mut out = WriteBuffer::new_initialized(self.buffer.as_mut_slice());
            let done = self.inner.flush(&mut out)?;
            let written = out.written_len();
            output.extend_from_slice(&self.buffer[..written]);
            if done {
                return Ok(());
            }
        }
    }

    fn finish(&mut self, output: &mut BytesMut) -> io::Result<()> {
        loop {
            let mut out = WriteBuffer::new_initialized(self.buffer.as_mut_slice());
            let done = self.inner.finish(&mut out)?;
            let written = out.written_len();
            output.extend_from_slice(&self.buffer[..written]);
            if done {
                return Ok(());
            }
        }
    }
}

/// The encoders available to the pipeline and the encodings they imply.
///
/// Built once when the layer is configured. A caller-supplied brotli
/// compressor takes precedence over the built-in one.
#[derive(Clone)]
pub struct Compressors {
    brotli: Option<Arc<dyn CompressStream>>,
    supported: SupportedEncodings,
}

impl Compressors {
    /// Builds the compressor set, optionally with a pluggable brotli compressor.
    pub fn new(brotli: Option<Arc<dyn CompressStream>>) -> Self {
        let mut codecs = vec![Codec::Gzip, Codec::Deflate];
        if brotli.is_some() || cfg!(feature = "brotli") {
            codecs.push(Codec::Brotli);
        }

        Self {
            brotli,
            supported: SupportedEncodings::new(codecs),
        }
    }

    /// Returns the encodings this set can produce, in preference order.
    pub fn supported(&self) -> &SupportedEncodings {
        &self.supported
    }

    /// Creates an encoder for `codec`, or `None` if the codec is unavailable.
    pub fn encoder(&self, codec: Codec) -> Option<Box<dyn Encoder>> {
        match (codec, &self.brotli) {
            (Codec::Brotli, Some(plugin)) => Some(plugin.compress_stream()),
            _ => codec.native_encoder(),
        }
    }
}

impl Default for Compressors {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for Compressors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compressors")
            .field("supported", &self.supported)
            .field("pluggable_brotli", &self.brotli.is_some())
            .finish()
    }
}
