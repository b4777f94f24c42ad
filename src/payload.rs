//! Optional whole-payload compression.
//!
//! Compression wraps the complete encoded object graph; it does not change the
//! wire format underneath.

use bytes::Bytes;

use crate::Result;

/// How an encoded payload is wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    /// Raw deflate stream.
    #[cfg(feature = "deflate")]
    Deflate,
}

impl Compression {
    /// Wraps an encoded payload.
    ///
    /// # Errors
    /// Returns `EncoderError::Io` if the compressor fails.
    pub fn compress(self, payload: Bytes) -> Result<Bytes> {
        match self {
            Compression::None => Ok(payload),
            #[cfg(feature = "deflate")]
            Compression::Deflate => {
                use std::io::Write;

                let mut encoder =
                    flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::fast());
                encoder.write_all(&payload)?;
                Ok(Bytes::from(encoder.finish()?))
            }
        }
    }

    /// Unwraps a payload produced by [`Compression::compress`].
    ///
    /// # Errors
    /// Returns `EncoderError::Io` for a corrupt stream.
    pub fn decompress(self, payload: Bytes) -> Result<Bytes> {
        match self {
            Compression::None => Ok(payload),
            #[cfg(feature = "deflate")]
            Compression::Deflate => {
                use std::io::Read;

                let mut decoder = flate2::read::DeflateDecoder::new(payload.as_ref());
                let mut out = Vec::with_capacity(payload.len() * 2);
                decoder.read_to_end(&mut out)?;
                Ok(Bytes::from(out))
            }
        }
    }
}
