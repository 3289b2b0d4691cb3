//! Binary encoding of [`ServiceError`] for travel across bus boundaries.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! i32  failure code
//! u8   message presence (0 or 1)
//! i32  message byte length   } only when present
//! [u8] UTF-8 message bytes   }
//! i32  debug info byte length
//! [u8] debug info as JSON
//! ```
//!
//! Both peers must agree on the codec byte-for-byte; a mixed deployment
//! decoding a frame produced by the other side is the normal case, not
//! the exception.

use crate::error::ServiceError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("failure payload truncated")]
    Truncated,

    #[error("failure payload message is not valid UTF-8")]
    InvalidUtf8,

    #[error("failure payload debug info is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Name of the codec every registry carries.
pub const BASE_CODEC_NAME: &str = "service.error";

/// Converts a [`ServiceError`] to and from its wire bytes. Custom error
/// types register their own codec under a distinct name; the frame
/// carries the name so the receiving side can pick the same one.
pub trait ErrorCodec: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, error: &ServiceError) -> Result<Bytes, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<ServiceError, CodecError>;
}

/// An encoded failure in transit: the codec that produced it plus its
/// opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureFrame {
    pub codec: String,
    pub payload: Bytes,
}

/// The default codec implementing the documented layout.
#[derive(Debug, Default)]
pub struct BaseErrorCodec;

impl ErrorCodec for BaseErrorCodec {
    fn name(&self) -> &str {
        BASE_CODEC_NAME
    }

    fn encode(&self, error: &ServiceError) -> Result<Bytes, CodecError> {
        let debug = serde_json::to_vec(&error.debug_info)
            .map_err(|e| CodecError::InvalidJson(e.to_string()))?;

        let mut buf = BytesMut::with_capacity(16 + debug.len());
        buf.put_i32(error.failure_code);
        match &error.message {
            Some(message) => {
                buf.put_u8(1);
                buf.put_i32(message.len() as i32);
                buf.put_slice(message.as_bytes());
            }
            None => buf.put_u8(0),
        }
        buf.put_i32(debug.len() as i32);
        buf.put_slice(&debug);
        Ok(buf.freeze())
    }

    fn decode(&self, payload: &[u8]) -> Result<ServiceError, CodecError> {
        let mut buf = payload;
        if buf.remaining() < 5 {
            return Err(CodecError::Truncated);
        }
        let failure_code = buf.get_i32();

        let message = if buf.get_u8() == 0 {
            None
        } else {
            let raw = read_chunk(&mut buf)?;
            Some(String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)?)
        };

        let raw = read_chunk(&mut buf)?;
        let debug_info =
            serde_json::from_slice(&raw).map_err(|e| CodecError::InvalidJson(e.to_string()))?;

        Ok(ServiceError {
            failure_code,
            message,
            debug_info,
        })
    }
}

fn read_chunk(buf: &mut &[u8]) -> Result<Bytes, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated);
    }
    let len = usize::try_from(buf.get_i32()).map_err(|_| CodecError::Truncated)?;
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    Ok(buf.copy_to_bytes(len))
}

/// Codecs keyed by name, with [`BaseErrorCodec`] as the fallback for
/// frames whose codec the local side never registered.
pub struct ErrorCodecRegistry {
    codecs: DashMap<String, Arc<dyn ErrorCodec>>,
    base: Arc<dyn ErrorCodec>,
}

impl ErrorCodecRegistry {
    pub fn new() -> Self {
        let base: Arc<dyn ErrorCodec> = Arc::new(BaseErrorCodec);
        let codecs = DashMap::new();
        codecs.insert(base.name().to_string(), Arc::clone(&base));
        ErrorCodecRegistry { codecs, base }
    }

    pub fn register(&self, codec: Arc<dyn ErrorCodec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    /// Encode with the base codec.
    pub fn encode(&self, error: &ServiceError) -> Result<FailureFrame, CodecError> {
        self.encode_with(BASE_CODEC_NAME, error)
    }

    /// Encode with a named codec, falling back to the base codec when the
    /// name is unknown.
    pub fn encode_with(
        &self,
        codec_name: &str,
        error: &ServiceError,
    ) -> Result<FailureFrame, CodecError> {
        let codec = self.lookup(codec_name);
        Ok(FailureFrame {
            codec: codec.name().to_string(),
            payload: codec.encode(error)?,
        })
    }

    pub fn decode(&self, frame: &FailureFrame) -> Result<ServiceError, CodecError> {
        self.lookup(&frame.codec).decode(&frame.payload)
    }

    fn lookup(&self, codec_name: &str) -> Arc<dyn ErrorCodec> {
        self.codecs
            .get(codec_name)
            .map(|c| Arc::clone(c.value()))
            .unwrap_or_else(|| Arc::clone(&self.base))
    }
}

impl Default for ErrorCodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorCodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCodecRegistry")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_with_message_and_debug_info() {
        let error = ServiceError::new(42, "too many cooks")
            .with_debug_info(json!({"kitchen": "busy", "count": 7}));
        let codec = BaseErrorCodec;
        let payload = codec.encode(&error).unwrap();
        assert_eq!(codec.decode(&payload).unwrap(), error);
    }

    #[test]
    fn test_round_trip_without_message() {
        let error = ServiceError::bare(-1);
        let codec = BaseErrorCodec;
        let payload = codec.encode(&error).unwrap();
        assert_eq!(codec.decode(&payload).unwrap(), error);
    }

    #[test]
    fn test_layout_is_exact() {
        let error = ServiceError::new(1, "hi");
        let payload = BaseErrorCodec.encode(&error).unwrap();
        let expected: &[u8] = &[
            0, 0, 0, 1, // failure code
            1, // message present
            0, 0, 0, 2, b'h', b'i', // message
            0, 0, 0, 4, b'n', b'u', b'l', b'l', // debug info
        ];
        assert_eq!(&payload[..], expected);
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let error = ServiceError::new(7, "short");
        let payload = BaseErrorCodec.encode(&error).unwrap();
        for cut in 0..payload.len() {
            assert_eq!(
                BaseErrorCodec.decode(&payload[..cut]).unwrap_err(),
                CodecError::Truncated,
                "cut at {cut}"
            );
        }
    }

    struct CodeOnlyCodec;

    impl ErrorCodec for CodeOnlyCodec {
        fn name(&self) -> &str {
            "code.only"
        }

        fn encode(&self, error: &ServiceError) -> Result<Bytes, CodecError> {
            let mut buf = BytesMut::with_capacity(4);
            buf.put_i32(error.failure_code);
            Ok(buf.freeze())
        }

        fn decode(&self, payload: &[u8]) -> Result<ServiceError, CodecError> {
            let mut buf = payload;
            if buf.remaining() < 4 {
                return Err(CodecError::Truncated);
            }
            Ok(ServiceError::bare(buf.get_i32()))
        }
    }

    #[test]
    fn test_registered_codec_selected_by_name() {
        let registry = ErrorCodecRegistry::new();
        registry.register(Arc::new(CodeOnlyCodec));

        let frame = registry
            .encode_with("code.only", &ServiceError::new(12, "ignored"))
            .unwrap();
        assert_eq!(frame.codec, "code.only");
        assert_eq!(&frame.payload[..], &[0, 0, 0, 12]);
        assert_eq!(registry.decode(&frame).unwrap(), ServiceError::bare(12));
    }

    #[test]
    fn test_unknown_codec_falls_back_to_base() {
        let registry = ErrorCodecRegistry::new();
        let error = ServiceError::new(9, "custom");
        let frame = registry.encode_with("my.custom.codec", &error).unwrap();
        assert_eq!(frame.codec, BASE_CODEC_NAME);
        assert_eq!(registry.decode(&frame).unwrap(), error);

        let foreign = FailureFrame {
            codec: "never.registered".to_string(),
            payload: frame.payload,
        };
        assert_eq!(registry.decode(&foreign).unwrap(), error);
    }
}
