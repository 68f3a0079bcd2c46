//! Payload codecs
//!
//! The pipeline only ever moves opaque bytes. Typed events are converted at
//! the ingestion boundary by a caller-chosen codec, which keeps the queue
//! independent of any particular encoding.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Converts typed events to and from payload bytes
pub trait PayloadCodec<T>: Send + Sync {
    /// Encode a value into payload bytes
    fn encode(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decode payload bytes back into a value
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec, the natural choice for the HTTP transport
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> PayloadCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Compact binary codec based on postcard
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl<T> PayloadCodec<T> for PostcardCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        postcard::to_allocvec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        postcard::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
