use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error produced while converting a message to or from bytes.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MarshalError(Box<dyn std::error::Error + Send + Sync>);

impl MarshalError {
    /// Wrap an arbitrary codec error.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl From<serde_json::Error> for MarshalError {
    fn from(err: serde_json::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Converts messages of type `T` to and from opaque payload bytes.
pub trait Marshaller<T>: Send + Sync + 'static {
    /// Serialize a message into a payload.
    fn serialize(&self, value: &T) -> Result<Bytes, MarshalError>;

    /// Deserialize one payload into a message.
    fn deserialize(&self, payload: &[u8]) -> Result<T, MarshalError>;
}

/// JSON marshaller backed by `serde_json`.
pub struct JsonMarshaller<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonMarshaller<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonMarshaller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonMarshaller<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonMarshaller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonMarshaller")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Marshaller<T> for JsonMarshaller<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn serialize(&self, value: &T) -> Result<Bytes, MarshalError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<T, MarshalError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
