use crate::marshal::MarshalError;
use crate::value::{RecordValue, RpcValue};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts a record between its in-memory form and the document body.
/// One codec is registered per record type name; the marshaling engine
/// looks it up whenever a `Record` descriptor is encountered.
pub trait RecordCodec: Send + Sync {
    fn type_name(&self) -> &str;

    fn encode(&self, value: &dyn RecordValue) -> Result<Value, MarshalError>;

    fn decode(&self, json: Value) -> Result<Arc<dyn RecordValue>, MarshalError>;
}

/// Serde-backed codec for any record type with derived
/// `Serialize`/`Deserialize`.
pub struct SerdeRecordCodec<T> {
    type_name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeRecordCodec<T> {
    pub fn new(type_name: impl Into<String>) -> Self {
        SerdeRecordCodec {
            type_name: type_name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> RecordCodec for SerdeRecordCodec<T>
where
    T: Serialize + DeserializeOwned + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn encode(&self, value: &dyn RecordValue) -> Result<Value, MarshalError> {
        let concrete = value.as_any().downcast_ref::<T>().ok_or_else(|| {
            MarshalError::RecordEncode {
                type_name: self.type_name.clone(),
                reason: "value is not an instance of the registered type".to_string(),
            }
        })?;
        serde_json::to_value(concrete).map_err(|e| MarshalError::RecordEncode {
            type_name: self.type_name.clone(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, json: Value) -> Result<Arc<dyn RecordValue>, MarshalError> {
        let concrete: T =
            serde_json::from_value(json).map_err(|e| MarshalError::RecordDecode {
                type_name: self.type_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(concrete))
    }
}

/// Concurrent map of record codecs keyed by type name.
#[derive(Default)]
pub struct RecordCodecRegistry {
    codecs: DashMap<String, Arc<dyn RecordCodec>>,
}

impl RecordCodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec under its own type name, replacing any previous
    /// codec for that name.
    pub fn register(&self, codec: Arc<dyn RecordCodec>) {
        self.codecs.insert(codec.type_name().to_string(), codec);
    }

    /// Shorthand for registering a [`SerdeRecordCodec`] for `T`.
    pub fn register_serde<T>(&self, type_name: impl Into<String>)
    where
        T: Serialize + DeserializeOwned + PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        self.register(Arc::new(SerdeRecordCodec::<T>::new(type_name)));
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn RecordCodec>> {
        self.codecs.get(type_name).map(|c| Arc::clone(c.value()))
    }

    /// Encode a tagged record value through its registered codec.
    pub fn encode(&self, type_name: &str, value: &dyn RecordValue) -> Result<Value, MarshalError> {
        let codec = self
            .get(type_name)
            .ok_or_else(|| MarshalError::UnknownRecord(type_name.to_string()))?;
        codec.encode(value)
    }

    /// Decode a document into a tagged [`RpcValue::Record`].
    pub fn decode(&self, type_name: &str, json: Value) -> Result<RpcValue, MarshalError> {
        let codec = self
            .get(type_name)
            .ok_or_else(|| MarshalError::UnknownRecord(type_name.to_string()))?;
        Ok(RpcValue::Record(type_name.to_string(), codec.decode(json)?))
    }
}

impl fmt::Debug for RecordCodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCodecRegistry")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}
