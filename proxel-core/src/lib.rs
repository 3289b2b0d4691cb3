//! Core types for address-routed service proxies: schemas, runtime
//! values, the marshaling engine and the failure codec. Everything here
//! is transport-agnostic; the bus, dispatcher and stub live in the
//! `proxel-transport`, `proxel-server` and `proxel-client` crates.

pub mod codec;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod marshal;
pub mod record;
pub mod registry;
pub mod schema;
pub mod validate;
pub mod value;

pub use codec::{BaseErrorCodec, CodecError, ErrorCodec, ErrorCodecRegistry, FailureFrame};
pub use descriptor::{PrimitiveKind, TypeDescriptor};
pub use envelope::{headers, Envelope};
pub use error::{failure_codes, ServiceError};
pub use marshal::{decode_args, decode_value, encode_args, encode_value, MarshalError};
pub use record::{RecordCodec, RecordCodecRegistry, SerdeRecordCodec};
pub use registry::{ProxyRegistry, SchemaRegistry};
pub use schema::{MethodSchema, ParamSchema, ParamType, ResultKind, ServiceSchema, SyncReturn};
pub use validate::{validate, SchemaError};
pub use value::{RecordValue, RpcValue};
