use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A structured user value carried through the runtime without the engine
/// knowing its concrete type. Encoding and decoding go through the codec
/// registered for the record's type name.
pub trait RecordValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn eq_record(&self, other: &dyn RecordValue) -> bool;
}

impl<T> RecordValue for T
where
    T: Any + PartialEq + fmt::Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_record(&self, other: &dyn RecordValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |o| self == o)
    }
}

/// Runtime value union mirroring [`TypeDescriptor`](crate::TypeDescriptor).
///
/// Values are explicit tagged data rather than reflected native objects;
/// every shape the marshaling engine can encode has a variant here.
#[derive(Debug, Clone)]
pub enum RpcValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    Str(String),
    /// An enum constant, carried as its symbol.
    Enum(String),
    List(Vec<RpcValue>),
    /// Element order is incidental; equality is set equality.
    Set(Vec<RpcValue>),
    Map(BTreeMap<String, RpcValue>),
    /// A record instance tagged with its registered type name.
    Record(String, Arc<dyn RecordValue>),
    /// Opaque document, passed through unchanged.
    Document(Value),
}

impl RpcValue {
    pub fn record<T: RecordValue>(type_name: impl Into<String>, value: T) -> Self {
        RpcValue::Record(type_name.into(), Arc::new(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RpcValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            RpcValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RpcValue::I8(v) => Some(i64::from(*v)),
            RpcValue::I16(v) => Some(i64::from(*v)),
            RpcValue::I32(v) => Some(i64::from(*v)),
            RpcValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RpcValue::Null)
    }

    /// Short name of the variant, used in decode failure messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RpcValue::Null => "null",
            RpcValue::Bool(_) => "bool",
            RpcValue::I8(_) => "i8",
            RpcValue::I16(_) => "i16",
            RpcValue::I32(_) => "i32",
            RpcValue::I64(_) => "i64",
            RpcValue::F32(_) => "f32",
            RpcValue::F64(_) => "f64",
            RpcValue::Char(_) => "char",
            RpcValue::Str(_) => "string",
            RpcValue::Enum(_) => "enum",
            RpcValue::List(_) => "list",
            RpcValue::Set(_) => "set",
            RpcValue::Map(_) => "map",
            RpcValue::Record(..) => "record",
            RpcValue::Document(_) => "document",
        }
    }
}

/// Order-insensitive comparison used for `Set` values.
fn set_eq(a: &[RpcValue], b: &[RpcValue]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for x in a {
        let mut found = false;
        for (i, y) in b.iter().enumerate() {
            if !used[i] && x == y {
                used[i] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

impl PartialEq for RpcValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RpcValue::Null, RpcValue::Null) => true,
            (RpcValue::Bool(a), RpcValue::Bool(b)) => a == b,
            (RpcValue::I8(a), RpcValue::I8(b)) => a == b,
            (RpcValue::I16(a), RpcValue::I16(b)) => a == b,
            (RpcValue::I32(a), RpcValue::I32(b)) => a == b,
            (RpcValue::I64(a), RpcValue::I64(b)) => a == b,
            (RpcValue::F32(a), RpcValue::F32(b)) => a == b,
            (RpcValue::F64(a), RpcValue::F64(b)) => a == b,
            (RpcValue::Char(a), RpcValue::Char(b)) => a == b,
            (RpcValue::Str(a), RpcValue::Str(b)) => a == b,
            (RpcValue::Enum(a), RpcValue::Enum(b)) => a == b,
            (RpcValue::List(a), RpcValue::List(b)) => a == b,
            (RpcValue::Set(a), RpcValue::Set(b)) => set_eq(a, b),
            (RpcValue::Map(a), RpcValue::Map(b)) => a == b,
            (RpcValue::Record(an, av), RpcValue::Record(bn, bv)) => {
                an == bn && av.eq_record(bv.as_ref())
            }
            (RpcValue::Document(a), RpcValue::Document(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for RpcValue {
    fn from(v: bool) -> Self {
        RpcValue::Bool(v)
    }
}

impl From<i8> for RpcValue {
    fn from(v: i8) -> Self {
        RpcValue::I8(v)
    }
}

impl From<i16> for RpcValue {
    fn from(v: i16) -> Self {
        RpcValue::I16(v)
    }
}

impl From<i32> for RpcValue {
    fn from(v: i32) -> Self {
        RpcValue::I32(v)
    }
}

impl From<i64> for RpcValue {
    fn from(v: i64) -> Self {
        RpcValue::I64(v)
    }
}

impl From<f32> for RpcValue {
    fn from(v: f32) -> Self {
        RpcValue::F32(v)
    }
}

impl From<f64> for RpcValue {
    fn from(v: f64) -> Self {
        RpcValue::F64(v)
    }
}

impl From<char> for RpcValue {
    fn from(v: char) -> Self {
        RpcValue::Char(v)
    }
}

impl From<&str> for RpcValue {
    fn from(v: &str) -> Self {
        RpcValue::Str(v.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(v: String) -> Self {
        RpcValue::Str(v)
    }
}
