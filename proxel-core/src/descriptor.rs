use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar kinds the marshaling engine knows how to put on the wire.
///
/// `Char` values travel as their integer code point, not as a
/// one-character string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    Str,
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Str => "string",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The closed set of marshalable shapes.
///
/// A descriptor says how a value is encoded to and decoded from the
/// envelope's document body. `ServiceRef` is the one exception: service
/// references are never encoded inline, they travel out of band through
/// the `proxyaddr` reply header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// The empty marker used as the result of close handshakes and other
    /// acknowledgement-only replies.
    Void,
    /// A non-nullable scalar.
    Primitive(PrimitiveKind),
    /// A nullable scalar.
    Boxed(PrimitiveKind),
    /// A named enumeration, encoded as its symbol string.
    Enum(String),
    /// Ordered homogeneous collection.
    List(Box<TypeDescriptor>),
    /// Unordered homogeneous collection; round-trips as a set.
    Set(Box<TypeDescriptor>),
    /// String-keyed map of homogeneous values.
    Map(Box<TypeDescriptor>),
    /// A structured user type with an externally registered codec.
    Record(String),
    /// A handle to another stateful service, satisfied by a child
    /// dispatcher at a fresh address.
    ServiceRef(String),
    /// An opaque tree-shaped document, passed through unchanged.
    Document,
}

impl TypeDescriptor {
    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(element))
    }

    pub fn set(element: TypeDescriptor) -> Self {
        TypeDescriptor::Set(Box::new(element))
    }

    pub fn map(value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(value))
    }

    pub fn record(name: impl Into<String>) -> Self {
        TypeDescriptor::Record(name.into())
    }

    pub fn service_ref(schema: impl Into<String>) -> Self {
        TypeDescriptor::ServiceRef(schema.into())
    }

    /// Whether `null` is a legal wire value for this shape.
    pub fn is_nullable(&self) -> bool {
        !matches!(self, TypeDescriptor::Primitive(_) | TypeDescriptor::Void)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Void => write!(f, "void"),
            TypeDescriptor::Primitive(kind) => write!(f, "{}", kind),
            TypeDescriptor::Boxed(kind) => write!(f, "{}?", kind),
            TypeDescriptor::Enum(name) => write!(f, "enum {}", name),
            TypeDescriptor::List(e) => write!(f, "list<{}>", e),
            TypeDescriptor::Set(e) => write!(f, "set<{}>", e),
            TypeDescriptor::Map(v) => write!(f, "map<string, {}>", v),
            TypeDescriptor::Record(name) => write!(f, "record {}", name),
            TypeDescriptor::ServiceRef(name) => write!(f, "service {}", name),
            TypeDescriptor::Document => write!(f, "document"),
        }
    }
}
