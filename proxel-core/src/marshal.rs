//! Encoding between runtime values and the document bodies carried by
//! envelopes.
//!
//! The wire form of a call is a JSON object keyed by parameter name; the
//! wire form of a reply is the encoded result value alone. A few shapes
//! have non-obvious encodings that the decoder must mirror exactly:
//! characters travel as integer code points, enums as their symbol
//! strings, and a `null` collection decodes to an empty one.

use crate::descriptor::{PrimitiveKind, TypeDescriptor};
use crate::record::RecordCodecRegistry;
use crate::schema::MethodSchema;
use crate::value::RpcValue;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    #[error("method '{method}' takes {expected} arguments, {actual} supplied")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("{0} is not a valid character code point")]
    InvalidCodePoint(u64),

    #[error("no codec registered for record type '{0}'")]
    UnknownRecord(String),

    #[error("failed to encode record '{type_name}': {reason}")]
    RecordEncode { type_name: String, reason: String },

    #[error("failed to decode record '{type_name}': {reason}")]
    RecordDecode { type_name: String, reason: String },

    #[error("service reference '{0}' cannot be encoded inline")]
    ServiceReferenceInline(String),

    #[error("call body must be a document, found {0}")]
    BodyNotDocument(String),
}

fn mismatch(expected: impl ToString, actual: &Value) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: expected.to_string(),
        actual: json_kind(actual).to_string(),
    }
}

fn value_mismatch(expected: impl ToString, actual: &RpcValue) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.kind_name().to_string(),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build the call body for `method` from positional arguments: an object
/// with one entry per declared value parameter, in declared names.
pub fn encode_args(
    method: &MethodSchema,
    args: &[RpcValue],
    records: &RecordCodecRegistry,
) -> Result<Value, MarshalError> {
    let params: Vec<_> = method.value_params().collect();
    if params.len() != args.len() {
        return Err(MarshalError::Arity {
            method: method.name.clone(),
            expected: params.len(),
            actual: args.len(),
        });
    }

    let mut body = Map::with_capacity(params.len());
    for ((name, ty), arg) in params.into_iter().zip(args) {
        body.insert(name.to_string(), encode_value(ty, arg, records)?);
    }
    Ok(Value::Object(body))
}

/// Recover positional arguments for `method` from a call body. A key
/// absent from the body reads as `null`.
pub fn decode_args(
    method: &MethodSchema,
    body: &Value,
    records: &RecordCodecRegistry,
) -> Result<Vec<RpcValue>, MarshalError> {
    let empty = Map::new();
    let fields = match body {
        Value::Object(fields) => fields,
        Value::Null => &empty,
        other => return Err(MarshalError::BodyNotDocument(json_kind(other).to_string())),
    };

    let mut args = Vec::new();
    for (name, ty) in method.value_params() {
        let raw = fields.get(name).cloned().unwrap_or(Value::Null);
        args.push(decode_value(ty, raw, records)?);
    }
    Ok(args)
}

/// Encode one value against its descriptor.
pub fn encode_value(
    ty: &TypeDescriptor,
    value: &RpcValue,
    records: &RecordCodecRegistry,
) -> Result<Value, MarshalError> {
    if value.is_null() {
        return if ty.is_nullable() || *ty == TypeDescriptor::Void {
            Ok(Value::Null)
        } else {
            Err(value_mismatch(ty, value))
        };
    }

    match ty {
        TypeDescriptor::Void => Err(value_mismatch(ty, value)),
        TypeDescriptor::Primitive(kind) | TypeDescriptor::Boxed(kind) => {
            encode_scalar(*kind, value)
        }
        TypeDescriptor::Enum(_) => match value {
            RpcValue::Enum(symbol) | RpcValue::Str(symbol) => Ok(json!(symbol)),
            other => Err(value_mismatch(ty, other)),
        },
        TypeDescriptor::List(element) | TypeDescriptor::Set(element) => {
            let items = match value {
                RpcValue::List(items) | RpcValue::Set(items) => items,
                other => return Err(value_mismatch(ty, other)),
            };
            let encoded = items
                .iter()
                .map(|item| encode_element(element, item, records))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(encoded))
        }
        TypeDescriptor::Map(element) => {
            let entries = match value {
                RpcValue::Map(entries) => entries,
                other => return Err(value_mismatch(ty, other)),
            };
            let mut object = Map::with_capacity(entries.len());
            for (key, item) in entries {
                object.insert(key.clone(), encode_element(element, item, records)?);
            }
            Ok(Value::Object(object))
        }
        TypeDescriptor::Record(name) => match value {
            RpcValue::Record(tag, inner) if tag == name => records.encode(name, inner.as_ref()),
            other => Err(value_mismatch(ty, other)),
        },
        TypeDescriptor::ServiceRef(name) => {
            Err(MarshalError::ServiceReferenceInline(name.clone()))
        }
        TypeDescriptor::Document => match value {
            RpcValue::Document(doc) => Ok(doc.clone()),
            other => Err(value_mismatch(ty, other)),
        },
    }
}

/// Decode one wire value against its descriptor.
pub fn decode_value(
    ty: &TypeDescriptor,
    json: Value,
    records: &RecordCodecRegistry,
) -> Result<RpcValue, MarshalError> {
    if json.is_null() {
        return match ty {
            // A null collection reads as an empty one.
            TypeDescriptor::List(_) => Ok(RpcValue::List(Vec::new())),
            TypeDescriptor::Set(_) => Ok(RpcValue::Set(Vec::new())),
            TypeDescriptor::Map(_) => Ok(RpcValue::Map(BTreeMap::new())),
            TypeDescriptor::Primitive(kind) => Err(mismatch(kind, &json)),
            _ => Ok(RpcValue::Null),
        };
    }

    match ty {
        TypeDescriptor::Void => Err(mismatch(ty, &json)),
        TypeDescriptor::Primitive(kind) | TypeDescriptor::Boxed(kind) => {
            decode_scalar(*kind, &json)
        }
        TypeDescriptor::Enum(_) => match json {
            Value::String(symbol) => Ok(RpcValue::Enum(symbol)),
            other => Err(mismatch(ty, &other)),
        },
        TypeDescriptor::List(element) => {
            Ok(RpcValue::List(decode_elements(element, json, records)?))
        }
        TypeDescriptor::Set(element) => {
            Ok(RpcValue::Set(decode_elements(element, json, records)?))
        }
        TypeDescriptor::Map(element) => {
            let object = match json {
                Value::Object(object) => object,
                other => return Err(mismatch(ty, &other)),
            };
            let mut entries = BTreeMap::new();
            for (key, raw) in object {
                entries.insert(key, decode_element(element, raw, records)?);
            }
            Ok(RpcValue::Map(entries))
        }
        TypeDescriptor::Record(name) => records.decode(name, json),
        TypeDescriptor::ServiceRef(name) => {
            Err(MarshalError::ServiceReferenceInline(name.clone()))
        }
        TypeDescriptor::Document => Ok(RpcValue::Document(json)),
    }
}

fn encode_element(
    element: &TypeDescriptor,
    item: &RpcValue,
    records: &RecordCodecRegistry,
) -> Result<Value, MarshalError> {
    // Element positions are preserved; a null element stays null when
    // the element shape allows it.
    if item.is_null() && element.is_nullable() {
        return Ok(Value::Null);
    }
    encode_value(element, item, records)
}

fn decode_elements(
    element: &TypeDescriptor,
    json: Value,
    records: &RecordCodecRegistry,
) -> Result<Vec<RpcValue>, MarshalError> {
    let items = match json {
        Value::Array(items) => items,
        other => return Err(mismatch(format!("array of {}", element), &other)),
    };
    items
        .into_iter()
        .map(|raw| decode_element(element, raw, records))
        .collect()
}

fn decode_element(
    element: &TypeDescriptor,
    raw: Value,
    records: &RecordCodecRegistry,
) -> Result<RpcValue, MarshalError> {
    if raw.is_null() && element.is_nullable() {
        return Ok(RpcValue::Null);
    }
    decode_value(element, raw, records)
}

fn encode_scalar(kind: PrimitiveKind, value: &RpcValue) -> Result<Value, MarshalError> {
    match (kind, value) {
        (PrimitiveKind::Bool, RpcValue::Bool(v)) => Ok(json!(v)),
        (PrimitiveKind::I8, _)
        | (PrimitiveKind::I16, _)
        | (PrimitiveKind::I32, _)
        | (PrimitiveKind::I64, _) => {
            let wide = value.as_i64().ok_or_else(|| value_mismatch(kind, value))?;
            // Narrowing is silent truncation, matching the decode side.
            Ok(match kind {
                PrimitiveKind::I8 => json!(wide as i8),
                PrimitiveKind::I16 => json!(wide as i16),
                PrimitiveKind::I32 => json!(wide as i32),
                _ => json!(wide),
            })
        }
        (PrimitiveKind::F32, RpcValue::F32(v)) => Ok(json!(f64::from(*v))),
        (PrimitiveKind::F64, RpcValue::F64(v)) => Ok(json!(v)),
        (PrimitiveKind::F64, RpcValue::F32(v)) => Ok(json!(f64::from(*v))),
        // Characters travel as their integer code point.
        (PrimitiveKind::Char, RpcValue::Char(c)) => Ok(json!(*c as u32)),
        (PrimitiveKind::Str, RpcValue::Str(s)) => Ok(json!(s)),
        (kind, other) => Err(value_mismatch(kind, other)),
    }
}

fn decode_scalar(kind: PrimitiveKind, json: &Value) -> Result<RpcValue, MarshalError> {
    match kind {
        PrimitiveKind::Bool => json
            .as_bool()
            .map(RpcValue::Bool)
            .ok_or_else(|| mismatch(kind, json)),
        PrimitiveKind::I8 => Ok(RpcValue::I8(decode_integer(kind, json)? as i8)),
        PrimitiveKind::I16 => Ok(RpcValue::I16(decode_integer(kind, json)? as i16)),
        PrimitiveKind::I32 => Ok(RpcValue::I32(decode_integer(kind, json)? as i32)),
        PrimitiveKind::I64 => Ok(RpcValue::I64(decode_integer(kind, json)?)),
        PrimitiveKind::F32 => json
            .as_f64()
            .map(|v| RpcValue::F32(v as f32))
            .ok_or_else(|| mismatch(kind, json)),
        PrimitiveKind::F64 => json
            .as_f64()
            .map(RpcValue::F64)
            .ok_or_else(|| mismatch(kind, json)),
        PrimitiveKind::Char => {
            let point = json.as_u64().ok_or_else(|| mismatch(kind, json))?;
            u32::try_from(point)
                .ok()
                .and_then(char::from_u32)
                .map(RpcValue::Char)
                .ok_or(MarshalError::InvalidCodePoint(point))
        }
        PrimitiveKind::Str => match json {
            Value::String(s) => Ok(RpcValue::Str(s.clone())),
            other => Err(mismatch(kind, other)),
        },
    }
}

fn decode_integer(kind: PrimitiveKind, json: &Value) -> Result<i64, MarshalError> {
    match json {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| mismatch(kind, json)),
        other => Err(mismatch(kind, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    fn registry() -> RecordCodecRegistry {
        let registry = RecordCodecRegistry::new();
        registry.register_serde::<Options>("Options");
        registry
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Options {
        host: String,
        port: i32,
    }

    fn echo_method() -> MethodSchema {
        MethodSchema::new("echo")
            .param("ch", TypeDescriptor::Primitive(PrimitiveKind::Char))
            .param("name", TypeDescriptor::Primitive(PrimitiveKind::Str))
            .callback(TypeDescriptor::Primitive(PrimitiveKind::Str))
    }

    #[test]
    fn test_args_keyed_by_param_name() {
        let records = registry();
        let body = encode_args(
            &echo_method(),
            &[RpcValue::Char('Y'), RpcValue::Str("bob".into())],
            &records,
        )
        .unwrap();
        assert_eq!(body, json!({"ch": 89, "name": "bob"}));

        let args = decode_args(&echo_method(), &body, &records).unwrap();
        assert_eq!(args, vec![RpcValue::Char('Y'), RpcValue::Str("bob".into())]);
    }

    #[test]
    fn test_arity_checked_on_encode() {
        let records = registry();
        let err = encode_args(&echo_method(), &[RpcValue::Char('Y')], &records).unwrap_err();
        assert_eq!(
            err,
            MarshalError::Arity {
                method: "echo".to_string(),
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_missing_body_key_reads_as_null() {
        let records = registry();
        let method = MethodSchema::new("m").param(
            "opt",
            TypeDescriptor::Boxed(PrimitiveKind::I32),
        );
        let args = decode_args(&method, &json!({}), &records).unwrap();
        assert_eq!(args, vec![RpcValue::Null]);
    }

    #[test]
    fn test_char_code_point_round_trip() {
        let records = registry();
        let ty = TypeDescriptor::Primitive(PrimitiveKind::Char);
        let encoded = encode_value(&ty, &RpcValue::Char('λ'), &records).unwrap();
        assert_eq!(encoded, json!(0x03bb));
        assert_eq!(
            decode_value(&ty, encoded, &records).unwrap(),
            RpcValue::Char('λ')
        );
    }

    #[test]
    fn test_surrogate_code_point_rejected() {
        let records = registry();
        let ty = TypeDescriptor::Primitive(PrimitiveKind::Char);
        let err = decode_value(&ty, json!(0xd800), &records).unwrap_err();
        assert_eq!(err, MarshalError::InvalidCodePoint(0xd800));
    }

    #[test]
    fn test_null_collection_decodes_empty() {
        let records = registry();
        let list = TypeDescriptor::list(TypeDescriptor::Primitive(PrimitiveKind::Str));
        let set = TypeDescriptor::set(TypeDescriptor::Primitive(PrimitiveKind::I32));
        let map = TypeDescriptor::map(TypeDescriptor::Primitive(PrimitiveKind::I32));

        assert_eq!(
            decode_value(&list, Value::Null, &records).unwrap(),
            RpcValue::List(Vec::new())
        );
        assert_eq!(
            decode_value(&set, Value::Null, &records).unwrap(),
            RpcValue::Set(Vec::new())
        );
        assert_eq!(
            decode_value(&map, Value::Null, &records).unwrap(),
            RpcValue::Map(BTreeMap::new())
        );
    }

    #[test]
    fn test_null_rejected_for_bare_primitive() {
        let records = registry();
        let ty = TypeDescriptor::Primitive(PrimitiveKind::I32);
        assert!(decode_value(&ty, Value::Null, &records).is_err());
        assert!(encode_value(&ty, &RpcValue::Null, &records).is_err());

        let boxed = TypeDescriptor::Boxed(PrimitiveKind::I32);
        assert_eq!(
            decode_value(&boxed, Value::Null, &records).unwrap(),
            RpcValue::Null
        );
    }

    #[test]
    fn test_narrowing_truncates() {
        let records = registry();
        let ty = TypeDescriptor::Primitive(PrimitiveKind::I8);
        assert_eq!(
            decode_value(&ty, json!(300), &records).unwrap(),
            RpcValue::I8(300i64 as i8)
        );
    }

    #[test]
    fn test_record_list_preserves_null_positions() {
        let records = registry();
        let ty = TypeDescriptor::list(TypeDescriptor::record("Options"));
        let value = RpcValue::List(vec![
            RpcValue::record(
                "Options",
                Options {
                    host: "a".to_string(),
                    port: 1,
                },
            ),
            RpcValue::Null,
            RpcValue::record(
                "Options",
                Options {
                    host: "b".to_string(),
                    port: 2,
                },
            ),
        ]);

        let encoded = encode_value(&ty, &value, &records).unwrap();
        assert_eq!(
            encoded,
            json!([{"host": "a", "port": 1}, null, {"host": "b", "port": 2}])
        );
        assert_eq!(decode_value(&ty, encoded, &records).unwrap(), value);
    }

    #[test]
    fn test_enum_travels_as_symbol() {
        let records = registry();
        let ty = TypeDescriptor::Enum("SomeEnum".to_string());
        let encoded = encode_value(&ty, &RpcValue::Enum("WIBBLE".to_string()), &records).unwrap();
        assert_eq!(encoded, json!("WIBBLE"));
        assert_eq!(
            decode_value(&ty, encoded, &records).unwrap(),
            RpcValue::Enum("WIBBLE".to_string())
        );
    }

    #[test]
    fn test_service_ref_never_inline() {
        let records = registry();
        let ty = TypeDescriptor::service_ref("Connection");
        assert!(matches!(
            decode_value(&ty, json!("addr"), &records),
            Err(MarshalError::ServiceReferenceInline(_))
        ));
    }

    #[test]
    fn test_document_passes_through() {
        let records = registry();
        let doc = json!({"nested": {"array": [1, 2, 3]}});
        let value = decode_value(&TypeDescriptor::Document, doc.clone(), &records).unwrap();
        assert_eq!(value, RpcValue::Document(doc.clone()));
        assert_eq!(
            encode_value(&TypeDescriptor::Document, &value, &records).unwrap(),
            doc
        );
    }
}
