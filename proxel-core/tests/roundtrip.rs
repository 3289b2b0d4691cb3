use proptest::prelude::*;
use proxel_core::{
    decode_value, encode_value, BaseErrorCodec, ErrorCodec, PrimitiveKind, RecordCodecRegistry,
    RpcValue, ServiceError, TypeDescriptor,
};
use serde_json::{Map, Value};

fn scalar_pair() -> impl Strategy<Value = (TypeDescriptor, RpcValue)> {
    use PrimitiveKind::*;
    prop_oneof![
        any::<bool>().prop_map(|v| (TypeDescriptor::Primitive(Bool), RpcValue::Bool(v))),
        any::<i8>().prop_map(|v| (TypeDescriptor::Primitive(I8), RpcValue::I8(v))),
        any::<i16>().prop_map(|v| (TypeDescriptor::Primitive(I16), RpcValue::I16(v))),
        any::<i32>().prop_map(|v| (TypeDescriptor::Primitive(I32), RpcValue::I32(v))),
        any::<i64>().prop_map(|v| (TypeDescriptor::Primitive(I64), RpcValue::I64(v))),
        (-1.0e9f64..1.0e9).prop_map(|v| (TypeDescriptor::Primitive(F64), RpcValue::F64(v))),
        any::<char>().prop_map(|v| (TypeDescriptor::Primitive(Char), RpcValue::Char(v))),
        ".{0,32}".prop_map(|v| (TypeDescriptor::Primitive(Str), RpcValue::Str(v))),
    ]
}

proptest! {
    #[test]
    fn prop_scalars_survive_the_wire((ty, value) in scalar_pair()) {
        let records = RecordCodecRegistry::new();
        let encoded = encode_value(&ty, &value, &records).unwrap();
        prop_assert_eq!(decode_value(&ty, encoded, &records).unwrap(), value);
    }

    #[test]
    fn prop_set_decoding_ignores_element_order(items in prop::collection::vec(any::<i32>(), 0..16)) {
        let records = RecordCodecRegistry::new();
        let ty = TypeDescriptor::set(TypeDescriptor::Primitive(PrimitiveKind::I32));
        let value = RpcValue::Set(items.iter().copied().map(RpcValue::I32).collect());

        let encoded = encode_value(&ty, &value, &records).unwrap();
        let reversed = match encoded {
            Value::Array(mut elements) => {
                elements.reverse();
                Value::Array(elements)
            }
            other => other,
        };
        prop_assert_eq!(decode_value(&ty, reversed, &records).unwrap(), value);
    }

    #[test]
    fn prop_failure_frames_survive_the_wire(
        failure_code in any::<i32>(),
        message in prop::option::of(".{0,64}"),
        entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..5),
    ) {
        let mut debug = Map::new();
        for (key, v) in entries {
            debug.insert(key, Value::from(v));
        }
        let error = ServiceError {
            failure_code,
            message,
            debug_info: Value::Object(debug),
        };

        let payload = BaseErrorCodec.encode(&error).unwrap();
        prop_assert_eq!(BaseErrorCodec.decode(&payload).unwrap(), error);
    }
}
