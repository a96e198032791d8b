//! DSDL encoding and decoding: [`Value`]s in, bit-packed payloads out, and back.
//!
//! [Relevant section of DroneCAN specification](https://dronecan.github.io/Specification/3._Data_structure_description_language/)
//!
//! Rules that aren't obvious from the type model:
//! - Out-of-range numbers never fail; they saturate or wrap per the field's cast mode.
//! - A dynamic array in tail position (the last field of the outermost composite, followed
//!   down through nested composites and union members) drops its length prefix if its
//!   elements are at least a byte wide. Its length is recovered from the payload length.
//! - Void fields encode as zero bits and are skipped on decode.

use num_traits::{float::FloatCore, ToPrimitive};

use crate::{
    bitstream::{BitReader, BitWriter},
    dsdl::{ArrayMode, ArrayType, CastMode, CompositeType, DsdlType, PrimitiveKind, PrimitiveType},
    error::CodecError,
    f16,
    value::{DsdlObject, Record, Value},
};

/// Encode a composite value as a complete transfer payload.
pub fn encode(record: &Record, ty: &CompositeType) -> Result<Vec<u8>, CodecError> {
    let mut writer = BitWriter::with_capacity(ty.max_bit_len());
    encode_into(&mut writer, record, ty)?;
    Ok(writer.into_bytes())
}

/// Encode a composite value as a complete transfer payload, into an existing stream.
pub fn encode_into(writer: &mut BitWriter, record: &Record, ty: &CompositeType) -> Result<(), CodecError> {
    encode_composite(writer, record, ty, true)
}

pub fn encode_object<T: DsdlObject>(obj: &T, ty: &CompositeType) -> Result<Vec<u8>, CodecError> {
    encode(&obj.to_record(), ty)
}

/// Decode a complete transfer payload into a generic record.
pub fn decode(payload: &[u8], ty: &CompositeType) -> Result<Record, CodecError> {
    let mut reader = BitReader::new(payload);
    decode_from(&mut reader, ty)
}

/// Decode a complete transfer payload from a stream positioned at its start.
pub fn decode_from(reader: &mut BitReader, ty: &CompositeType) -> Result<Record, CodecError> {
    decode_composite(reader, ty, true)
}

pub fn decode_object<T: DsdlObject>(payload: &[u8], ty: &CompositeType) -> Result<T, CodecError> {
    T::from_record(&decode(payload, ty)?)
}

/// Encode one value of any type. `tail` marks a value that ends the payload; `name` is
/// used in errors.
pub fn encode_value(
    writer: &mut BitWriter,
    value: &Value,
    ty: &DsdlType,
    name: &str,
    tail: bool,
) -> Result<(), CodecError> {
    match ty {
        DsdlType::Void(bit_len) => {
            writer.write_zeros(*bit_len as usize);
            Ok(())
        }
        DsdlType::Primitive(p) => encode_primitive(writer, value, p, name),
        DsdlType::Array(a) => encode_array(writer, value, a, name, tail),
        DsdlType::Composite(c) => {
            let record = value
                .as_record()
                .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))?;
            encode_composite(writer, record, c, tail)
        }
    }
}

/// Decode one value of any type. Void padding is skipped and reads back as zero.
pub fn decode_value(reader: &mut BitReader, ty: &DsdlType, tail: bool) -> Result<Value, CodecError> {
    match ty {
        DsdlType::Void(bit_len) => {
            reader.skip(*bit_len as usize)?;
            Ok(Value::UInt(0))
        }
        DsdlType::Primitive(p) => decode_primitive(reader, p),
        DsdlType::Array(a) => decode_array(reader, a, tail),
        DsdlType::Composite(c) => Ok(Value::Record(decode_composite(reader, c, tail)?)),
    }
}

fn encode_composite(
    writer: &mut BitWriter,
    record: &Record,
    ty: &CompositeType,
    tail: bool,
) -> Result<(), CodecError> {
    if ty.is_union() {
        let invalid = || CodecError::InvalidUnion(ty.full_name().to_owned());

        let (name, value) = record.active().ok_or_else(invalid)?;
        let index = ty.field_index(name).ok_or_else(invalid)?;

        writer.write_u64(index as u64, ty.union_tag_bits());
        return encode_value(writer, value, ty.fields()[index].ty(), name, tail);
    }

    let last = ty.fields().len().saturating_sub(1);
    for (i, field) in ty.fields().iter().enumerate() {
        if field.is_void() {
            encode_value(writer, &Value::UInt(0), field.ty(), "", false)?;
            continue;
        }
        let value = record.field(field.name())?;
        encode_value(writer, value, field.ty(), field.name(), tail && i == last)?;
    }

    Ok(())
}

fn decode_composite(reader: &mut BitReader, ty: &CompositeType, tail: bool) -> Result<Record, CodecError> {
    let mut result = Record::new();

    if ty.is_union() {
        let tag = reader.read_u64(ty.union_tag_bits())?;
        let field = ty
            .fields()
            .get(tag as usize)
            .ok_or_else(|| CodecError::InvalidUnionTag {
                union: ty.full_name().to_owned(),
                tag,
            })?;

        result.insert(field.name(), decode_value(reader, field.ty(), tail)?);
        return Ok(result);
    }

    let last = ty.fields().len().saturating_sub(1);
    for (i, field) in ty.fields().iter().enumerate() {
        let value = decode_value(reader, field.ty(), tail && i == last)?;
        if !field.is_void() {
            result.insert(field.name(), value);
        }
    }

    Ok(result)
}

fn encode_array(
    writer: &mut BitWriter,
    value: &Value,
    ty: &ArrayType,
    name: &str,
    tail: bool,
) -> Result<(), CodecError> {
    let items = value
        .as_array()
        .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))?;

    match ty.mode() {
        ArrayMode::Static => {
            if items.len() != ty.max_size() {
                return Err(CodecError::ArrayLength {
                    field: name.to_owned(),
                    expected: ty.max_size(),
                    actual: items.len(),
                });
            }
        }
        ArrayMode::Dynamic => {
            if items.len() > ty.max_size() {
                return Err(CodecError::ArrayTooLong {
                    field: name.to_owned(),
                    len: items.len(),
                    max: ty.max_size(),
                });
            }

            let prefix_bits = ty.length_prefix_bits();
            if !(tail && ty.allows_tail_optimization()) && prefix_bits > 0 {
                writer.write_u64(items.len() as u64, prefix_bits);
            }
        }
    }

    // Elements are never in tail position.
    for item in items {
        encode_value(writer, item, ty.element(), name, false)?;
    }

    Ok(())
}

fn decode_array(reader: &mut BitReader, ty: &ArrayType, tail: bool) -> Result<Value, CodecError> {
    let mut items = Vec::new();

    match ty.mode() {
        ArrayMode::Static => {
            for _ in 0..ty.max_size() {
                items.push(decode_value(reader, ty.element(), false)?);
            }
        }
        ArrayMode::Dynamic if tail && ty.allows_tail_optimization() => {
            // Whatever is left is array, save for the padding of the last byte.
            while reader.remaining() >= 8 && items.len() < ty.max_size() {
                items.push(decode_value(reader, ty.element(), false)?);
            }
        }
        ArrayMode::Dynamic => {
            let prefix_bits = ty.length_prefix_bits();
            let len = if prefix_bits > 0 {
                reader.read_u64(prefix_bits)?
            } else {
                0
            };

            if len > ty.max_size() as u64 {
                return Err(CodecError::InvalidArrayLength {
                    len,
                    max: ty.max_size(),
                });
            }

            for _ in 0..len {
                items.push(decode_value(reader, ty.element(), false)?);
            }
        }
    }

    Ok(Value::Array(items))
}

fn encode_primitive(
    writer: &mut BitWriter,
    value: &Value,
    ty: &PrimitiveType,
    name: &str,
) -> Result<(), CodecError> {
    let mismatch = || CodecError::TypeMismatch(name.to_owned());

    let bits = match ty.kind() {
        PrimitiveKind::Boolean => value.as_bool().ok_or_else(mismatch)? as u64,
        PrimitiveKind::UnsignedInt | PrimitiveKind::SignedInt => {
            let raw = match value {
                Value::Bool(v) => *v as i128,
                Value::Int(v) => *v as i128,
                Value::UInt(v) => *v as i128,
                Value::Float(v) => float_to_integer(*v),
                _ => return Err(mismatch()),
            };
            cast_integer(raw, ty)
        }
        PrimitiveKind::Float => {
            let raw = value.as_f64().ok_or_else(mismatch)?;
            cast_float(raw, ty)
        }
    };

    writer.write_u64(bits, ty.bit_len());
    Ok(())
}

fn decode_primitive(reader: &mut BitReader, ty: &PrimitiveType) -> Result<Value, CodecError> {
    let bit_len = ty.bit_len();
    let raw = reader.read_u64(bit_len)?;

    Ok(match ty.kind() {
        PrimitiveKind::Boolean => Value::Bool(raw != 0),
        PrimitiveKind::UnsignedInt => Value::UInt(raw),
        PrimitiveKind::SignedInt => Value::Int(sign_extend(raw, bit_len)),
        PrimitiveKind::Float => Value::Float(match bit_len {
            16 => f16::from_bits(raw as u16).to_f32() as f64,
            32 => f32::from_bits(raw as u32) as f64,
            _ => f64::from_bits(raw),
        }),
    })
}

/// Round to nearest, ties away from zero. NaN becomes 0; magnitudes past `i128` clamp, which
/// is far outside any field's range.
fn float_to_integer(v: f64) -> i128 {
    if v.is_nan() {
        return 0;
    }
    FloatCore::round(v).to_i128().unwrap_or(if v > 0. {
        i128::MAX
    } else {
        i128::MIN
    })
}

/// Bit pattern of an integer under the field's cast mode.
fn cast_integer(raw: i128, ty: &PrimitiveType) -> u64 {
    let (min, max) = ty.int_range();

    let v = match ty.cast_mode() {
        CastMode::Saturated => raw.clamp(min, max),
        CastMode::Truncated => raw,
    };

    let mask = if ty.bit_len() == 64 {
        u64::MAX as u128
    } else {
        (1u128 << ty.bit_len()) - 1
    };
    ((v as u128) & mask) as u64
}

/// Bit pattern of a float. Saturation only affects finite values; NaN and the infinities
/// pass through either way.
fn cast_float(raw: f64, ty: &PrimitiveType) -> u64 {
    let v = match ty.cast_mode() {
        CastMode::Saturated if raw.is_finite() => {
            let max = ty.float_max();
            raw.clamp(-max, max)
        }
        _ => raw,
    };

    match ty.bit_len() {
        16 => f16::from_f32(v as f32).to_bits() as u64,
        32 => (v as f32).to_bits() as u64,
        _ => v.to_bits(),
    }
}

fn sign_extend(raw: u64, bit_len: u8) -> i64 {
    let shift = 64 - bit_len as u32;
    ((raw << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsdl::Field;
    use proptest::prelude::*;

    fn uint(bits: u8) -> DsdlType {
        DsdlType::uint(bits, CastMode::Saturated).unwrap()
    }

    fn single(ty: DsdlType) -> CompositeType {
        CompositeType::structure("test.Single", vec![Field::new("v", ty)]).unwrap()
    }

    fn encode_single(ty: DsdlType, value: impl Into<Value>) -> Vec<u8> {
        encode(&Record::new().with("v", value), &single(ty)).unwrap()
    }

    fn node_status() -> CompositeType {
        CompositeType::structure(
            "uavcan.protocol.NodeStatus",
            vec![
                Field::new("uptime_sec", uint(32)),
                Field::new("health", uint(2)),
                Field::new("mode", uint(3)),
                Field::new("sub_mode", uint(3)),
                Field::new("vendor_specific_status_code", uint(16)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_node_status_layout() {
        let record = Record::new()
            .with("uptime_sec", 0x0102_0304u32)
            .with("health", 2u8)
            .with("mode", 1u8)
            .with("sub_mode", 0u8)
            .with("vendor_specific_status_code", 0xBEEFu16);

        let bytes = encode(&record, &node_status()).unwrap();
        assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, (2 << 6) | (1 << 3), 0xEF, 0xBE]);

        assert_eq!(decode(&bytes, &node_status()).unwrap(), record);
    }

    #[test]
    fn test_saturation() {
        let sat = DsdlType::uint(4, CastMode::Saturated).unwrap();
        assert_eq!(encode_single(sat.clone(), 200u8), encode_single(sat.clone(), 15u8));
        assert_eq!(encode_single(sat.clone(), -5i8), encode_single(sat, 0u8));

        let sat = DsdlType::int(8, CastMode::Saturated).unwrap();
        assert_eq!(encode_single(sat.clone(), 1000i32), vec![0x7F]);
        assert_eq!(encode_single(sat, -1000i32), vec![0x80]);
    }

    #[test]
    fn test_truncation() {
        let trunc = DsdlType::uint(8, CastMode::Truncated).unwrap();
        assert_eq!(encode_single(trunc.clone(), 0x1FFu16), vec![0xFF]);
        assert_eq!(encode_single(trunc, -1i8), vec![0xFF]);

        let trunc = DsdlType::int(4, CastMode::Truncated).unwrap();
        // 9 wraps to -7 in 4 bits.
        let bytes = encode_single(trunc.clone(), 9u8);
        assert_eq!(bytes, vec![0b1001_0000]);
        assert_eq!(decode(&bytes, &single(trunc)).unwrap().i64("v"), Ok(-7));
    }

    #[test]
    fn test_sign_extension() {
        let ty = single(DsdlType::int(13, CastMode::Saturated).unwrap());
        for v in [-4096i64, -1, 0, 1, 4095] {
            let bytes = encode(&Record::new().with("v", v), &ty).unwrap();
            assert_eq!(decode(&bytes, &ty).unwrap().i64("v"), Ok(v));
        }
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_float_into_int_field() {
        let ty = uint(8);
        assert_eq!(encode_single(ty.clone(), 2.5f32), vec![3]);
        assert_eq!(encode_single(ty.clone(), 1e12f64), vec![0xFF]);
        assert_eq!(encode_single(ty, f64::NAN), vec![0]);
    }

    #[test]
    fn test_float16() {
        let ty = DsdlType::float(16, CastMode::Saturated).unwrap();
        let bytes = encode_single(ty.clone(), 1.5f32);
        assert_eq!(bytes, 0x3E00u16.to_le_bytes().to_vec());
        assert_eq!(decode(&bytes, &single(ty.clone())).unwrap().f64("v"), Ok(1.5));

        // Saturated: clamp to the largest finite half.
        assert_eq!(encode_single(ty.clone(), 1e6f32), 0x7BFFu16.to_le_bytes().to_vec());
        // Infinity passes through.
        assert_eq!(encode_single(ty, f32::INFINITY), 0x7C00u16.to_le_bytes().to_vec());

        let trunc = DsdlType::float(16, CastMode::Truncated).unwrap();
        assert_eq!(encode_single(trunc, 1e6f32), 0x7C00u16.to_le_bytes().to_vec());
    }

    #[test]
    fn test_float32_saturation() {
        let ty = DsdlType::float(32, CastMode::Saturated).unwrap();
        assert_eq!(encode_single(ty, 1e300f64), f32::MAX.to_le_bytes().to_vec());
    }

    #[test]
    fn test_void_padding() {
        let ty = CompositeType::structure(
            "test.Padded",
            vec![
                Field::new("a", DsdlType::boolean()),
                Field::void(6).unwrap(),
                Field::new("b", DsdlType::boolean()),
            ],
        )
        .unwrap();

        let record = Record::new().with("a", true).with("b", true);
        let bytes = encode(&record, &ty).unwrap();
        assert_eq!(bytes, vec![0b1000_0001]);
        assert_eq!(decode(&bytes, &ty).unwrap(), record);
    }

    #[test]
    fn test_tail_array_optimization() {
        let ty = CompositeType::structure(
            "test.Named",
            vec![
                Field::new("id", uint(8)),
                Field::new("name", DsdlType::dynamic_array(uint(8), 80).unwrap()),
            ],
        )
        .unwrap();

        let record = Record::new().with("id", 7u8).with("name", Value::string("gps"));
        let bytes = encode(&record, &ty).unwrap();
        // No length prefix.
        assert_eq!(bytes, b"\x07gps".to_vec());
        assert_eq!(decode(&bytes, &ty).unwrap(), record);
    }

    #[test]
    fn test_no_tail_optimization_mid_payload() {
        let ty = CompositeType::structure(
            "test.Named",
            vec![
                Field::new("name", DsdlType::dynamic_array(uint(8), 80).unwrap()),
                Field::new("id", uint(8)),
            ],
        )
        .unwrap();

        let record = Record::new().with("name", Value::string("ab")).with("id", 1u8);
        let bytes = encode(&record, &ty).unwrap();
        // 7-bit prefix, then 'a', 'b', 1.
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0] >> 1, 2);
        assert_eq!(decode(&bytes, &ty).unwrap(), record);
    }

    #[test]
    fn test_small_elements_keep_prefix() {
        let ty = single(DsdlType::dynamic_array(uint(4), 3).unwrap());
        let record = Record::new().with("v", vec![Value::UInt(1), Value::UInt(2)]);
        let bytes = encode(&record, &ty).unwrap();
        // 2-bit prefix + 2 * 4 bits.
        assert_eq!(bytes, vec![0b1000_0100, 0b1000_0000]);
        assert_eq!(decode(&bytes, &ty).unwrap(), record);
    }

    #[test]
    fn test_tail_optimization_through_nested_composite() {
        let inner = CompositeType::structure(
            "test.Inner",
            vec![Field::new("data", DsdlType::dynamic_array(uint(8), 10).unwrap())],
        )
        .unwrap();
        let outer = CompositeType::structure(
            "test.Outer",
            vec![
                Field::new("first", inner.clone().into()),
                Field::new("last", inner.into()),
            ],
        )
        .unwrap();

        let record = Record::new()
            .with("first", Record::new().with("data", Value::bytes(&[1, 2])))
            .with("last", Record::new().with("data", Value::bytes(&[3, 4, 5])));

        let bytes = encode(&record, &outer).unwrap();
        // First array keeps its 4-bit prefix; the last one doesn't have one.
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode(&bytes, &outer).unwrap(), record);
    }

    fn value_union() -> CompositeType {
        CompositeType::union(
            "test.Value",
            vec![
                Field::new("empty", CompositeType::structure("test.Empty", vec![]).unwrap().into()),
                Field::new("integer_value", DsdlType::int(64, CastMode::Saturated).unwrap()),
                Field::new("boolean_value", uint(8)),
                Field::new("string_value", DsdlType::dynamic_array(uint(8), 128).unwrap()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_union() {
        let ty = value_union();

        let bytes = encode(&Record::new().with("boolean_value", 1u8), &ty).unwrap();
        // 2-bit tag of 2, then the byte.
        assert_eq!(bytes, vec![0b1000_0000, 0b0100_0000]);
        assert_eq!(decode(&bytes, &ty).unwrap().u64("boolean_value"), Ok(1));

        let s = Record::new().with("string_value", Value::string("hi"));
        let bytes = encode(&s, &ty).unwrap();
        assert_eq!(bytes.len(), 3);
        assert_eq!(decode(&bytes, &ty).unwrap(), s);

        let empty = Record::new().with("empty", Record::new());
        assert_eq!(encode(&empty, &ty).unwrap(), vec![0]);
    }

    #[test]
    fn test_union_needs_one_field() {
        let ty = value_union();
        let two = Record::new().with("boolean_value", 1u8).with("integer_value", 2i64);
        assert_eq!(
            encode(&two, &ty),
            Err(CodecError::InvalidUnion("test.Value".into()))
        );
        let unknown = Record::new().with("nope", 1u8);
        assert_eq!(
            encode(&unknown, &ty),
            Err(CodecError::InvalidUnion("test.Value".into()))
        );
    }

    #[test]
    fn test_invalid_union_tag() {
        let ty = CompositeType::union(
            "test.Three",
            vec![
                Field::new("a", uint(8)),
                Field::new("b", uint(8)),
                Field::new("c", uint(8)),
            ],
        )
        .unwrap();
        let err = decode(&[0b1100_0000, 0], &ty).unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidUnionTag {
                union: "test.Three".into(),
                tag: 3
            }
        );
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_encode_preconditions() {
        let ty = node_status();
        assert_eq!(
            encode(&Record::new().with("uptime_sec", 1u32), &ty),
            Err(CodecError::MissingField("health".into()))
        );

        let arr = single(DsdlType::static_array(uint(8), 3).unwrap());
        assert_eq!(
            encode(&Record::new().with("v", Value::bytes(&[1, 2])), &arr),
            Err(CodecError::ArrayLength {
                field: "v".into(),
                expected: 3,
                actual: 2
            })
        );

        let arr = single(DsdlType::dynamic_array(uint(8), 2).unwrap());
        assert_eq!(
            encode(&Record::new().with("v", Value::bytes(&[1, 2, 3])), &arr),
            Err(CodecError::ArrayTooLong {
                field: "v".into(),
                len: 3,
                max: 2
            })
        );

        assert_eq!(
            encode(&Record::new().with("v", true), &arr),
            Err(CodecError::TypeMismatch("v".into()))
        );
    }

    #[test]
    fn test_truncated_payload() {
        let err = decode(&[1, 2, 3], &node_status()).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedPayload { .. }));
    }

    #[test]
    fn test_invalid_array_length() {
        let ty = CompositeType::structure(
            "test.Prefixed",
            vec![
                Field::new("v", DsdlType::dynamic_array(uint(8), 4).unwrap()),
                Field::new("x", uint(8)),
            ],
        )
        .unwrap();
        // 3-bit prefix of 7.
        assert_eq!(
            decode(&[0b1110_0000, 0, 0], &ty),
            Err(CodecError::InvalidArrayLength { len: 7, max: 4 })
        );
    }

    #[test]
    fn test_fixed_size_bit_length() {
        let ty = CompositeType::structure(
            "test.Fixed",
            vec![
                Field::new("a", uint(3)),
                Field::new("b", DsdlType::static_array(DsdlType::int(5, CastMode::Saturated).unwrap(), 3).unwrap()),
                Field::new("c", DsdlType::float(16, CastMode::Saturated).unwrap()),
            ],
        )
        .unwrap();

        let mut writer = BitWriter::new();
        let record = Record::new()
            .with("a", 1u8)
            .with("b", vec![Value::Int(-1), Value::Int(2), Value::Int(3)])
            .with("c", 0.5f32);
        encode_into(&mut writer, &record, &ty).unwrap();
        assert_eq!(writer.bit_len(), ty.max_bit_len());
    }

    proptest! {
        #[test]
        fn prop_int_round_trip(bits in 2u8..=64, raw in any::<i64>()) {
            let ty = DsdlType::int(bits, CastMode::Saturated).unwrap();
            let (min, max) = match &ty {
                DsdlType::Primitive(p) => p.int_range(),
                _ => unreachable!(),
            };
            let v = (raw as i128).clamp(min, max) as i64;

            let schema = single(ty);
            let bytes = encode(&Record::new().with("v", v), &schema).unwrap();
            prop_assert_eq!(bytes.len(), (bits as usize + 7) / 8);
            prop_assert_eq!(decode(&bytes, &schema).unwrap().i64("v"), Ok(v));
        }

        #[test]
        fn prop_uint_round_trip(bits in 2u8..=64, raw in any::<u64>()) {
            let v = if bits == 64 { raw } else { raw & ((1 << bits) - 1) };
            let schema = single(uint(bits));
            let bytes = encode(&Record::new().with("v", v), &schema).unwrap();
            prop_assert_eq!(decode(&bytes, &schema).unwrap().u64("v"), Ok(v));
        }

        #[test]
        fn prop_dynamic_array_bit_length(data in proptest::collection::vec(any::<u8>(), 0..=20)) {
            let schema = CompositeType::structure(
                "test.Arr",
                vec![
                    Field::new("v", DsdlType::dynamic_array(uint(8), 20).unwrap()),
                    Field::new("x", DsdlType::boolean()),
                ],
            ).unwrap();
            let record = Record::new().with("v", Value::bytes(&data)).with("x", true);

            let mut writer = BitWriter::new();
            encode_into(&mut writer, &record, &schema).unwrap();
            prop_assert!(writer.bit_len() >= schema.min_bit_len());
            prop_assert!(writer.bit_len() <= schema.max_bit_len());
            prop_assert_eq!(decode(&writer.into_bytes(), &schema).unwrap(), record);
        }

        #[test]
        fn prop_float16_round_trip(bits in any::<u16>().prop_filter("NaN", |b| b & 0x7C00 != 0x7C00 || b & 0x03FF == 0)) {
            let v = f16::from_bits(bits).to_f32() as f64;
            let schema = single(DsdlType::float(16, CastMode::Saturated).unwrap());
            let bytes = encode(&Record::new().with("v", v), &schema).unwrap();
            prop_assert_eq!(&bytes[..], &bits.to_le_bytes()[..]);
            prop_assert_eq!(decode(&bytes, &schema).unwrap().f64("v").map(f64::to_bits), Ok(v.to_bits()));
        }

        #[test]
        fn prop_float32_round_trip(
            v in proptest::num::f32::NORMAL | proptest::num::f32::SUBNORMAL | proptest::num::f32::ZERO | proptest::num::f32::INFINITE
        ) {
            let schema = single(DsdlType::float(32, CastMode::Saturated).unwrap());
            let bytes = encode(&Record::new().with("v", v), &schema).unwrap();
            prop_assert_eq!(bytes.len(), 4);
            let decoded = decode(&bytes, &schema).unwrap().f64("v").unwrap();
            prop_assert_eq!((decoded as f32).to_bits(), v.to_bits());
        }

        #[test]
        fn prop_float64_round_trip(
            v in proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL | proptest::num::f64::ZERO | proptest::num::f64::INFINITE
        ) {
            let schema = single(DsdlType::float(64, CastMode::Saturated).unwrap());
            let bytes = encode(&Record::new().with("v", v), &schema).unwrap();
            prop_assert_eq!(bytes.len(), 8);
            prop_assert_eq!(decode(&bytes, &schema).unwrap().f64("v").map(f64::to_bits), Ok(v.to_bits()));
        }

        #[test]
        fn prop_nested_union_round_trip(
            x in proptest::num::f32::NORMAL | proptest::num::f32::ZERO,
            n in -2048i64..2048,
            variant in prop_oneof![
                Just(Value::union("empty", Record::new())),
                any::<i64>().prop_map(|v| Value::union("integer_value", v)),
                any::<u8>().prop_map(|v| Value::union("boolean_value", v)),
                proptest::collection::vec(any::<u8>(), 0..=128)
                    .prop_map(|s| Value::union("string_value", Value::bytes(&s))),
            ],
            tail in proptest::collection::vec(any::<u8>(), 0..=16),
        ) {
            let header = CompositeType::structure(
                "test.Header",
                vec![
                    Field::new("x", DsdlType::float(32, CastMode::Saturated).unwrap()),
                    Field::new("n", DsdlType::int(12, CastMode::Saturated).unwrap()),
                ],
            ).unwrap();
            let schema = CompositeType::structure(
                "test.Outer",
                vec![
                    Field::new("header", header.into()),
                    Field::new("value", value_union().into()),
                    Field::new("tail", DsdlType::dynamic_array(uint(8), 16).unwrap()),
                ],
            ).unwrap();
            let record = Record::new()
                .with("header", Record::new().with("x", x).with("n", n))
                .with("value", variant)
                .with("tail", Value::bytes(&tail));

            let mut writer = BitWriter::new();
            encode_into(&mut writer, &record, &schema).unwrap();
            prop_assert!(writer.bit_len() >= schema.min_bit_len());
            prop_assert!(writer.bit_len() <= schema.max_bit_len());
            prop_assert_eq!(decode(&writer.into_bytes(), &schema).unwrap(), record);
        }
    }
}
