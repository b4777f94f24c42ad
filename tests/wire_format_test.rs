use std::collections::HashMap;

use bytes::Bytes;
use graphpack::compact::{self, CompressType};
use graphpack::{
    decode_object, deserialize, encode_object, serialize, EncoderError, Reader, Reflect, Writer,
};

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Scenario {
    #[graphpack(index = 0)]
    a: i32,
    #[graphpack(index = 1)]
    b: Vec<i32>,
    #[graphpack(index = 2)]
    c: HashMap<String, i32>,
}

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Gapped {
    #[graphpack(index = 5)]
    last: i32,
    #[graphpack(index = 0)]
    first: i32,
    #[graphpack(index = 2)]
    middle: i32,
    not_serialized: i32,
}

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Widths {
    #[graphpack(index = 0)]
    raw_short: i16,
    #[graphpack(index = 1)]
    long: i64,
    #[graphpack(index = 2)]
    ulong: u64,
}

#[test]
fn test_concrete_scenario() {
    let mut c = HashMap::new();
    c.insert("x".to_string(), 1);
    let original = Scenario {
        a: 300_000_000,
        b: vec![1, 2, 3],
        c,
    };

    let bytes = serialize(&original).unwrap();
    #[rustfmt::skip]
    let expected: &[u8] = &[
        1,                          // present
        5, 0x00, 0xA3, 0xE1, 0x11,  // a: UInt32 tag, 300_000_000 LE
        0, 3, 0, 1, 0, 2, 0, 3,     // b: length 3, then three Byte-tagged elements
        0, 1, 0, 1, b'x', 0, 1,     // c: one entry, key "x", value 1
    ];
    assert_eq!(bytes.as_ref(), expected);
    // no 64-bit tag for `a`
    assert_eq!(bytes[1], CompressType::UInt32 as u8);

    let decoded: Scenario = deserialize(&bytes).unwrap().unwrap();
    assert_eq!(original, decoded);
}

#[test]
fn test_absent_value_consumes_only_the_flag() {
    let mut writer = Writer::new();
    encode_object::<Scenario>(None, &mut writer).unwrap();
    assert_eq!(writer.as_slice(), &[0]);

    // a trailing byte belongs to whatever follows
    let mut reader = Reader::new(Bytes::from_static(&[0, 42]));
    let decoded = decode_object::<Scenario>(&mut reader).unwrap();
    assert_eq!(decoded, None);
    assert_eq!(reader.remaining(), 1);
}

#[test]
fn test_index_gaps_are_skipped() {
    let original = Gapped {
        last: 3,
        first: 1,
        middle: 2,
        not_serialized: 99,
    };
    let bytes = serialize(&original).unwrap();
    // members in ascending index order, nothing for indices 1, 3 and 4
    assert_eq!(bytes.as_ref(), &[1, 0, 1, 0, 2, 0, 3]);

    let decoded: Gapped = deserialize(&bytes).unwrap().unwrap();
    assert_eq!(
        decoded,
        Gapped {
            not_serialized: 0,
            ..original
        }
    );

    let schema = graphpack::resolve::<Gapped>().unwrap();
    assert_eq!(schema.min_index(), 0);
    assert_eq!(schema.max_index(), 5);
    let indices: Vec<u16> = schema.member_types().map(|(index, _)| index).collect();
    assert_eq!(indices, vec![0, 2, 5]);
}

#[test]
fn test_integer_width_selection() {
    let value = Widths {
        raw_short: 1,
        long: -129,
        ulong: 65_536,
    };
    let bytes = serialize(&value).unwrap();
    #[rustfmt::skip]
    let expected: &[u8] = &[
        1,
        1, 0,                   // i16 is written raw
        2, 0x7F, 0xFF,          // -129 needs Int16
        5, 0x00, 0x00, 0x01, 0x00, // 65_536 needs UInt32
    ];
    assert_eq!(bytes.as_ref(), expected);
    assert_eq!(deserialize::<Widths>(&bytes).unwrap().unwrap(), value);
}

#[test]
fn test_wide_tags_decode_into_narrow_values() {
    // a writer is free to use a wider tag than necessary
    let mut writer = Writer::new();
    writer.write_bool(true);
    writer.write_i16(4);
    writer.write_compress_type(CompressType::Int64);
    writer.write_i64(7);
    writer.write_compress_type(CompressType::UInt64);
    writer.write_u64(8);

    let decoded: Widths = deserialize(writer.as_slice()).unwrap().unwrap();
    assert_eq!(
        decoded,
        Widths {
            raw_short: 4,
            long: 7,
            ulong: 8,
        }
    );
}

#[test]
fn test_unknown_tag_is_rejected() {
    let bytes = [1u8, 0, 0, 9, 1];
    assert!(matches!(
        deserialize::<Widths>(&bytes),
        Err(EncoderError::UnsupportedTag(9))
    ));
}

#[test]
fn test_unrepresentable_value_is_a_coercion_error() {
    // i64 member on the wire, decoded as Scenario whose index 0 is an i32
    let big = Widths {
        raw_short: 0,
        long: -5_000_000_000,
        ulong: 0,
    };
    let mut writer = Writer::new();
    writer.write_bool(true);
    compact::write_integer(&mut writer, i128::from(big.long), graphpack::IntKind::I64).unwrap();

    assert!(matches!(
        deserialize::<Scenario>(writer.as_slice()),
        Err(EncoderError::Coercion { .. })
    ));
}

#[test]
fn test_truncated_member_is_insufficient_data() {
    // UInt32 tag with only two payload bytes
    let bytes = [1u8, 5, 0x00, 0xA3];
    assert!(matches!(
        deserialize::<Scenario>(&bytes),
        Err(EncoderError::InsufficientData)
    ));
}
