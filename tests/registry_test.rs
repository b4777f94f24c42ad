use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use graphpack::{
    deserialize, register_converter, register_decoder, register_encoder, serialize, EncoderError,
    Reader, Reflect, SchemaError, Writer,
};

// ---- generated routines ----

static FAST_DECODES: AtomicUsize = AtomicUsize::new(0);
static FAST_ENCODES: AtomicUsize = AtomicUsize::new(0);

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Fast {
    #[graphpack(index = 0)]
    n: i32,
    from_routine: bool,
}

fn encode_fast(value: &Fast, writer: &mut Writer) -> graphpack::Result<()> {
    FAST_ENCODES.fetch_add(1, Ordering::SeqCst);
    writer.write_i32(value.n);
    Ok(())
}

fn decode_fast(reader: &mut Reader) -> graphpack::Result<Fast> {
    FAST_DECODES.fetch_add(1, Ordering::SeqCst);
    Ok(Fast {
        n: reader.read_i32()?,
        from_routine: true,
    })
}

fn decode_fast_other(_reader: &mut Reader) -> graphpack::Result<Fast> {
    Err(EncoderError::Decode("second registration must not run".to_string()))
}

#[test]
fn test_generated_routines_take_priority() {
    assert!(register_encoder::<Fast>(encode_fast));
    assert!(register_decoder::<Fast>(decode_fast));
    // first registration wins
    assert!(!register_decoder::<Fast>(decode_fast_other));

    let bytes = serialize(&Fast {
        n: 5,
        from_routine: false,
    })
    .unwrap();
    // presence flag, then the routine's fixed-width body instead of a compressed integer
    assert_eq!(bytes.as_ref(), &[1, 5, 0, 0, 0]);
    assert_eq!(FAST_ENCODES.load(Ordering::SeqCst), 1);

    let decoded: Fast = deserialize(&bytes).unwrap().unwrap();
    assert_eq!(
        decoded,
        Fast {
            n: 5,
            from_routine: true,
        }
    );
    assert_eq!(FAST_DECODES.load(Ordering::SeqCst), 1);

    // absence never reaches the routine
    let absent: Option<Fast> = deserialize(&[0]).unwrap();
    assert_eq!(absent, None);
    assert_eq!(FAST_DECODES.load(Ordering::SeqCst), 1);
}

static HALF_DECODES: AtomicUsize = AtomicUsize::new(0);

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Half {
    #[graphpack(index = 0)]
    n: i64,
}

fn decode_half(reader: &mut Reader) -> graphpack::Result<Half> {
    HALF_DECODES.fetch_add(1, Ordering::SeqCst);
    let n = graphpack::codec::decode_value(reader, &graphpack::TypeDesc::I64)?;
    Ok(Half {
        n: graphpack::FromValue::from_value(n)?,
    })
}

#[test]
fn test_missing_direction_uses_generic_path() {
    assert!(register_decoder::<Half>(decode_half));

    // no encoder registered: generic compressed member
    let bytes = serialize(&Half { n: 9 }).unwrap();
    assert_eq!(bytes.as_ref(), &[1, 0, 9]);

    let decoded: Half = deserialize(&bytes).unwrap().unwrap();
    assert_eq!(decoded, Half { n: 9 });
    assert_eq!(HALF_DECODES.load(Ordering::SeqCst), 1);
}

static LATE_DECODES: AtomicUsize = AtomicUsize::new(0);

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Late {
    #[graphpack(index = 0)]
    n: u8,
}

fn decode_late(_reader: &mut Reader) -> graphpack::Result<Late> {
    LATE_DECODES.fetch_add(1, Ordering::SeqCst);
    Ok(Late::default())
}

#[test]
fn test_registration_after_first_use_keeps_cached_dispatch() {
    let bytes = serialize(&Late { n: 3 }).unwrap();
    assert!(register_decoder::<Late>(decode_late));

    let decoded: Late = deserialize(&bytes).unwrap().unwrap();
    assert_eq!(decoded, Late { n: 3 });
    assert_eq!(LATE_DECODES.load(Ordering::SeqCst), 0);
}

// ---- custom converters ----

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Job {
    #[graphpack(index = 0)]
    name: String,
    #[graphpack(index = 1, opaque)]
    timeout: Duration,
}

fn encode_duration(value: &Duration, writer: &mut Writer) -> graphpack::Result<()> {
    writer.write_u64(value.as_secs());
    writer.write_u32(value.subsec_nanos());
    Ok(())
}

fn decode_duration(reader: &mut Reader) -> graphpack::Result<Duration> {
    let secs = reader.read_u64()?;
    let nanos = reader.read_u32()?;
    Ok(Duration::new(secs, nanos))
}

#[test]
fn test_converter_handles_opaque_member() {
    register_converter::<Duration>(encode_duration, decode_duration);

    let original = Job {
        name: "backup".to_string(),
        timeout: Duration::new(90, 500),
    };
    let bytes = serialize(&original).unwrap();
    let decoded: Job = deserialize(&bytes).unwrap().unwrap();
    assert_eq!(original, decoded);

    // no presence flag in front of a converter payload
    assert_eq!(bytes.len(), 1 + 2 + 6 + 8 + 4);
}

fn encode_ip(value: &Ipv6Addr, writer: &mut Writer) -> graphpack::Result<()> {
    writer.write_raw(&value.octets());
    Ok(())
}

fn decode_ip(reader: &mut Reader) -> graphpack::Result<Ipv6Addr> {
    let raw = reader.read_raw(16)?;
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&raw);
    Ok(Ipv6Addr::from(octets))
}

#[test]
fn test_duplicate_converter_is_ignored() {
    assert!(register_converter::<Ipv6Addr>(encode_ip, decode_ip));
    assert!(!register_converter::<Ipv6Addr>(encode_ip, decode_ip));
}

#[derive(Reflect, Debug, Clone, PartialEq, Default)]
#[graphpack(serialize)]
struct Unconverted {
    #[graphpack(index = 0, opaque)]
    path: PathBuf,
}

#[test]
fn test_opaque_member_without_converter_fails() {
    let value = Unconverted {
        path: PathBuf::from("/tmp"),
    };
    assert!(matches!(
        serialize(&value),
        Err(EncoderError::Schema(SchemaError::NoConverter { .. }))
    ));
}
