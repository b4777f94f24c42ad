#![allow(unused_imports)]

use graphpack::{deserialize, register_builtin_converters, serialize, Reflect};

#[cfg(feature = "chrono")]
mod chrono_types {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};

    #[derive(Reflect, Debug, Clone, PartialEq, Default)]
    #[graphpack(serialize)]
    struct Event {
        #[graphpack(index = 0, opaque)]
        at: DateTime<Utc>,
        #[graphpack(index = 1, opaque)]
        day: NaiveDate,
    }

    #[test]
    fn test_chrono_roundtrip() {
        register_builtin_converters();
        let original = Event {
            at: DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap(),
            day: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        };
        let bytes = serialize(&original).unwrap();
        let decoded: Event = deserialize(&bytes).unwrap().unwrap();
        assert_eq!(original, decoded);
    }
}

#[cfg(feature = "uuid")]
mod uuid_types {
    use super::*;
    use uuid::Uuid;

    #[derive(Reflect, Debug, Clone, PartialEq, Default)]
    #[graphpack(serialize)]
    struct Entity {
        #[graphpack(index = 0, opaque)]
        id: Uuid,
    }

    #[test]
    fn test_uuid_roundtrip() {
        register_builtin_converters();
        let original = Entity { id: Uuid::new_v4() };
        let bytes = serialize(&original).unwrap();
        // presence flag plus sixteen raw bytes
        assert_eq!(bytes.len(), 17);
        let decoded: Entity = deserialize(&bytes).unwrap().unwrap();
        assert_eq!(original, decoded);
    }
}

#[cfg(feature = "ulid")]
mod ulid_types {
    use super::*;
    use ulid::Ulid;

    #[derive(Reflect, Debug, Clone, PartialEq, Default)]
    #[graphpack(serialize)]
    struct Ticket {
        #[graphpack(index = 0, opaque)]
        id: Ulid,
    }

    #[test]
    fn test_ulid_roundtrip() {
        register_builtin_converters();
        let original = Ticket {
            id: Ulid::from_parts(1_700_000_000_000, 42),
        };
        let bytes = serialize(&original).unwrap();
        let decoded: Ticket = deserialize(&bytes).unwrap().unwrap();
        assert_eq!(original, decoded);
    }
}

#[cfg(feature = "smol_str")]
mod smol_str_types {
    use super::*;
    use smol_str::SmolStr;

    #[derive(Reflect, Debug, Clone, PartialEq, Default)]
    #[graphpack(serialize)]
    struct Named {
        #[graphpack(index = 0)]
        name: SmolStr,
        #[graphpack(index = 1)]
        aliases: Vec<SmolStr>,
    }

    #[test]
    fn test_smol_str_roundtrip() {
        let original = Named {
            name: SmolStr::new("short"),
            aliases: vec![SmolStr::new("a"), SmolStr::new("b")],
        };
        let bytes = serialize(&original).unwrap();
        let decoded: Named = deserialize(&bytes).unwrap().unwrap();
        assert_eq!(original, decoded);
    }
}

#[test]
fn test_builtin_registration_is_idempotent() {
    register_builtin_converters();
    register_builtin_converters();
}
