//! Serde helpers for documents written by older versions of the store.

/// RFC 3339 on write. On read, naive ISO timestamps without an offset are
/// also accepted and taken as UTC.
pub(crate) mod timestamp {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(
        value: &OffsetDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unrecognised timestamp {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<OffsetDateTime> {
        let raw = raw.trim();
        if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
            return Some(at);
        }
        PrimitiveDateTime::parse(
            raw,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        )
        .or_else(|_| {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
            )
        })
        .or_else(|_| {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            )
        })
        .ok()
        .map(PrimitiveDateTime::assume_utc)
    }
}

/// Whole percent on write. On read, fractional values are rounded and
/// everything is clamped to 0..=100. `null` reads as 0.
pub(crate) mod percent {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
        Ok(raw.round().clamp(0.0, 100.0) as u8)
    }
}
