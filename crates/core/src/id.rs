//! Time-ordered 128-bit record identifiers.
//!
//! The first 7 bytes carry the creation time as big-endian Unix microseconds,
//! the remaining 9 bytes are cryptographically random. Ids therefore sort
//! chronologically as database keys while carrying 72 bits of entropy.
//!
//! The external form is 32 lowercase hex characters; dashes are tolerated on
//! input but never produced.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Number of random bytes at the tail of an id.
const RANDOM_BYTES: usize = 9;
/// Offset of the random tail; the head is the microsecond timestamp.
const RANDOM_OFFSET: usize = 7;
/// Length of the canonical string form.
const STRING_LENGTH: usize = 32;

/// A 128-bit time-ordered record identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RecordId([u8; 16]);

impl RecordId {
    /// Generate a fresh id stamped with the current time.
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        let mut micros = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
        for i in (0..RANDOM_OFFSET).rev() {
            bytes[i] = (micros & 0xff) as u8;
            micros >>= 8;
        }
        rand::rng().fill_bytes(&mut bytes[RANDOM_OFFSET..]);
        debug_assert_eq!(16 - RANDOM_OFFSET, RANDOM_BYTES);
        Self(bytes)
    }

    /// Parse from the 32-hex string form; dashes are stripped first.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != STRING_LENGTH {
            return Err(crate::Error::InvalidId);
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| crate::Error::InvalidId)?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| crate::Error::InvalidId)?;
        }
        Ok(Self(bytes))
    }

    /// The id with all bytes zero, used for not-yet-assigned records.
    pub fn nil() -> Self {
        Self([0u8; 16])
    }

    /// True when no id has been assigned.
    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// The creation time embedded in the id head.
    pub fn timestamp(&self) -> OffsetDateTime {
        let mut micros: i128 = 0;
        for b in &self.0[..RANDOM_OFFSET] {
            micros = (micros << 8) | *b as i128;
        }
        OffsetDateTime::from_unix_timestamp_nanos(micros * 1_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Storage and wire representation.
    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Construct from the storage representation.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(*uuid.as_bytes())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({self})")
    }
}

impl FromStr for RecordId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let id = RecordId::new();
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_tolerates_dashes() {
        let plain = RecordId::parse("0505da61380049aabbccddeeff001122").unwrap();
        let dashed = RecordId::parse("0505da61-3800-49aa-bbcc-ddeeff001122").unwrap();
        assert_eq!(plain, dashed);
        assert_eq!(plain.to_string(), "0505da61380049aabbccddeeff001122");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(RecordId::parse("").is_err());
        assert!(RecordId::parse("zz05da61380049aabbccddeeff001122").is_err());
        assert!(RecordId::parse("0505da61").is_err());
    }

    #[test]
    fn output_is_lowercase_hex() {
        let id = RecordId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn embeds_creation_time() {
        let before = OffsetDateTime::now_utc();
        let id = RecordId::new();
        let after = OffsetDateTime::now_utc();
        let ts = id.timestamp();
        assert!(ts >= before - time::Duration::milliseconds(1));
        assert!(ts <= after + time::Duration::milliseconds(1));
    }

    #[test]
    fn sorts_chronologically() {
        let a = RecordId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = RecordId::new();
        assert!(a < b);
    }

    #[test]
    fn nil_is_nil() {
        assert!(RecordId::nil().is_nil());
        assert!(!RecordId::new().is_nil());
    }

    #[test]
    fn uuid_conversion_roundtrips() {
        let id = RecordId::new();
        assert_eq!(RecordId::from_uuid(id.as_uuid()), id);
    }

    #[test]
    fn serde_uses_string_form() {
        let id = RecordId::parse("0505da61380049aabbccddeeff001122").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0505da61380049aabbccddeeff001122\"");
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
