use crate::ProtocolError;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Connection-scoped player identity, assigned by the relay when a socket is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl PlayerId {
    /// Reads a client-supplied id that the relay overwrites anyway.
    ///
    /// Clients send placeholders such as `"unregistered"` before they know
    /// their id; anything that is not a valid uuid becomes the default id
    /// instead of failing the whole message.
    pub fn deserialize_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Other(de::IgnoredAny),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => text.parse().unwrap_or_default(),
            RawId::Other(_) => PlayerId::default(),
        })
    }
}

/// Numeric map (zone) identifier.
///
/// Map ids arrive from clients either as JSON numbers or as numeric strings. They
/// are normalized here, once, so every comparison further in is a plain integer
/// comparison. A `MapId` always serializes back out as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MapId(u32);

impl MapId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parses a textual map id. Accepts surrounding whitespace and integral
    /// decimal forms such as `"100000000"` or `"100000000.0"`.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if let Ok(id) = trimmed.parse::<u32>() {
            return Ok(Self(id));
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Self::from_f64(value).ok_or_else(|| ProtocolError::InvalidMapId(raw.to_string())),
            Err(_) => Err(ProtocolError::InvalidMapId(raw.to_string())),
        }
    }

    fn from_f64(value: f64) -> Option<Self> {
        if value.is_finite() && value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) {
            Some(Self(value as u32))
        } else {
            None
        }
    }
}

impl From<u32> for MapId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl FromStr for MapId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for MapId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for MapId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MapIdVisitor)
    }
}

struct MapIdVisitor;

impl<'de> Visitor<'de> for MapIdVisitor {
    type Value = MapId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer map id or a numeric string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MapId, E> {
        u32::try_from(v)
            .map(MapId)
            .map_err(|_| E::custom(format!("map id {} out of range", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MapId, E> {
        u32::try_from(v)
            .map(MapId)
            .map_err(|_| E::custom(format!("map id {} out of range", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<MapId, E> {
        MapId::from_f64(v).ok_or_else(|| E::custom(format!("map id {} is not a whole number", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MapId, E> {
        MapId::parse(v).map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        map: MapId,
    }

    fn parse_json(json: &str) -> Result<MapId, serde_json::Error> {
        serde_json::from_str::<Holder>(json).map(|h| h.map)
    }

    #[test]
    fn test_map_id_from_number_and_string_agree() {
        let numeric = parse_json(r#"{"map": 100000000}"#).unwrap();
        let text = parse_json(r#"{"map": "100000000"}"#).unwrap();
        let padded = parse_json(r#"{"map": " 100000000 "}"#).unwrap();
        let float = parse_json(r#"{"map": 100000000.0}"#).unwrap();

        assert_eq!(numeric, MapId::new(100_000_000));
        assert_eq!(numeric, text);
        assert_eq!(numeric, padded);
        assert_eq!(numeric, float);
    }

    #[test]
    fn test_map_id_rejects_garbage() {
        assert!(parse_json(r#"{"map": -1}"#).is_err());
        assert!(parse_json(r#"{"map": 1.5}"#).is_err());
        assert!(parse_json(r#"{"map": "henesys"}"#).is_err());
        assert!(parse_json(r#"{"map": ""}"#).is_err());
        assert!(parse_json(r#"{"map": null}"#).is_err());
        assert!(parse_json(r#"{"map": 99999999999}"#).is_err());
    }

    #[test]
    fn test_map_id_serializes_as_number() {
        let json = serde_json::to_string(&MapId::parse("104000000").unwrap()).unwrap();
        assert_eq!(json, "104000000");
    }

    #[test]
    fn test_map_id_parse_errors_carry_raw_input() {
        match MapId::parse("abc") {
            Err(ProtocolError::InvalidMapId(raw)) => assert_eq!(raw, "abc"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[derive(Debug, Deserialize)]
    struct Sender {
        #[serde(default, deserialize_with = "PlayerId::deserialize_lenient")]
        id: PlayerId,
    }

    #[test]
    fn test_lenient_player_id_tolerates_placeholders() {
        let id = PlayerId::generate();
        let valid: Sender = serde_json::from_str(&format!(r#"{{"id": "{}"}}"#, id)).unwrap();
        assert_eq!(valid.id, id);

        for raw in [r#"{"id": "unregistered"}"#, r#"{"id": 7}"#, r#"{"id": null}"#, "{}"] {
            let sender: Sender = serde_json::from_str(raw).unwrap();
            assert_eq!(sender.id, PlayerId::default(), "input {}", raw);
        }
    }

    #[test]
    fn test_player_id_roundtrips_as_string() {
        let id = PlayerId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));

        let parsed: PlayerId = json.trim_matches('"').parse().unwrap();
        assert_eq!(parsed, id);
        assert_ne!(PlayerId::generate(), id);
    }
}
