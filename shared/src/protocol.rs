//! JSON envelopes for both directions.
//!
//! Every payload travels under `data`, including the bare ids of `player_id` and
//! `player_left`, which older clients expected as a top-level `id` field. One
//! envelope shape lets both enums use serde's adjacent tagging unchanged.

use crate::state::{ChatMessage, DamageEvent, MonsterState, PlayerState, PlayerUpdate};
use crate::{PlayerId, ProtocolError, MAX_PAYLOAD_BYTES};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Messages a client may send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Full state, sent once the id is known and again whenever the client re-syncs.
    PlayerInfo(PlayerState),
    PlayerUpdate(PlayerUpdate),
    GetPlayerList,
    ChatMessage(ChatMessage),
    MonsterDamage(DamageEvent),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::PlayerInfo(_) => "player_info",
            ClientMessage::PlayerUpdate(_) => "player_update",
            ClientMessage::GetPlayerList => "get_player_list",
            ClientMessage::ChatMessage(_) => "chat_message",
            ClientMessage::MonsterDamage(_) => "monster_damage",
        }
    }

    /// Registration traffic is exempt from inbound throttling.
    pub fn is_handshake(&self) -> bool {
        matches!(self, ClientMessage::PlayerInfo(_) | ClientMessage::GetPlayerList)
    }
}

/// Messages the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    PlayerId(PlayerId),
    PlayerJoined(PlayerState),
    PlayerLeft(PlayerId),
    /// Full merged state of the player that moved.
    PlayerUpdate(PlayerState),
    PlayerList(Vec<PlayerState>),
    ChatMessage(ChatMessage),
    MonsterDamage(DamageEvent),
    MonsterUpdate(MonsterState),
    Error(String),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::PlayerId(_) => "player_id",
            ServerMessage::PlayerJoined(_) => "player_joined",
            ServerMessage::PlayerLeft(_) => "player_left",
            ServerMessage::PlayerUpdate(_) => "player_update",
            ServerMessage::PlayerList(_) => "player_list",
            ServerMessage::ChatMessage(_) => "chat_message",
            ServerMessage::MonsterDamage(_) => "monster_damage",
            ServerMessage::MonsterUpdate(_) => "monster_update",
            ServerMessage::Error(_) => "error",
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes one text frame, rejecting blank and oversized payloads before parsing.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.len() > MAX_PAYLOAD_BYTES {
        return Err(ProtocolError::TooLarge {
            len: text.len(),
            max: MAX_PAYLOAD_BYTES,
        });
    }
    if text.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MapId, Stance};

    #[test]
    fn test_envelope_shape() {
        let id = PlayerId::generate();
        let json = encode(&ServerMessage::PlayerLeft(id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "player_left");
        assert_eq!(value["data"], id.to_string());
    }

    #[test]
    fn test_get_player_list_needs_no_data() {
        let message: ClientMessage = decode(r#"{"type": "get_player_list"}"#).unwrap();
        assert_eq!(message, ClientMessage::GetPlayerList);
        assert!(message.is_handshake());
    }

    #[test]
    fn test_decode_player_update_with_string_map_id() {
        let message: ClientMessage = decode(
            r#"{"type": "player_update", "data": {"x": 4.0, "y": 8.0, "stance": "walk1", "mapId": "100000000"}}"#,
        )
        .unwrap();

        match message {
            ClientMessage::PlayerUpdate(update) => {
                assert_eq!(update.map_id, Some(MapId::new(100_000_000)));
                assert_eq!(update.stance, Some(Stance::Walk1));
                assert_eq!(update.frame, None);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let result = decode::<ClientMessage>(r#"{"type": "teleport_everyone", "data": {}}"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_server_only_type_from_client() {
        let result = decode::<ClientMessage>(r#"{"type": "player_list", "data": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_blank_and_oversized() {
        assert!(matches!(decode::<ClientMessage>("   "), Err(ProtocolError::Empty)));

        let huge = format!(r#"{{"type": "chat_message", "data": {{"message": "{}"}}}}"#, "a".repeat(MAX_PAYLOAD_BYTES));
        assert!(matches!(
            decode::<ClientMessage>(&huge),
            Err(ProtocolError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_json() {
        let result = decode::<ClientMessage>(r#"{"type": "player_info", "data": {"mapId": 1"#);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let messages = vec![
            ServerMessage::PlayerId(PlayerId::generate()),
            ServerMessage::PlayerList(vec![]),
            ServerMessage::Error("nope".to_string()),
        ];

        for message in messages {
            let value: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
            assert_eq!(value["type"], message.kind());
        }
    }
}
