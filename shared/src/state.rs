use crate::{MapId, PlayerId, DEFAULT_FACE, DEFAULT_HAIR, DEFAULT_HP};
use serde::{Deserialize, Serialize};

pub type MonsterId = u32;

/// Animation stance of a character.
///
/// Unknown stance names are carried through as [`Stance::Other`] so a client
/// with a newer animation set never gets its whole update rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stance {
    #[default]
    Stand1,
    Stand2,
    Walk1,
    Walk2,
    Jump,
    Prone,
    ProneStab,
    Alert,
    Ladder,
    Rope,
    Sit,
    Fly,
    Dead,
    Heal,
    SwingO1,
    SwingO2,
    SwingO3,
    StabO1,
    StabO2,
    Shoot1,
    Other(String),
}

impl Stance {
    pub fn as_str(&self) -> &str {
        match self {
            Stance::Stand1 => "stand1",
            Stance::Stand2 => "stand2",
            Stance::Walk1 => "walk1",
            Stance::Walk2 => "walk2",
            Stance::Jump => "jump",
            Stance::Prone => "prone",
            Stance::ProneStab => "proneStab",
            Stance::Alert => "alert",
            Stance::Ladder => "ladder",
            Stance::Rope => "rope",
            Stance::Sit => "sit",
            Stance::Fly => "fly",
            Stance::Dead => "dead",
            Stance::Heal => "heal",
            Stance::SwingO1 => "swingO1",
            Stance::SwingO2 => "swingO2",
            Stance::SwingO3 => "swingO3",
            Stance::StabO1 => "stabO1",
            Stance::StabO2 => "stabO2",
            Stance::Shoot1 => "shoot1",
            Stance::Other(name) => name,
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(
            self,
            Stance::SwingO1
                | Stance::SwingO2
                | Stance::SwingO3
                | Stance::StabO1
                | Stance::StabO2
                | Stance::Shoot1
                | Stance::ProneStab
        )
    }
}

impl From<String> for Stance {
    fn from(name: String) -> Self {
        match name.as_str() {
            "stand1" => Stance::Stand1,
            "stand2" => Stance::Stand2,
            "walk1" => Stance::Walk1,
            "walk2" => Stance::Walk2,
            "jump" => Stance::Jump,
            "prone" => Stance::Prone,
            "proneStab" => Stance::ProneStab,
            "alert" => Stance::Alert,
            "ladder" => Stance::Ladder,
            "rope" => Stance::Rope,
            "sit" => Stance::Sit,
            "fly" => Stance::Fly,
            "dead" => Stance::Dead,
            "heal" => Stance::Heal,
            "swingO1" => Stance::SwingO1,
            "swingO2" => Stance::SwingO2,
            "swingO3" => Stance::SwingO3,
            "stabO1" => Stance::StabO1,
            "stabO2" => Stance::StabO2,
            "shoot1" => Stance::Shoot1,
            _ => Stance::Other(name),
        }
    }
}

impl From<Stance> for String {
    fn from(stance: Stance) -> Self {
        match stance {
            Stance::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

fn default_name() -> String {
    "Player".to_string()
}

fn default_hair() -> u32 {
    DEFAULT_HAIR
}

fn default_face() -> u32 {
    DEFAULT_FACE
}

fn default_level() -> u32 {
    1
}

fn default_hp() -> u32 {
    DEFAULT_HP
}

fn default_true() -> bool {
    true
}

/// Everything other players need to draw a character.
///
/// The relay never simulates these values; it stores whatever the owning
/// client last reported and forwards it to the rest of the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    #[serde(default, deserialize_with = "PlayerId::deserialize_lenient")]
    pub id: PlayerId,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(default)]
    pub stance: Stance,
    #[serde(default)]
    pub frame: u32,
    #[serde(default)]
    pub flipped: bool,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_hair")]
    pub hair: u32,
    #[serde(default = "default_face")]
    pub face: u32,
    #[serde(default)]
    pub skin: u32,
    pub map_id: MapId,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub job: u32,
    #[serde(default = "default_hp")]
    pub hp: u32,
    #[serde(default = "default_hp")]
    pub max_hp: u32,
    #[serde(default)]
    pub attacking: bool,
    #[serde(default = "default_true")]
    pub on_ground: bool,
}

impl PlayerState {
    pub fn new(id: PlayerId, map_id: MapId) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            vx: None,
            vy: None,
            stance: Stance::default(),
            frame: 0,
            flipped: false,
            name: default_name(),
            hair: DEFAULT_HAIR,
            face: DEFAULT_FACE,
            skin: 0,
            map_id,
            level: 1,
            job: 0,
            hp: DEFAULT_HP,
            max_hp: DEFAULT_HP,
            attacking: false,
            on_ground: true,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Merges every field present in `delta` except the map id.
    ///
    /// Map changes are partition transitions and are committed separately by
    /// the caller once the old map has been told about the departure.
    pub fn apply_delta(&mut self, delta: &PlayerUpdate) {
        if let Some(x) = delta.x.filter(|v| v.is_finite()) {
            self.x = x;
        }
        if let Some(y) = delta.y.filter(|v| v.is_finite()) {
            self.y = y;
        }
        if delta.vx.is_some() {
            self.vx = delta.vx;
        }
        if delta.vy.is_some() {
            self.vy = delta.vy;
        }
        if let Some(stance) = &delta.stance {
            self.stance = stance.clone();
        }
        if let Some(frame) = delta.frame {
            self.frame = frame;
        }
        if let Some(flipped) = delta.flipped {
            self.flipped = flipped;
        }
        if let Some(attacking) = delta.attacking {
            self.attacking = attacking;
        }
        if let Some(on_ground) = delta.on_ground {
            self.on_ground = on_ground;
        }
    }
}

/// Partial player state. Absent fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vx: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stance: Option<Stance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attacking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_id: Option<MapId>,
}

impl PlayerUpdate {
    /// A delta carrying every mutable field of `state`.
    pub fn snapshot_of(state: &PlayerState) -> Self {
        Self {
            x: Some(state.x),
            y: Some(state.y),
            vx: state.vx,
            vy: state.vy,
            stance: Some(state.stance.clone()),
            frame: Some(state.frame),
            flipped: Some(state.flipped),
            attacking: Some(state.attacking),
            on_ground: Some(state.on_ground),
            map_id: Some(state.map_id),
        }
    }
}

/// Relay-side view of a monster's health. Not authoritative; see `DamageEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterState {
    pub id: MonsterId,
    pub hp: u32,
    pub max_hp: u32,
    pub map_id: MapId,
}

/// A hit reported by a client. Damage from several clients is applied in
/// arrival order with no deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEvent {
    #[serde(default, deserialize_with = "PlayerId::deserialize_lenient")]
    pub source_id: PlayerId,
    pub target_id: MonsterId,
    pub damage: u32,
    pub map_id: MapId,
    /// The reporting client's idea of the monster's maximum hp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "PlayerId::deserialize_lenient")]
    pub player_id: PlayerId,
    pub message: String,
    pub map_id: MapId,
}
