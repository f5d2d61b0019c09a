//! Wire protocol shared by the relay server and the flight clients.
//!
//! Every message on the wire is a single JSON object carrying a `type` tag.
//! Messages are written back to back on a TCP stream with no length prefix;
//! the [`framing`] module recovers message boundaries on the receiving side.
//!
//! The relay never interprets these types. Only clients decode them, and each
//! client is authoritative for its own [`PlayerState`].

use serde::{Deserialize, Serialize};

pub mod framing;

pub use framing::{FrameError, Framer, DEFAULT_MAX_FRAME_BYTES};

/// Identifier a client picks for itself when it connects.
pub type PlayerId = u32;

pub const DEFAULT_PORT: u16 = 50007;
pub const HITBOX_RADIUS: f32 = 0.7;
pub const MAX_HEALTH: i32 = 100;
pub const DAMAGE_PER_FIREPOWER: i32 = 10;
pub const SYSTEM_SENDER: &str = "System";

/// Health left after taking `damage`, kept within 0..=MAX_HEALTH.
///
/// Damage arrives from peers unchecked, so negative values count as zero.
pub fn apply_damage(health: i32, damage: i32) -> i32 {
    health.saturating_sub(damage.max(0)).clamp(0, MAX_HEALTH)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(&self, direction: Position, distance: f32) -> Position {
        Position {
            x: self.x + direction.x * distance,
            y: self.y + direction.y * distance,
            z: self.z + direction.z * distance,
        }
    }
}

/// Yaw, pitch and roll in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    /// Unit vector the nose points along for this yaw and pitch
    pub fn forward(&self) -> Position {
        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        Position {
            x: yaw.sin() * pitch.cos(),
            y: pitch.sin(),
            z: -yaw.cos() * pitch.cos(),
        }
    }
}

/// Full snapshot of one pilot, owned by the client flying it
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub name: String,
    pub position: Position,
    pub orientation: Orientation,
    pub health: i32,
    pub color: [f32; 3],
    pub score: u32,
    pub deaths: u32,
}

/// Tagged union over every message kind carried on the wire.
///
/// Decoding an unknown `type` tag is an error rather than a silently
/// ignored message, so receivers always see exactly one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    State(StateMessage),
    Bullet(BulletMessage),
    Chat(ChatMessage),
    Hit(HitMessage),
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The `type` tag this message carries on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Message::State(_) => "state",
            Message::Bullet(_) => "bullet",
            Message::Chat(_) => "chat",
            Message::Hit(_) => "hit",
        }
    }
}

/// Player state as it travels on the wire.
///
/// Publishers always fill every field. Receivers treat absent fields as
/// "keep the previous value", so older or partial senders still merge cleanly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateMessage {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<u32>,
}

impl From<&PlayerState> for StateMessage {
    fn from(state: &PlayerState) -> Self {
        Self {
            player_id: state.player_id,
            name: Some(state.name.clone()),
            x: Some(state.position.x),
            y: Some(state.position.y),
            z: Some(state.position.z),
            yaw: Some(state.orientation.yaw),
            pitch: Some(state.orientation.pitch),
            roll: Some(state.orientation.roll),
            health: Some(state.health.clamp(0, MAX_HEALTH)),
            color: Some(state.color),
            score: Some(state.score),
            deaths: Some(state.deaths),
        }
    }
}

/// Announcement of a fired projectile. Fire-and-forget: nothing ever
/// acknowledges or removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletMessage {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl BulletMessage {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, text)
    }
}

/// Hit detected by the attacking client.
///
/// `attacker_id` and `event_id` together identify one hit, letting receivers
/// drop duplicate deliveries. Both are optional on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitMessage {
    pub target_id: PlayerId,
    pub damage: i32,
    pub attacker_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacker_id: Option<PlayerId>,
    #[serde(default)]
    pub is_kill: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
}

impl HitMessage {
    /// Key used to recognise repeated deliveries of the same hit
    pub fn dedup_key(&self) -> Option<(PlayerId, u64)> {
        Some((self.attacker_id?, self.event_id?))
    }
}
