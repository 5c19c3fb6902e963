pub mod entity;
pub mod game;
pub mod geom;
pub mod util;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::game::{
    level::{Level, LevelError, Wall},
    BulletView, Entity, EntityId, EntityMap, Event, Game, Input, Player, PlayerId, PlayerMap,
    PlayerState, Point, Settings, TankView, TickNum, Time, Vector,
};

pub use crate::game::entities;
pub use crate::game::Error as GameError;
pub use crate::game::Result as GameResult;
pub use crate::game::Time as GameTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    pub fn new_v4() -> Self {
        ClientId(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    NewPlayer {
        name: String,
    },
    PlayerAction(Input),
    DebugInfo {
        #[serde(default)]
        level: Option<usize>,
        #[serde(default)]
        toggle_training: Option<bool>,
    },
    Message {
        socket_id: ClientId,
        message: String,
    },
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    MapUpdate {
        walls: Vec<Wall>,
    },
    Update {
        #[serde(rename = "self")]
        you: Option<TankView>,
        players: Vec<TankView>,
        bots: Vec<TankView>,
        projectiles: Vec<BulletView>,
    },
    Message {
        message: String,
    },
}

pub type EncodeError = rmp_serde::encode::Error;

impl ServerMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        rmp_serde::to_vec_named(self)
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        rmp_serde::from_slice(data).ok()
    }
}

impl ClientMessage {
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        rmp_serde::to_vec_named(self)
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        rmp_serde::from_slice(data).ok()
    }
}
