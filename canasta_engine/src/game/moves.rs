//! `Move` and `MoveType`: the Rules Engine's single input shape.

use serde::{Deserialize, Serialize};

use crate::game::model::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    DrawFromDeck,
    PickupDiscardPile,
    CreateMeld,
    AddToMeld,
    BurnCard,
    GoDown,
    Discard,
    PickupFoot,
    AskToGoOut,
    RespondGoOut,
    PlayRedThree,
}

/// `{playerId, type, id?, ids?, fromFoot?}`. `id` carries a meld id, a
/// canasta id, or a boolean-as-int approval flag depending on `move_type`;
/// `ids` carries card ids; `from_foot` is used only by `play_red_three`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Move {
    pub player_id: PlayerId,
    #[serde(rename = "type")]
    pub move_type: MoveType,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub ids: Option<Vec<u32>>,
    #[serde(default)]
    pub from_foot: Option<bool>,
}

impl Move {
    pub fn ids_or_empty(&self) -> &[u32] {
        self.ids.as_deref().unwrap_or(&[])
    }
}

/// `{success, message}`; `message` carries `"CODE: explanation"` when
/// `success = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResult {
    pub success: bool,
    pub message: Option<String>,
}

impl MoveResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}
