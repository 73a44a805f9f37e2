//! The Canasta rules engine: data model, moves, error taxonomy, and the
//! `ExecuteMove` state machine.

pub mod engine;
pub mod errors;
pub mod model;
pub mod moves;

pub use engine::{execute_move, new_game, MoveOutcome};
pub use errors::RulesError;
pub use model::{
    partner_of, team_of, Canasta, CanastaCategory, Game, HandState, Meld, MeldRank, Phase, Player,
    PlayerId, Team, TeamId, FOOT_DEAL_SIZE, HAND_DEAL_SIZE, MELD_REQUIREMENTS,
};
pub use moves::{Move, MoveResult, MoveType};
