//! # Canasta Engine
//!
//! The rules engine, lobby coordinator, and persistence layer for a
//! four-player partnership Canasta server.
//!
//! ## Architecture
//!
//! Rooms move through a single lifecycle: players gather in a lobby behind
//! a room code, the [`room::RoomCoordinator`] promotes the lobby into a
//! live [`game::Game`] once every seat is ready, and from then on every
//! mutation flows through [`game::execute_move`], the sole writer of game
//! state. Clients never see the shared `Game` directly — [`personalize`]
//! projects it down to a [`personalize::ClientState`] that hides opponents'
//! hands and in-progress staging melds.
//!
//! ## Core modules
//!
//! - [`card`]: suits, ranks, the shuffled deck, and the discard pile.
//! - [`game`]: the data model, move types, error taxonomy, and the
//!   `ExecuteMove` state machine.
//! - [`personalize`]: per-viewer projection of game state for broadcast.
//! - [`room`]: lobby lifecycle, room-code minting, and the room coordinator.
//! - [`session`]: the `token -> Session` store that survives disconnects.
//! - [`connection`]: the `connId <-> token` multiplexer used to route
//!   broadcasts to live transports.
//! - [`db`]: connection pooling and the persistence-layer repositories.

pub mod card;
pub mod connection;
pub mod db;
pub mod game;
pub mod personalize;
pub mod room;
pub mod session;

pub use card::{Card, Deck, DiscardPile, Rank, Suit};
pub use connection::ConnectionMultiplexer;
pub use game::{
    execute_move, new_game, partner_of, team_of, Canasta, CanastaCategory, Game, HandState, Meld,
    MeldRank, Move, MoveOutcome, MoveResult, MoveType, Phase, Player, PlayerId, RulesError, Team,
    TeamId, FOOT_DEAL_SIZE, HAND_DEAL_SIZE, MELD_REQUIREMENTS,
};
pub use personalize::{
    go_out_partner, personalize, ClientState, GameStateMessage, OpponentSummary, TeamView,
};
pub use room::{
    generate_unique_code, normalize_room_code, validate_username, ActiveGame, ActiveGameHandle,
    CoordinatorError, PlayerSlot, RoomConfig, RoomCoordinator, RoomStatus, Token, LOBBY_TTL,
};
pub use session::{Session, SessionStore};
