//! The rules-engine error taxonomy: move-legality failures and the
//! turn/ownership slice of auth/routing errors. Every variant renders as
//! `"CODE: message"`, matching the wire contract the client expects.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("NOT_YOUR_TURN: it is not your turn")]
    NotYourTurn,

    #[error("WRONG_PHASE: move not allowed in the current phase")]
    WrongPhase,

    #[error("NOT_PARTNER: you are not the go-out requester's partner")]
    NotPartner,

    #[error("NO_REQUEST: there is no pending go-out request")]
    NoRequest,

    #[error("GO_OUT_PENDING: a go-out request is already pending")]
    GoOutPending,

    #[error("NO_CARDS: no ids were supplied")]
    NoCards,

    #[error("CARD_NOT_FOUND: card {0} is not in your hand")]
    CardNotFound(u32),

    #[error("INVALID_CARD: {0}")]
    InvalidCard(String),

    #[error("INVALID_MELD: {0}")]
    InvalidMeld(String),

    #[error("MELD_MISMATCH: meld {0} was not found on your team")]
    MeldMismatch(u32),

    #[error("PILE_FROZEN: the discard pile cannot be picked up")]
    PileFrozen,

    #[error("CANNOT_GO_OUT: hand must have at least 2 cards unless your team may go out")]
    CannotGoOut,

    #[error("NO_CANASTA: you have not completed a canasta")]
    NoCanasta,

    #[error("MISSING_CANASTA: your team does not hold all four canasta categories")]
    MissingCanasta,

    #[error("GAME_PAUSED: the game is paused")]
    GamePaused,

    #[error("GAME_COMPLETED: the game has ended")]
    GameCompleted,
}

impl RulesError {
    /// The bare `ERROR_CODE` token, useful for assertions in tests and for
    /// clients that want to match on the code rather than the full message.
    pub fn code(&self) -> &'static str {
        match self {
            RulesError::NotYourTurn => "NOT_YOUR_TURN",
            RulesError::WrongPhase => "WRONG_PHASE",
            RulesError::NotPartner => "NOT_PARTNER",
            RulesError::NoRequest => "NO_REQUEST",
            RulesError::GoOutPending => "GO_OUT_PENDING",
            RulesError::NoCards => "NO_CARDS",
            RulesError::CardNotFound(_) => "CARD_NOT_FOUND",
            RulesError::InvalidCard(_) => "INVALID_CARD",
            RulesError::InvalidMeld(_) => "INVALID_MELD",
            RulesError::MeldMismatch(_) => "MELD_MISMATCH",
            RulesError::PileFrozen => "PILE_FROZEN",
            RulesError::CannotGoOut => "CANNOT_GO_OUT",
            RulesError::NoCanasta => "NO_CANASTA",
            RulesError::MissingCanasta => "MISSING_CANASTA",
            RulesError::GamePaused => "GAME_PAUSED",
            RulesError::GameCompleted => "GAME_COMPLETED",
        }
    }
}
