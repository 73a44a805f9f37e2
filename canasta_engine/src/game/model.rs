//! Authoritative rules-engine state: `Meld`, `Canasta`, `Player`, `Team`,
//! `HandState`, and `Game` itself.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::card::{Card, Deck, DiscardPile, Rank};

/// The rank a meld or canasta is built on. Distinct from `card::Rank`
/// because a meld made entirely of wildcards has no single card rank in
/// common — this calls that meld rank "Wild", a value no individual
/// card carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeldRank {
    Suited(Rank),
    Wild,
}

/// A meld: three or more cards of one rank (wilds allowed within limits),
/// before it has grown into a canasta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meld {
    /// The `id` of the first card that formed this meld; stable for
    /// reference even as more cards are added.
    pub id: u32,
    pub rank: MeldRank,
    pub cards: Vec<Card>,
    pub wild_count: u8,
}

impl Meld {
    pub fn is_canasta_eligible(&self) -> bool {
        self.cards.len() >= 7
    }

    pub fn into_canasta(self) -> Canasta {
        let natural = self.wild_count == 0;
        Canasta {
            id: self.id,
            rank: self.rank,
            count: self.cards.len() as u32,
            cards: self.cards,
            natural,
        }
    }
}

/// A completed meld of at least seven cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canasta {
    pub id: u32,
    pub rank: MeldRank,
    pub cards: Vec<Card>,
    pub count: u32,
    /// No wild was ever part of this canasta.
    pub natural: bool,
}

/// The four canasta categories `ask_to_go_out` requires the team to hold at
/// least one of each of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanastaCategory {
    Wildcards,
    Sevens,
    Natural,
    Unnatural,
}

impl Canasta {
    /// A canasta may satisfy more than one category simultaneously: a
    /// natural Sevens canasta counts as both Sevens and Natural.
    pub fn categories(&self) -> Vec<CanastaCategory> {
        let mut cats = Vec::new();
        if self.rank == MeldRank::Suited(Rank::Seven) {
            cats.push(CanastaCategory::Sevens);
        }
        if self.rank == MeldRank::Wild {
            cats.push(CanastaCategory::Wildcards);
        }
        if self.natural {
            cats.push(CanastaCategory::Natural);
        } else {
            cats.push(CanastaCategory::Unnatural);
        }
        cats
    }
}

/// A player's id is a stable seat index 0..3.
pub type PlayerId = usize;

/// `{name, team, hand, foot, stagingMelds, madeCanasta, partner}`. Hand is a
/// keyed collection so cards are referenced by id, not position. Foot is an
/// ordered sequence, never shown to opponents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    /// `TeamA` if seat index is even, `TeamB` otherwise; stored for
    /// convenience but always derivable from seat index (see
    /// `team_of`/`partner_of`).
    pub hand: HashMap<u32, Card>,
    pub foot: Vec<Card>,
    pub staging_melds: Vec<Meld>,
    pub made_canasta: bool,
}

impl Player {
    pub fn new(name: String) -> Self {
        Self {
            name,
            hand: HashMap::new(),
            foot: Vec::new(),
            staging_melds: Vec::new(),
            made_canasta: false,
        }
    }

    pub fn hand_size(&self) -> usize {
        self.hand.len()
    }

    pub fn add_to_hand(&mut self, cards: impl IntoIterator<Item = Card>) {
        for c in cards {
            self.hand.insert(c.id, c);
        }
    }

    pub fn remove_from_hand(&mut self, ids: &[u32]) -> Option<Vec<Card>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(*self.hand.get(id)?);
        }
        for id in ids {
            self.hand.remove(id);
        }
        Some(out)
    }
}

/// Stable seat-index navigation, deterministic after load: no in-memory
/// pointers for the cyclic player/team/partner graph.
pub fn partner_of(seat: PlayerId) -> PlayerId {
    (seat + 2) % 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamId {
    A,
    B,
}

pub fn team_of(seat: PlayerId) -> TeamId {
    if seat % 2 == 0 { TeamId::A } else { TeamId::B }
}

/// `{score, melds[], canastas[], redThrees[], goneDown, canGoOut}`. Melds and
/// canastas live on the team, not the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub score: i64,
    pub melds: Vec<Meld>,
    pub canastas: Vec<Canasta>,
    pub red_threes: Vec<Card>,
    /// Set once the team has met the hand's minimum meld-point threshold.
    pub gone_down: bool,
    /// Set only by an approved partner-permission exchange.
    pub can_go_out: bool,
}

impl Team {
    pub fn new() -> Self {
        Self {
            score: 0,
            melds: Vec::new(),
            canastas: Vec::new(),
            red_threes: Vec::new(),
            gone_down: false,
            can_go_out: false,
        }
    }

    /// Every one of the four canasta categories is present.
    pub fn has_all_categories(&self) -> bool {
        use CanastaCategory::*;
        let mut have = [false; 4];
        for canasta in &self.canastas {
            for cat in canasta.categories() {
                match cat {
                    Wildcards => have[0] = true,
                    Sevens => have[1] = true,
                    Natural => have[2] = true,
                    Unnatural => have[3] = true,
                }
            }
        }
        have.iter().all(|&b| b)
    }

    pub fn find_meld_mut(&mut self, meld_id: u32) -> Option<&mut Meld> {
        self.melds.iter_mut().find(|m| m.id == meld_id)
    }

    pub fn find_canasta_mut(&mut self, canasta_id: u32) -> Option<&mut Canasta> {
        self.canastas.iter_mut().find(|c| c.id == canasta_id)
    }
}

impl Default for Team {
    fn default() -> Self {
        Self::new()
    }
}

/// One of four deals constituting a game: the deck and discard pile for the
/// current hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandState {
    pub deck: Deck,
    pub discard_pile: DiscardPile,
}

/// Turn/phase state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Drawing,
    Playing,
}

/// Minimum staging-meld point threshold to go down, indexed by hand number
/// (1-based).
pub const MELD_REQUIREMENTS: [i64; 4] = [50, 90, 120, 150];

pub const HAND_DEAL_SIZE: usize = 15;
pub const FOOT_DEAL_SIZE: usize = 11;

/// The authoritative per-hand Canasta rules-engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub hand_number: u8,
    pub players: [Player; 4],
    pub team_a: Team,
    pub team_b: Team,
    pub hand: HandState,
    pub phase: Phase,
    pub current_player: PlayerId,
    pub go_out_request_pending: bool,
    /// -1 encoded as `None` for a cleaner Rust representation; the wire
    /// format maps `None` back to -1 for clients.
    pub go_out_requester: Option<PlayerId>,
    pub go_out_partner: Option<PlayerId>,
}

impl Game {
    pub fn team(&self, seat: PlayerId) -> &Team {
        match team_of(seat) {
            TeamId::A => &self.team_a,
            TeamId::B => &self.team_b,
        }
    }

    pub fn team_mut(&mut self, seat: PlayerId) -> &mut Team {
        match team_of(seat) {
            TeamId::A => &mut self.team_a,
            TeamId::B => &mut self.team_b,
        }
    }

    pub fn meld_requirement(&self) -> i64 {
        MELD_REQUIREMENTS[(self.hand_number.saturating_sub(1) as usize).min(3)]
    }
}
