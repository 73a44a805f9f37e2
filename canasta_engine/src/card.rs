//! Card identity and the 216-card four-pack deck.

use serde::{Deserialize, Serialize};

/// Suit of a card. `Wild` is the pseudo-suit carried by jokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
    Wild,
}

/// Rank of a card. Ordering is immaterial except that `Two` and `Joker` are
/// wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
    Two,
    Joker,
    Three,
}

impl Rank {
    /// A card is wild iff its rank is `Two` or `Joker`.
    pub fn is_wild(self) -> bool {
        matches!(self, Rank::Two | Rank::Joker)
    }

    /// Point value of a single card of this rank, per the table-lookup rule
    /// in the data model. Black threes are negated by `Card::point_value`,
    /// not here, since the negation depends on suit.
    pub fn base_point_value(self) -> i32 {
        match self {
            Rank::Four | Rank::Five | Rank::Six | Rank::Seven => 5,
            Rank::Eight
            | Rank::Nine
            | Rank::Ten
            | Rank::Jack
            | Rank::Queen
            | Rank::King
            | Rank::Ace => 10,
            Rank::Two | Rank::Joker => 20,
            Rank::Three => 5,
        }
    }
}

/// A single card. `id` is unique within a deck and is the stable identity
/// the wire protocol and hand/foot collections reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub id: u32,
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub fn is_wild(&self) -> bool {
        self.rank.is_wild()
    }

    /// True for a rank-Three card with a black suit (Clubs or Spades).
    pub fn is_black_three(&self) -> bool {
        self.rank == Rank::Three && matches!(self.suit, Suit::Clubs | Suit::Spades)
    }

    /// True for a rank-Three card with a red suit (Hearts or Diamonds).
    pub fn is_red_three(&self) -> bool {
        self.rank == Rank::Three && matches!(self.suit, Suit::Hearts | Suit::Diamonds)
    }

    /// Point value of this card: a black three is negated, every other rank
    /// uses its base value. Red threes are scored separately and are never
    /// expected in a hand at scoring time in normal play.
    pub fn point_value(&self) -> i32 {
        if self.is_black_three() {
            -100
        } else {
            self.rank.base_point_value()
        }
    }
}

const SUITS: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];
const RANKS: [Rank; 13] = [
    Rank::Four,
    Rank::Five,
    Rank::Six,
    Rank::Seven,
    Rank::Eight,
    Rank::Nine,
    Rank::Ten,
    Rank::Jack,
    Rank::Queen,
    Rank::King,
    Rank::Ace,
    Rank::Two,
    Rank::Three,
];

/// Ordered sequence of cards drawn from the tail. A fresh deck holds
/// `4 * (52 + 2) = 216` cards and is shuffled exactly once when a hand
/// starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Build an unshuffled four-pack deck: four copies of each of the 13
    /// ranks across 4 suits, plus 2 jokers per pack (8 jokers total), for
    /// `4*52 + 8 = 216` cards. Ids are assigned sequentially and are unique.
    pub fn new_four_pack() -> Self {
        let mut cards = Vec::with_capacity(216);
        let mut next_id = 0u32;
        for _pack in 0..4 {
            for &suit in &SUITS {
                for &rank in &RANKS {
                    cards.push(Card {
                        id: next_id,
                        suit,
                        rank,
                    });
                    next_id += 1;
                }
            }
            for _ in 0..2 {
                cards.push(Card {
                    id: next_id,
                    suit: Suit::Wild,
                    rank: Rank::Joker,
                });
                next_id += 1;
            }
        }
        Self { cards }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn shuffle(&mut self, rng: &mut impl rand::Rng) {
        use rand::seq::SliceRandom;
        self.cards.shuffle(rng);
    }

    /// Draw a single card from the tail. `None` once the deck is exhausted.
    pub fn deal_card(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    /// Draw `n` cards from the tail, stopping early if the deck runs out.
    pub fn deal_n(&mut self, n: usize) -> Vec<Card> {
        let mut drawn = Vec::with_capacity(n);
        for _ in 0..n {
            match self.deal_card() {
                Some(card) => drawn.push(card),
                None => break,
            }
        }
        drawn
    }
}

/// Ordered sequence of cards; only the last is the "top". May be empty
/// after a legal pickup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscardPile {
    cards: Vec<Card>,
}

impl DiscardPile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn top(&self) -> Option<&Card> {
        self.cards.last()
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Remove and return every card, leaving the pile empty. Used when a
    /// pickup absorbs the whole pile into a player's hand.
    pub fn drain_all(&mut self) -> Vec<Card> {
        std::mem::take(&mut self.cards)
    }

    /// Pop just the top card (used when forming the new meld from the top
    /// card, before the rest of the pile is absorbed).
    pub fn pop_top(&mut self) -> Option<Card> {
        self.cards.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fresh_deck_has_216_unique_ids() {
        let deck = Deck::new_four_pack();
        assert_eq!(deck.len(), 216);
        let mut ids: Vec<u32> = deck.cards.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 216);
    }

    #[test]
    fn shuffle_preserves_multiset() {
        let mut deck = Deck::new_four_pack();
        let mut before: Vec<u32> = deck.cards.iter().map(|c| c.id).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        deck.shuffle(&mut rng);
        let mut after: Vec<u32> = deck.cards.iter().map(|c| c.id).collect();
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after);
    }

    #[test]
    fn black_three_is_negative_red_three_is_not() {
        let black = Card {
            id: 0,
            suit: Suit::Clubs,
            rank: Rank::Three,
        };
        let red = Card {
            id: 1,
            suit: Suit::Hearts,
            rank: Rank::Three,
        };
        assert_eq!(black.point_value(), -100);
        assert!(red.is_red_three());
        assert!(!red.is_black_three());
    }

    #[test]
    fn two_and_joker_are_wild() {
        let two = Card {
            id: 0,
            suit: Suit::Spades,
            rank: Rank::Two,
        };
        let joker = Card {
            id: 1,
            suit: Suit::Wild,
            rank: Rank::Joker,
        };
        let king = Card {
            id: 2,
            suit: Suit::Hearts,
            rank: Rank::King,
        };
        assert!(two.is_wild());
        assert!(joker.is_wild());
        assert!(!king.is_wild());
    }

    #[test]
    fn deal_n_stops_when_deck_exhausted() {
        let mut deck = Deck { cards: vec![] };
        assert!(deck.deal_n(5).is_empty());
        assert!(deck.is_empty());
    }

    #[test]
    fn discard_pile_top_and_drain() {
        let mut pile = DiscardPile::new();
        assert!(pile.top().is_none());
        pile.push(Card {
            id: 0,
            suit: Suit::Hearts,
            rank: Rank::Ace,
        });
        pile.push(Card {
            id: 1,
            suit: Suit::Spades,
            rank: Rank::King,
        });
        assert_eq!(pile.top().unwrap().id, 1);
        let drained = pile.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(pile.is_empty());
    }
}
