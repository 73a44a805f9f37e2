//! `ExecuteMove`: the Rules Engine's sole mutator entry point, the
//! turn/phase state machine, and the meld validation algorithm.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::card::{Card, Deck, DiscardPile, Rank};
use crate::game::errors::RulesError;
use crate::game::model::{
    partner_of, team_of, Canasta, FOOT_DEAL_SIZE, Game, HandState, HAND_DEAL_SIZE, Meld, MeldRank,
    Phase, Player, PlayerId, Team, TeamId,
};
use crate::game::moves::{Move, MoveType};

/// Out-of-band effects the Request Router needs to know about after a
/// successful move, beyond the mutated `Game` itself. The Rules Engine
/// computes these as pure facts about the move; it never sends messages
/// itself.
#[derive(Debug, Clone, Default)]
pub struct MoveOutcome {
    pub hand_ended: bool,
    pub game_ended: bool,
    /// Set when `ask_to_go_out` succeeds: `(requester, partner)`. The
    /// router sends a targeted `permission_requested` to `partner`.
    pub go_out_requested: Option<(PlayerId, PlayerId)>,
    /// Set when `respond_go_out` succeeds: `(requester, approved)`. The
    /// router sends a targeted `permission_response` to `requester`.
    pub go_out_responded: Option<(PlayerId, bool)>,
}

/// Build the four players, teams, and the first hand's deal for a new
/// game. `player_order` gives the username at each seat 0..3.
pub fn new_game(id: String, player_order: [String; 4], seed: Option<u64>) -> Game {
    let players = [
        Player::new(player_order[0].clone()),
        Player::new(player_order[1].clone()),
        Player::new(player_order[2].clone()),
        Player::new(player_order[3].clone()),
    ];
    let mut game = Game {
        id,
        hand_number: 1,
        players,
        team_a: Team::new(),
        team_b: Team::new(),
        hand: HandState {
            deck: Deck::new_four_pack(),
            discard_pile: DiscardPile::new(),
        },
        phase: Phase::Drawing,
        current_player: 0,
        go_out_request_pending: false,
        go_out_requester: None,
        go_out_partner: None,
    };
    deal_hand(&mut game, seed);
    game
}

/// Deal procedure: fresh shuffled deck, 15 to each hand, 11 to
/// each foot, flip the top card to discard.
fn deal_hand(game: &mut Game, seed: Option<u64>) {
    let mut deck = Deck::new_four_pack();
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };
    deck.shuffle(&mut rng);

    for player in game.players.iter_mut() {
        let cards = deck.deal_n(HAND_DEAL_SIZE);
        player.hand.clear();
        player.add_to_hand(cards);
        player.foot = deck.deal_n(FOOT_DEAL_SIZE);
        player.staging_melds.clear();
        player.made_canasta = false;
    }
    let mut discard = DiscardPile::new();
    if let Some(top) = deck.deal_card() {
        discard.push(top);
    }
    game.hand = HandState {
        deck,
        discard_pile: discard,
    };
    game.phase = Phase::Drawing;
    game.go_out_request_pending = false;
    game.go_out_requester = None;
    game.go_out_partner = None;
}

/// The sole mutator of `Game`. On failure `Game` is left bit-for-bit
/// unchanged.
pub fn execute_move(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    check_turn_gate(game, mv)?;

    match mv.move_type {
        MoveType::DrawFromDeck => draw_from_deck(game, mv),
        MoveType::PickupDiscardPile => pickup_discard_pile(game, mv),
        MoveType::CreateMeld => create_meld(game, mv),
        MoveType::AddToMeld => add_to_meld(game, mv),
        MoveType::BurnCard => burn_card(game, mv),
        MoveType::GoDown => go_down(game, mv),
        MoveType::Discard => discard(game, mv),
        MoveType::PickupFoot => pickup_foot(game, mv),
        MoveType::AskToGoOut => ask_to_go_out(game, mv),
        MoveType::RespondGoOut => respond_go_out(game, mv),
        MoveType::PlayRedThree => play_red_three(game, mv),
    }
}

/// Per-move-type turn gating. `respond_go_out` must execute
/// without the ordinary turn check, so the gate is structured per move
/// type rather than applied uniformly before dispatch.
fn check_turn_gate(game: &Game, mv: &Move) -> Result<(), RulesError> {
    match mv.move_type {
        MoveType::RespondGoOut => Ok(()),
        MoveType::DrawFromDeck | MoveType::PickupDiscardPile | MoveType::PlayRedThree => {
            if game.phase != Phase::Drawing {
                return Err(RulesError::WrongPhase);
            }
            require_turn_owner(game, mv.player_id)
        }
        MoveType::CreateMeld
        | MoveType::AddToMeld
        | MoveType::BurnCard
        | MoveType::GoDown
        | MoveType::PickupFoot
        | MoveType::Discard
        | MoveType::AskToGoOut => {
            if game.phase != Phase::Playing {
                return Err(RulesError::WrongPhase);
            }
            require_turn_owner(game, mv.player_id)
        }
    }
}

fn require_turn_owner(game: &Game, player_id: PlayerId) -> Result<(), RulesError> {
    if game.current_player == player_id {
        Ok(())
    } else {
        Err(RulesError::NotYourTurn)
    }
}

fn draw_from_deck(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let team_id = team_of(mv.player_id);
    let mut drawn = Vec::with_capacity(2);
    for _ in 0..2 {
        match game.hand.deck.deal_card() {
            Some(card) if card.is_red_three() => {
                push_red_three(game, team_id, card);
                if let Some(replacement) = game.hand.deck.deal_card() {
                    drawn.push(replacement);
                }
            }
            Some(card) => drawn.push(card),
            None => break,
        }
    }
    game.players[mv.player_id].add_to_hand(drawn);
    game.phase = Phase::Playing;
    Ok(MoveOutcome::default())
}

fn push_red_three(game: &mut Game, team_id: TeamId, card: Card) {
    match team_id {
        TeamId::A => game.team_a.red_threes.push(card),
        TeamId::B => game.team_b.red_threes.push(card),
    }
}

fn pickup_discard_pile(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let ids = mv.ids_or_empty();
    if ids.len() < 2 {
        return Err(RulesError::NoCards);
    }
    let top = *game
        .hand
        .discard_pile
        .top()
        .ok_or(RulesError::PileFrozen)?;
    if top.is_black_three() {
        return Err(RulesError::PileFrozen);
    }
    if top.is_wild() {
        let all_wild_companions = ids.iter().all(|id| {
            game.players[mv.player_id]
                .hand
                .get(id)
                .map(|c| c.is_wild())
                .unwrap_or(false)
        });
        if !all_wild_companions {
            return Err(RulesError::PileFrozen);
        }
    }

    // The top card participates in the meld alongside the named hand cards.
    let named_cards = {
        let player = &game.players[mv.player_id];
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(*player.hand.get(id).ok_or(RulesError::CardNotFound(*id))?);
        }
        cards
    };
    let mut candidate_cards = named_cards.clone();
    candidate_cards.push(top);
    let meld = validate_meld(&candidate_cards, ids[0])?;

    let already_down = game.team(mv.player_id).gone_down;
    if !already_down {
        let staged_total: i64 = game.players[mv.player_id]
            .staging_melds
            .iter()
            .flat_map(|m| m.cards.iter())
            .map(|c| c.point_value() as i64)
            .sum();
        let new_meld_value: i64 = meld.cards.iter().map(|c| c.point_value() as i64).sum();
        if staged_total + new_meld_value < game.meld_requirement() {
            return Err(RulesError::InvalidMeld(
                "staged meld value does not reach the hand's threshold".into(),
            ));
        }
    }

    // Commit: remove named cards from hand, pop the top card, install meld.
    let player = &mut game.players[mv.player_id];
    player.remove_from_hand(&named_cards.iter().map(|c| c.id).collect::<Vec<_>>());
    game.hand.discard_pile.pop_top();
    let remaining = game.hand.discard_pile.drain_all();
    game.players[mv.player_id].add_to_hand(remaining);

    if already_down {
        install_meld(game, mv.player_id, meld);
    } else {
        // This pickup clears the threshold, so it counts as going down:
        // promote every existing staging meld plus this new one onto the
        // team, then return the partner's own stagings to their hand (same
        // side effects as `go_down`).
        let staged = std::mem::take(&mut game.players[mv.player_id].staging_melds);
        for staged_meld in staged {
            install_meld_after_gone_down(game, mv.player_id, staged_meld);
        }
        install_meld_after_gone_down(game, mv.player_id, meld);
        game.team_mut(mv.player_id).gone_down = true;

        let partner_id = partner_of(mv.player_id);
        let partner_staged = std::mem::take(&mut game.players[partner_id].staging_melds);
        for partner_meld in partner_staged {
            game.players[partner_id].add_to_hand(partner_meld.cards);
        }
    }
    game.phase = Phase::Playing;
    Ok(MoveOutcome::default())
}

fn create_meld(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let ids = mv.ids_or_empty();
    if ids.is_empty() {
        return Err(RulesError::NoCards);
    }
    let cards = {
        let player = &game.players[mv.player_id];
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(*player.hand.get(id).ok_or(RulesError::CardNotFound(*id))?);
        }
        cards
    };
    let meld = validate_meld(&cards, ids[0])?;
    game.players[mv.player_id].remove_from_hand(ids);
    install_meld(game, mv.player_id, meld);
    Ok(MoveOutcome::default())
}

/// Install a freshly validated meld: onto the team if already gone down,
/// otherwise staged on the acting player. Promotes to a canasta at 7+
/// cards either way.
fn install_meld(game: &mut Game, player_id: PlayerId, meld: Meld) {
    if meld.is_canasta_eligible() {
        let canasta = meld.into_canasta();
        game.team_mut(player_id).canastas.push(canasta);
        game.players[player_id].made_canasta = true;
        return;
    }
    if game.team(player_id).gone_down {
        game.team_mut(player_id).melds.push(meld);
    } else {
        game.players[player_id].staging_melds.push(meld);
    }
}

fn add_to_meld(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let meld_id = mv.id.ok_or(RulesError::NoCards)? as u32;
    let ids = mv.ids_or_empty();
    if ids.is_empty() {
        return Err(RulesError::NoCards);
    }
    let cards = {
        let player = &game.players[mv.player_id];
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(*player.hand.get(id).ok_or(RulesError::CardNotFound(*id))?);
        }
        cards
    };

    let team = game.team_mut(mv.player_id);
    let meld = team
        .melds
        .iter_mut()
        .find(|m| m.id == meld_id)
        .ok_or(RulesError::MeldMismatch(meld_id))?;

    for card in &cards {
        if card.rank == Rank::Three {
            return Err(RulesError::InvalidCard("threes cannot be melded".into()));
        }
        let matches_rank = match meld.rank {
            MeldRank::Suited(r) => card.rank == r,
            MeldRank::Wild => false,
        };
        if !card.is_wild() && !matches_rank {
            return Err(RulesError::InvalidMeld("card rank does not match meld".into()));
        }
        if card.is_wild() && meld.rank == MeldRank::Suited(Rank::Seven) {
            return Err(RulesError::InvalidMeld("wilds cannot join a Sevens meld".into()));
        }
        let prospective_wilds = meld.wild_count + card.is_wild() as u8;
        if card.is_wild() && prospective_wilds > 3 {
            return Err(RulesError::InvalidMeld("wild count ceiling exceeded".into()));
        }
    }

    for card in &cards {
        if card.is_wild() {
            meld.wild_count += 1;
        }
        meld.cards.push(*card);
    }

    let promote = meld.is_canasta_eligible();
    let meld_id_to_remove = meld.id;
    game.players[mv.player_id].remove_from_hand(ids);

    if promote {
        let team = game.team_mut(mv.player_id);
        if let Some(pos) = team.melds.iter().position(|m| m.id == meld_id_to_remove) {
            let meld = team.melds.remove(pos);
            team.canastas.push(meld.into_canasta());
            game.players[mv.player_id].made_canasta = true;
        }
    }
    Ok(MoveOutcome::default())
}

fn burn_card(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let canasta_id = mv.id.ok_or(RulesError::NoCards)? as u32;
    let ids = mv.ids_or_empty();
    if ids.is_empty() {
        return Err(RulesError::NoCards);
    }
    let cards = {
        let player = &game.players[mv.player_id];
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(*player.hand.get(id).ok_or(RulesError::CardNotFound(*id))?);
        }
        cards
    };

    let team = game.team_mut(mv.player_id);
    let canasta = team
        .canastas
        .iter_mut()
        .find(|c| c.id == canasta_id)
        .ok_or(RulesError::MeldMismatch(canasta_id))?;

    for card in &cards {
        if card.rank == Rank::Three {
            return Err(RulesError::InvalidCard("threes cannot be melded".into()));
        }
        let matches_rank = match canasta.rank {
            MeldRank::Suited(r) => card.rank == r,
            MeldRank::Wild => false,
        };
        if !card.is_wild() && !matches_rank {
            return Err(RulesError::InvalidMeld("card rank does not match canasta".into()));
        }
        if card.is_wild() && canasta.natural {
            return Err(RulesError::InvalidMeld("wilds cannot join a natural canasta".into()));
        }
        if card.is_wild() && canasta.rank == MeldRank::Suited(Rank::Seven) {
            return Err(RulesError::InvalidMeld("wilds cannot join a Sevens canasta".into()));
        }
        let wild_count = canasta.cards.iter().filter(|c| c.is_wild()).count() as u8;
        if card.is_wild() && wild_count >= 3 {
            return Err(RulesError::InvalidMeld("wild count ceiling exceeded".into()));
        }
    }
    for card in &cards {
        canasta.cards.push(*card);
        canasta.count += 1;
    }
    game.players[mv.player_id].remove_from_hand(ids);
    Ok(MoveOutcome::default())
}

fn go_down(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let player_id = mv.player_id;
    let threshold = game.meld_requirement();
    let staged_total: i64 = game.players[player_id]
        .staging_melds
        .iter()
        .flat_map(|m| m.cards.iter())
        .map(|c| c.point_value() as i64)
        .sum();
    if staged_total < threshold {
        return Err(RulesError::InvalidMeld(format!(
            "staged melds total {staged_total}, need {threshold}"
        )));
    }

    let staged = std::mem::take(&mut game.players[player_id].staging_melds);
    for meld in staged {
        install_meld_after_gone_down(game, player_id, meld);
    }
    game.team_mut(player_id).gone_down = true;

    // Partner's speculative stagings are returned to the partner's hand.
    let partner_id = partner_of(player_id);
    let partner_staged = std::mem::take(&mut game.players[partner_id].staging_melds);
    for meld in partner_staged {
        game.players[partner_id].add_to_hand(meld.cards);
    }
    Ok(MoveOutcome::default())
}

/// Like `install_meld` but always installs onto the team (the acting
/// player has just gone down, so their own stagings are no longer
/// speculative).
fn install_meld_after_gone_down(game: &mut Game, player_id: PlayerId, meld: Meld) {
    if meld.is_canasta_eligible() {
        let canasta = meld.into_canasta();
        game.team_mut(player_id).canastas.push(canasta);
        game.players[player_id].made_canasta = true;
    } else {
        game.team_mut(player_id).melds.push(meld);
    }
}

fn discard(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let ids = mv.ids_or_empty();
    if ids.len() != 1 {
        return Err(RulesError::NoCards);
    }
    let card_id = ids[0];
    let can_go_out = game.team(mv.player_id).can_go_out;
    let hand_size = game.players[mv.player_id].hand_size();
    if !can_go_out && hand_size < 2 {
        return Err(RulesError::CannotGoOut);
    }
    let card = game.players[mv.player_id]
        .hand
        .get(&card_id)
        .copied()
        .ok_or(RulesError::CardNotFound(card_id))?;
    game.players[mv.player_id].remove_from_hand(&[card_id]);
    game.hand.discard_pile.push(card);

    let mut outcome = MoveOutcome::default();
    let hand_now_empty = game.players[mv.player_id].hand_size() == 0;
    if can_go_out && hand_now_empty {
        outcome.hand_ended = true;
        outcome.game_ended = advance_to_next_hand_or_end(game);
    }

    game.phase = Phase::Drawing;
    game.current_player = (game.current_player + 1) % 4;
    Ok(outcome)
}

/// Increment `handNumber`; if it now exceeds 4 the game has ended,
/// otherwise prepare the next hand's deal. Scoring itself is an external
/// collaborator and is not computed here.
fn advance_to_next_hand_or_end(game: &mut Game) -> bool {
    game.hand_number += 1;
    if game.hand_number > 4 {
        true
    } else {
        deal_hand(game, None);
        false
    }
}

fn pickup_foot(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    if !game.players[mv.player_id].made_canasta {
        return Err(RulesError::NoCanasta);
    }
    let foot = std::mem::take(&mut game.players[mv.player_id].foot);
    game.players[mv.player_id].add_to_hand(foot);
    Ok(MoveOutcome::default())
}

fn ask_to_go_out(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    if game.go_out_request_pending {
        return Err(RulesError::GoOutPending);
    }
    if !game.team(mv.player_id).has_all_categories() {
        return Err(RulesError::MissingCanasta);
    }
    let partner = partner_of(mv.player_id);
    game.go_out_request_pending = true;
    game.go_out_requester = Some(mv.player_id);
    game.go_out_partner = Some(partner);
    Ok(MoveOutcome {
        go_out_requested: Some((mv.player_id, partner)),
        ..Default::default()
    })
}

fn respond_go_out(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    if !game.go_out_request_pending {
        return Err(RulesError::NoRequest);
    }
    if game.go_out_partner != Some(mv.player_id) {
        return Err(RulesError::NotPartner);
    }
    let approved = mv.id == Some(1);
    let requester = game.go_out_requester.expect("request pending implies requester set");
    if approved {
        game.team_mut(requester).can_go_out = true;
    }
    game.go_out_request_pending = false;
    game.go_out_requester = None;
    game.go_out_partner = None;
    Ok(MoveOutcome {
        go_out_responded: Some((requester, approved)),
        ..Default::default()
    })
}

fn play_red_three(game: &mut Game, mv: &Move) -> Result<MoveOutcome, RulesError> {
    let ids = mv.ids_or_empty();
    if ids.is_empty() {
        return Err(RulesError::NoCards);
    }
    let cards = {
        let player = &game.players[mv.player_id];
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            let card = player.hand.get(id).ok_or(RulesError::CardNotFound(*id))?;
            if !card.is_red_three() {
                return Err(RulesError::InvalidCard(format!("{id} is not a red three")));
            }
            cards.push(*card);
        }
        cards
    };
    game.players[mv.player_id].remove_from_hand(ids);
    let team_id = team_of(mv.player_id);
    for card in cards {
        push_red_three(game, team_id, card);
    }
    let from_foot = mv.from_foot.unwrap_or(false);
    if !from_foot {
        let mut replacements = Vec::with_capacity(ids.len());
        for _ in ids {
            if let Some(card) = game.hand.deck.deal_card() {
                replacements.push(card);
            }
        }
        game.players[mv.player_id].add_to_hand(replacements);
    }
    Ok(MoveOutcome::default())
}

/// Meld validation algorithm.
fn validate_meld(cards: &[Card], id: u32) -> Result<Meld, RulesError> {
    if cards.len() < 3 {
        return Err(RulesError::InvalidMeld("a meld needs at least 3 cards".into()));
    }
    let mut rank: Option<Rank> = None;
    for card in cards {
        if card.rank == Rank::Three {
            return Err(RulesError::InvalidMeld("threes cannot be melded".into()));
        }
        if card.is_wild() {
            continue;
        }
        match rank {
            None => rank = Some(card.rank),
            Some(r) if r == card.rank => {}
            Some(_) => {
                return Err(RulesError::InvalidMeld("cards must share one rank".into()));
            }
        }
    }
    let wild_count = cards.iter().filter(|c| c.is_wild()).count() as u8;
    if rank == Some(Rank::Seven) && wild_count > 0 {
        return Err(RulesError::InvalidMeld("Sevens melds cannot contain wilds".into()));
    }
    if rank.is_some() && wild_count > 3 {
        return Err(RulesError::InvalidMeld("wild count ceiling exceeded".into()));
    }
    let meld_rank = match rank {
        Some(r) => MeldRank::Suited(r),
        None => MeldRank::Wild,
    };
    Ok(Meld {
        id,
        rank: meld_rank,
        cards: cards.to_vec(),
        wild_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Suit;

    fn sample_game() -> Game {
        new_game(
            "g1".into(),
            [
                "Alice".into(),
                "Bob".into(),
                "Carol".into(),
                "Dave".into(),
            ],
            Some(42),
        )
    }

    fn card(id: u32, suit: Suit, rank: Rank) -> Card {
        Card { id, suit, rank }
    }

    #[test]
    fn fresh_deal_matches_spec_counts() {
        let game = sample_game();
        for p in &game.players {
            assert_eq!(p.hand_size(), 15);
            assert_eq!(p.foot.len(), 11);
        }
        assert_eq!(game.hand.deck.len(), 216 - 4 * 15 - 4 * 11 - 1);
        assert_eq!(game.hand.discard_pile.len(), 1);
    }

    #[test]
    fn draw_from_deck_requires_turn_owner_and_drawing_phase() {
        let mut game = sample_game();
        let mv = Move {
            player_id: 1,
            move_type: MoveType::DrawFromDeck,
            id: None,
            ids: None,
            from_foot: None,
        };
        let before = game.clone_for_test();
        let err = execute_move(&mut game, &mv).unwrap_err();
        assert_eq!(err, RulesError::NotYourTurn);
        assert_eq!(format!("{:?}", game), format!("{:?}", before));
    }

    #[test]
    fn draw_from_deck_transitions_to_playing() {
        let mut game = sample_game();
        let before_size = game.players[0].hand_size();
        let mv = Move {
            player_id: 0,
            move_type: MoveType::DrawFromDeck,
            id: None,
            ids: None,
            from_foot: None,
        };
        execute_move(&mut game, &mv).unwrap();
        assert_eq!(game.phase, Phase::Playing);
        assert_eq!(game.players[0].hand_size(), before_size + 2);
    }

    #[test]
    fn create_meld_rejects_fewer_than_three_cards() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.players[0].hand.clear();
        game.players[0].add_to_hand([card(900, Suit::Hearts, Rank::King)]);
        let mv = Move {
            player_id: 0,
            move_type: MoveType::CreateMeld,
            id: None,
            ids: Some(vec![900]),
            from_foot: None,
        };
        let err = execute_move(&mut game, &mv).unwrap_err();
        assert_eq!(err.code(), "INVALID_MELD");
    }

    #[test]
    fn create_meld_installs_as_staging_before_gone_down() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.players[0].hand.clear();
        game.players[0].add_to_hand([
            card(900, Suit::Hearts, Rank::King),
            card(901, Suit::Spades, Rank::King),
            card(902, Suit::Clubs, Rank::King),
        ]);
        let mv = Move {
            player_id: 0,
            move_type: MoveType::CreateMeld,
            id: None,
            ids: Some(vec![900, 901, 902]),
            from_foot: None,
        };
        execute_move(&mut game, &mv).unwrap();
        assert_eq!(game.players[0].staging_melds.len(), 1);
        assert_eq!(game.players[0].hand_size(), 0);
    }

    #[test]
    fn go_down_promotes_stagings_and_returns_partners() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.players[0].staging_melds.push(Meld {
            id: 1,
            rank: MeldRank::Suited(Rank::King),
            cards: (0..7).map(|i| card(1000 + i, Suit::Hearts, Rank::King)).collect(),
            wild_count: 0,
        });
        game.players[2].staging_melds.push(Meld {
            id: 2,
            rank: MeldRank::Suited(Rank::Queen),
            cards: vec![
                card(2000, Suit::Hearts, Rank::Queen),
                card(2001, Suit::Spades, Rank::Queen),
                card(2002, Suit::Clubs, Rank::Queen),
            ],
            wild_count: 0,
        });
        let mv = Move {
            player_id: 0,
            move_type: MoveType::GoDown,
            id: None,
            ids: None,
            from_foot: None,
        };
        execute_move(&mut game, &mv).unwrap();
        assert!(game.team_a.gone_down);
        assert_eq!(game.team_a.canastas.len(), 1);
        assert!(game.players[2].staging_melds.is_empty());
        assert!(game.players[2].hand.contains_key(&2000));
    }

    #[test]
    fn ask_to_go_out_requires_all_four_categories() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        let err = execute_move(
            &mut game,
            &Move {
                player_id: 0,
                move_type: MoveType::AskToGoOut,
                id: None,
                ids: None,
                from_foot: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, RulesError::MissingCanasta);
    }

    #[test]
    fn ask_to_go_out_then_respond_go_out_full_protocol() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.team_a.canastas = vec![
            Canasta {
                id: 1,
                rank: MeldRank::Wild,
                cards: vec![card(1, Suit::Wild, Rank::Joker); 7],
                count: 7,
                natural: false,
            },
            Canasta {
                id: 2,
                rank: MeldRank::Suited(Rank::Seven),
                cards: vec![card(2, Suit::Hearts, Rank::Seven); 7],
                count: 7,
                natural: true,
            },
            Canasta {
                id: 3,
                rank: MeldRank::Suited(Rank::King),
                cards: vec![card(3, Suit::Hearts, Rank::King); 7],
                count: 7,
                natural: false,
            },
        ];
        let outcome = execute_move(
            &mut game,
            &Move {
                player_id: 0,
                move_type: MoveType::AskToGoOut,
                id: None,
                ids: None,
                from_foot: None,
            },
        )
        .unwrap();
        assert_eq!(outcome.go_out_requested, Some((0, 2)));
        assert!(!game.team_a.can_go_out);

        // Bob (not partner) may not respond.
        let err = execute_move(
            &mut game,
            &Move {
                player_id: 1,
                move_type: MoveType::RespondGoOut,
                id: Some(1),
                ids: None,
                from_foot: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, RulesError::NotPartner);

        // Carol (the partner) approves.
        let outcome = execute_move(
            &mut game,
            &Move {
                player_id: 2,
                move_type: MoveType::RespondGoOut,
                id: Some(1),
                ids: None,
                from_foot: None,
            },
        )
        .unwrap();
        assert_eq!(outcome.go_out_responded, Some((0, true)));
        assert!(game.team_a.can_go_out);
        assert!(!game.go_out_request_pending);
    }

    #[test]
    fn respond_go_out_runs_without_turn_ownership() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.current_player = 0;
        game.go_out_request_pending = true;
        game.go_out_requester = Some(0);
        game.go_out_partner = Some(2);
        // Carol is not the current player yet may still respond.
        let outcome = execute_move(
            &mut game,
            &Move {
                player_id: 2,
                move_type: MoveType::RespondGoOut,
                id: Some(0),
                ids: None,
                from_foot: None,
            },
        )
        .unwrap();
        assert_eq!(outcome.go_out_responded, Some((0, false)));
        assert!(!game.team_a.can_go_out);
    }

    #[test]
    fn discard_requires_two_cards_without_go_out_permission() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.players[0].hand.clear();
        game.players[0].add_to_hand([card(5000, Suit::Hearts, Rank::King)]);
        let err = execute_move(
            &mut game,
            &Move {
                player_id: 0,
                move_type: MoveType::Discard,
                id: None,
                ids: Some(vec![5000]),
                from_foot: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, RulesError::CannotGoOut);
    }

    #[test]
    fn discard_with_permission_and_empty_hand_ends_the_hand() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        game.team_a.can_go_out = true;
        game.players[0].hand.clear();
        game.players[0].add_to_hand([card(5000, Suit::Hearts, Rank::King)]);
        let outcome = execute_move(
            &mut game,
            &Move {
                player_id: 0,
                move_type: MoveType::Discard,
                id: None,
                ids: Some(vec![5000]),
                from_foot: None,
            },
        )
        .unwrap();
        assert!(outcome.hand_ended);
        assert_eq!(game.hand_number, 2);
        assert_eq!(game.current_player, 1);
        assert_eq!(game.phase, Phase::Drawing);
    }

    #[test]
    fn pickup_foot_requires_completed_canasta() {
        let mut game = sample_game();
        game.phase = Phase::Playing;
        let err = execute_move(
            &mut game,
            &Move {
                player_id: 0,
                move_type: MoveType::PickupFoot,
                id: None,
                ids: None,
                from_foot: None,
            },
        )
        .unwrap_err();
        assert_eq!(err, RulesError::NoCanasta);
    }

    #[test]
    fn failed_move_leaves_game_bit_for_bit_unchanged() {
        let mut game = sample_game();
        let before = format!("{:?}", game);
        let mv = Move {
            player_id: 3,
            move_type: MoveType::Discard,
            id: None,
            ids: Some(vec![0]),
            from_foot: None,
        };
        let _ = execute_move(&mut game, &mv);
        assert_eq!(format!("{:?}", game), before);
    }
}

#[cfg(test)]
impl Game {
    fn clone_for_test(&self) -> Game {
        self.clone()
    }
}
