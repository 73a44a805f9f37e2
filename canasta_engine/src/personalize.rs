//! Personalizer: projects the authoritative `Game` to a per-viewer
//! `ClientState`, hiding every other player's hand.

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::game::{partner_of, team_of, Game, Phase, PlayerId, TeamId};

/// What a viewer sees of an opponent: never the cards themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentSummary {
    pub name: String,
    pub hand_length: usize,
    pub has_foot: bool,
}

/// Shared, per-team view data: identical for every viewer on that team.
/// Wrapped in `Arc` at the broadcast layer to avoid re-cloning identical
/// meld/canasta vectors once per connection (see `arc_serde`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub score: i64,
    pub melds: Vec<crate::game::Meld>,
    pub canastas: Vec<crate::game::Canasta>,
    pub red_threes: Vec<Card>,
    pub gone_down: bool,
}

/// The per-player projection of `Game` sent in `game_state` broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub hand: Vec<Card>,
    pub foot_size: usize,
    pub staging_melds: Option<Vec<crate::game::Meld>>,
    pub opponents: Vec<OpponentSummary>,
    pub own_team: TeamView,
    pub opposing_team: TeamView,
    pub deck_count: usize,
    pub discard_count: usize,
    pub discard_top: Option<Card>,
    pub go_out_request_pending: bool,
    pub is_go_out_requester: bool,
    pub is_go_out_partner: bool,
}

/// `{state, currentPlayer, phase, status}`. `status` is supplied by the
/// caller since it lives on `ActiveGame`, not `Game`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateMessage {
    pub state: ClientState,
    pub current_player: PlayerId,
    pub phase: Phase,
    pub status: String,
}

fn team_view(game: &Game, team_id: TeamId) -> TeamView {
    let team = match team_id {
        TeamId::A => &game.team_a,
        TeamId::B => &game.team_b,
    };
    TeamView {
        score: team.score,
        melds: team.melds.clone(),
        canastas: team.canastas.clone(),
        red_threes: team.red_threes.clone(),
        gone_down: team.gone_down,
    }
}

/// Build the `ClientState` for `viewer`.
pub fn personalize(game: &Game, viewer: PlayerId) -> ClientState {
    let own_team_id = team_of(viewer);
    let opposing_team_id = match own_team_id {
        TeamId::A => TeamId::B,
        TeamId::B => TeamId::A,
    };

    let mut hand: Vec<Card> = game.players[viewer].hand.values().copied().collect();
    hand.sort_by_key(|c| c.id);

    let opponents = (0..4usize)
        .filter(|&i| i != viewer)
        .map(|i| OpponentSummary {
            name: game.players[i].name.clone(),
            hand_length: game.players[i].hand_size(),
            has_foot: !game.players[i].foot.is_empty(),
        })
        .collect();

    let own_team = game.team(viewer);
    let staging_melds = if !own_team.gone_down {
        Some(game.players[viewer].staging_melds.clone())
    } else {
        None
    };

    ClientState {
        hand,
        foot_size: game.players[viewer].foot.len(),
        staging_melds,
        opponents,
        own_team: team_view(game, own_team_id),
        opposing_team: team_view(game, opposing_team_id),
        deck_count: game.hand.deck.len(),
        discard_count: game.hand.discard_pile.len(),
        discard_top: game.hand.discard_pile.top().copied(),
        go_out_request_pending: game.go_out_request_pending,
        is_go_out_requester: game.go_out_requester == Some(viewer),
        is_go_out_partner: game.go_out_partner == Some(viewer),
    }
}

/// Convenience: the requester's partner is always `partner_of(requester)`,
/// exposed here so the broadcaster doesn't need to import `game::model`
/// directly for this one computation.
pub fn go_out_partner(requester: PlayerId) -> PlayerId {
    partner_of(requester)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::new_game;

    #[test]
    fn viewer_never_sees_opponent_hands() {
        let game = new_game(
            "g1".into(),
            [
                "Alice".into(),
                "Bob".into(),
                "Carol".into(),
                "Dave".into(),
            ],
            Some(1),
        );
        let state = personalize(&game, 0);
        assert_eq!(state.hand.len(), 15);
        assert_eq!(state.opponents.len(), 3);
        for opp in &state.opponents {
            assert_eq!(opp.hand_length, 15);
        }
    }

    #[test]
    fn staging_melds_hidden_once_team_has_gone_down() {
        let mut game = new_game(
            "g1".into(),
            [
                "Alice".into(),
                "Bob".into(),
                "Carol".into(),
                "Dave".into(),
            ],
            Some(1),
        );
        game.team_a.gone_down = true;
        let state = personalize(&game, 0);
        assert!(state.staging_melds.is_none());
    }

    #[test]
    fn discard_top_is_none_when_pile_empty() {
        let mut game = new_game(
            "g1".into(),
            [
                "Alice".into(),
                "Bob".into(),
                "Carol".into(),
                "Dave".into(),
            ],
            Some(1),
        );
        game.hand.discard_pile.pop_top();
        let state = personalize(&game, 0);
        assert!(state.discard_top.is_none());
    }
}
