use crate::models::snapshot::Side;

/// What the viewer is to this game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerRole {
    White,
    Black,
    Spectator,
    /// The viewer holds both seats and always has the move; the seat they are
    /// acting from flips with ply parity.
    SelfPlayDual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnView {
    pub role: ViewerRole,
    /// Seat the viewer is acting from right now; `None` for spectators.
    pub seat: Option<Side>,
    pub is_viewer_turn: bool,
}

/// Derive the viewer's role and turn status from raw snapshot data.
///
/// Pure and re-evaluated on every snapshot. Never cache the result across
/// updates: in self-play the controlled seat changes every ply, and a cached
/// value goes stale across any asynchronous boundary.
pub fn resolve(player1_id: i64, player2_id: i64, viewer_id: i64, current_ply: u32) -> TurnView {
    let to_move = Side::for_ply(current_ply);

    if player1_id == viewer_id && player2_id == viewer_id {
        return TurnView {
            role: ViewerRole::SelfPlayDual,
            seat: Some(to_move),
            is_viewer_turn: true,
        };
    }

    if viewer_id == player1_id {
        TurnView {
            role: ViewerRole::White,
            seat: Some(Side::White),
            is_viewer_turn: to_move == Side::White,
        }
    } else if viewer_id == player2_id {
        TurnView {
            role: ViewerRole::Black,
            seat: Some(Side::Black),
            is_viewer_turn: to_move == Side::Black,
        }
    } else {
        TurnView {
            role: ViewerRole::Spectator,
            seat: None,
            is_viewer_turn: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_player_on_even_ply_has_the_move() {
        let view = resolve(5, 7, 5, 4);
        assert_eq!(view.role, ViewerRole::White);
        assert_eq!(view.seat, Some(Side::White));
        assert!(view.is_viewer_turn);

        let view = resolve(5, 7, 5, 5);
        assert!(!view.is_viewer_turn);
    }

    #[test]
    fn black_player_mirrors_parity() {
        let view = resolve(5, 7, 7, 4);
        assert_eq!(view.role, ViewerRole::Black);
        assert!(!view.is_viewer_turn);

        let view = resolve(5, 7, 7, 5);
        assert!(view.is_viewer_turn);
    }

    #[test]
    fn spectator_never_has_the_move() {
        for ply in 0..6 {
            let view = resolve(5, 7, 11, ply);
            assert_eq!(view.role, ViewerRole::Spectator);
            assert_eq!(view.seat, None);
            assert!(!view.is_viewer_turn);
        }
    }

    #[test]
    fn self_play_always_to_move_with_alternating_seat() {
        for ply in 0..8 {
            let view = resolve(9, 9, 9, ply);
            assert_eq!(view.role, ViewerRole::SelfPlayDual);
            assert!(view.is_viewer_turn);
            assert_eq!(view.seat, Some(Side::for_ply(ply)));
        }
    }
}
