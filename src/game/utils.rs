use std::str::FromStr;

use chess::{Board, Color, File, Piece, Rank, Square};

use crate::game::turn::{TurnView, ViewerRole};
use crate::models::snapshot::{GameSnapshot, GameStatus, Side};

/// Render the position as an ASCII board oriented to the given side.
pub fn render_board(fen: &str, perspective: Side) -> String {
    let board = match Board::from_str(fen) {
        Ok(board) => board,
        Err(_) => return "(position unavailable)".to_string(),
    };

    let ranks: Vec<usize> = match perspective {
        Side::White => (0..8).rev().collect(),
        Side::Black => (0..8).collect(),
    };
    let files: Vec<usize> = match perspective {
        Side::White => (0..8).collect(),
        Side::Black => (0..8).rev().collect(),
    };

    let mut out = String::new();
    for &rank in &ranks {
        out.push_str(&format!("{} ", rank + 1));
        for &file in &files {
            let square = Square::make_square(Rank::from_index(rank), File::from_index(file));
            out.push(piece_char(board.piece_on(square), board.color_on(square)));
            out.push(' ');
        }
        out.push('\n');
    }
    out.push_str("  ");
    for &file in &files {
        out.push((b'a' + file as u8) as char);
        out.push(' ');
    }
    out
}

fn piece_char(piece: Option<Piece>, color: Option<Color>) -> char {
    let (piece, color) = match (piece, color) {
        (Some(piece), Some(color)) => (piece, color),
        _ => return '.',
    };
    let ch = match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    };
    if color == Color::White {
        ch.to_ascii_uppercase()
    } else {
        ch
    }
}

/// Display-side check detection from the position. Legality itself stays on
/// the backend.
pub fn in_check(fen: &str) -> bool {
    Board::from_str(fen)
        .map(|board| board.checkers().0 > 0)
        .unwrap_or(false)
}

/// The human status line for the session header.
pub fn status_line(snapshot: &GameSnapshot, turn: &TurnView) -> String {
    if let GameStatus::Ended(reason) = &snapshot.status {
        return format!("Game Over: {}", reason);
    }

    let check = if in_check(&snapshot.fen) { " (check)" } else { "" };
    match turn.role {
        ViewerRole::Spectator => format!("Spectating{}", check),
        ViewerRole::SelfPlayDual => format!(
            "Your Turn ({}){}",
            snapshot.side_to_move().label(),
            check
        ),
        ViewerRole::White | ViewerRole::Black => {
            if turn.is_viewer_turn {
                format!("Your Turn{}", check)
            } else {
                format!("Opponent's Turn{}", check)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::turn::resolve;
    use crate::models::snapshot::DrawOfferState;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn snapshot(status: GameStatus, ply: u32) -> GameSnapshot {
        GameSnapshot {
            game_id: 42,
            player1_id: 5,
            player2_id: 7,
            status,
            current_ply: ply,
            fen: START_FEN.to_string(),
            white_time: None,
            black_time: None,
            last_move_at: None,
            draw_offer: DrawOfferState::None,
            moves: Vec::new(),
        }
    }

    #[test]
    fn board_renders_from_both_perspectives() {
        let white_view = render_board(START_FEN, Side::White);
        assert!(white_view.starts_with("8 r n b q k b n r"));
        assert!(white_view.trim_end().ends_with("a b c d e f g h"));

        let black_view = render_board(START_FEN, Side::Black);
        assert!(black_view.starts_with("1 R N B K Q B N R"));
        assert!(black_view.trim_end().ends_with("h g f e d c b a"));
    }

    #[test]
    fn bad_fen_degrades_to_placeholder() {
        assert_eq!(render_board("not a fen", Side::White), "(position unavailable)");
        assert!(!in_check("not a fen"));
    }

    #[test]
    fn check_detected_from_position() {
        // Scholar's-mate style queen check against the black king.
        let checked = "rnbqkbnr/ppppp1pp/5p2/7Q/4P3/8/PPPP1PPP/RNB1KBNR b KQkq - 1 2";
        assert!(in_check(checked));
        assert!(!in_check(START_FEN));
    }

    #[test]
    fn status_line_follows_role_and_turn() {
        let snap = snapshot(GameStatus::InProgress, 0);
        assert_eq!(status_line(&snap, &resolve(5, 7, 5, 0)), "Your Turn");
        assert_eq!(status_line(&snap, &resolve(5, 7, 7, 0)), "Opponent's Turn");
        assert_eq!(status_line(&snap, &resolve(5, 7, 11, 0)), "Spectating");
        assert_eq!(status_line(&snap, &resolve(9, 9, 9, 0)), "Your Turn (White)");

        let snap = snapshot(GameStatus::InProgress, 1);
        assert_eq!(status_line(&snap, &resolve(9, 9, 9, 1)), "Your Turn (Black)");

        let snap = snapshot(GameStatus::Ended("DRAW".to_string()), 30);
        assert_eq!(status_line(&snap, &resolve(5, 7, 5, 30)), "Game Over: DRAW");
    }
}
