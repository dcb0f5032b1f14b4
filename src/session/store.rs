use log::{debug, warn};
use uuid::Uuid;

use crate::models::snapshot::{
    DrawOfferState, GameSnapshot, GameUpdate, MoveRecord, Side, UpdateSource,
};

/// Outcome of feeding one update into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Accepted,
    /// The update lost the ordering race and changed nothing.
    Stale,
}

/// A move submitted optimistically, held until an authoritative update
/// reaches the ply it represents or the submission is rejected.
#[derive(Debug, Clone)]
pub struct PendingMove {
    pub id: Uuid,
    /// Ply this move lands at once confirmed.
    pub ply: u32,
    pub uci: String,
}

/// The in-memory state of one game session.
///
/// All mutation happens on the session's single-threaded event loop, so no
/// locking is involved; delivery order between the poll and push channels is
/// whatever the loop sees, and the ply ordering rule in [`apply`] is the sole
/// defense against out-of-order arrival.
///
/// The ordering key is the last *authoritative* ply. Optimistic moves render
/// ahead of it without advancing it, which is what lets the forced re-fetch
/// after a rejection (same authoritative ply) win and restore ground truth.
///
/// [`apply`]: SessionStore::apply
#[derive(Debug, Default)]
pub struct SessionStore {
    confirmed: Option<GameSnapshot>,
    authoritative_ply: Option<u32>,
    pending: Vec<PendingMove>,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore::default()
    }

    /// Merge an update from either channel. Fields absent from the update
    /// leave the stored values unchanged; a ply older than the held one is
    /// discarded wholesale. Push updates that omit the ply advance the last
    /// known ply by exactly one half-move.
    pub fn apply(&mut self, update: GameUpdate, source: UpdateSource) -> ApplyOutcome {
        let effective_ply = match (update.current_ply, self.authoritative_ply) {
            (Some(ply), _) => ply,
            (None, Some(held)) => held + 1,
            (None, None) => {
                warn!("Dropping {:?} update with no ply before the first snapshot", source);
                return ApplyOutcome::Stale;
            }
        };

        if let Some(held) = self.authoritative_ply {
            if effective_ply < held {
                debug!(
                    "Discarding stale {:?} update: ply {} < held {}",
                    source, effective_ply, held
                );
                return ApplyOutcome::Stale;
            }
        }

        if self.confirmed.is_none() {
            match first_snapshot(&update, effective_ply) {
                Some(built) => self.confirmed = Some(built),
                None => {
                    // A delta has nothing to merge into; the snapshot is born
                    // from the first full poll payload.
                    warn!("Dropping incomplete {:?} update before the first snapshot", source);
                    return ApplyOutcome::Stale;
                }
            }
        }
        let Some(snapshot) = self.confirmed.as_mut() else {
            return ApplyOutcome::Stale;
        };

        if let Some(v) = update.game_id {
            snapshot.game_id = v;
        }
        if let Some(v) = update.player1_id {
            snapshot.player1_id = v;
        }
        if let Some(v) = update.player2_id {
            snapshot.player2_id = v;
        }
        if let Some(v) = update.status {
            snapshot.status = v;
        }
        if let Some(v) = update.fen {
            snapshot.fen = v;
        }
        if let Some(v) = update.white_time {
            snapshot.white_time = v;
        }
        if let Some(v) = update.black_time {
            snapshot.black_time = v;
        }
        if let Some(v) = update.last_move_at {
            snapshot.last_move_at = Some(v);
        }
        if let Some(v) = update.draw_offer {
            snapshot.draw_offer = v;
        }
        if let Some(list) = update.moves {
            snapshot.moves = list;
        }
        if let Some(uci) = update.appended_move_uci {
            if snapshot.moves.last().map(|m| m.ply) != Some(effective_ply) {
                snapshot.moves.push(MoveRecord {
                    ply: effective_ply,
                    side: Side::for_ply(effective_ply.saturating_sub(1)),
                    uci,
                    san: None,
                });
            }
        }
        snapshot.current_ply = effective_ply;

        self.authoritative_ply = Some(effective_ply);
        let before = self.pending.len();
        self.pending.retain(|p| p.ply > effective_ply);
        if self.pending.len() != before {
            debug!("Retired {} pending move(s) at ply {}", before - self.pending.len(), effective_ply);
        }

        debug!("Applied {:?} update at ply {}", source, effective_ply);
        ApplyOutcome::Accepted
    }

    /// Record an optimistic move on top of the confirmed state. Returns
    /// `None` until a first snapshot exists to move on.
    pub fn stage_move(&mut self, uci: String) -> Option<PendingMove> {
        let base = self.authoritative_ply?;
        let pending = PendingMove {
            id: Uuid::new_v4(),
            ply: base + self.pending.len() as u32 + 1,
            uci,
        };
        self.pending.push(pending.clone());
        Some(pending)
    }

    /// Revert one optimistic move after the backend rejected it. The caller
    /// follows up with a forced re-fetch; ground truth comes only from the
    /// next authoritative snapshot, never from a local diff.
    pub fn drop_pending(&mut self, id: Uuid) {
        self.pending.retain(|p| p.id != id);
    }

    /// Clear the local draw offer immediately, ahead of the network result,
    /// so the prompt cannot reappear while the response is in flight.
    pub fn clear_draw_offer(&mut self) {
        if let Some(snapshot) = self.confirmed.as_mut() {
            snapshot.draw_offer = DrawOfferState::None;
        }
    }

    /// Last authoritative snapshot, without optimistic overlay.
    pub fn confirmed(&self) -> Option<&GameSnapshot> {
        self.confirmed.as_ref()
    }

    /// What the UI should show: the confirmed state with any pending moves
    /// layered on top (history appended, turn flipped).
    pub fn view(&self) -> Option<GameSnapshot> {
        let mut snapshot = self.confirmed.clone()?;
        for pending in &self.pending {
            snapshot.current_ply += 1;
            snapshot.moves.push(MoveRecord {
                ply: snapshot.current_ply,
                side: Side::for_ply(snapshot.current_ply - 1),
                uci: pending.uci.clone(),
                san: None,
            });
        }
        Some(snapshot)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn first_snapshot(update: &GameUpdate, ply: u32) -> Option<GameSnapshot> {
    Some(GameSnapshot {
        game_id: update.game_id?,
        player1_id: update.player1_id?,
        player2_id: update.player2_id?,
        status: update.status.clone()?,
        current_ply: ply,
        fen: update.fen.clone()?,
        white_time: update.white_time.unwrap_or(None),
        black_time: update.black_time.unwrap_or(None),
        last_move_at: update.last_move_at,
        draw_offer: update.draw_offer.clone().unwrap_or_default(),
        moves: Vec::new(),
    })
}
