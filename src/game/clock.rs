use chrono::{DateTime, Utc};

use crate::models::snapshot::{GameSnapshot, Side};

/// Displayed state of one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockView {
    /// Whole seconds left; `None` for an untimed game.
    pub remaining: Option<u32>,
    pub running: bool,
}

/// Both countdown clocks, anchored to the server's last-move instant.
///
/// Display-only: the clocks never signal a timeout themselves. Authoritative
/// time forfeit arrives from the backend as a terminal status in a later
/// snapshot.
#[derive(Debug, Default)]
pub struct ClockPair {
    white_anchor: Option<u32>,
    black_anchor: Option<u32>,
    anchored_at: Option<DateTime<Utc>>,
    active: Option<Side>,
}

impl ClockPair {
    pub fn new() -> ClockPair {
        ClockPair::default()
    }

    /// Re-anchor both clocks from an accepted snapshot. When the snapshot
    /// carries no server instant (push-applied updates), the receipt instant
    /// stands in for it.
    pub fn resync(&mut self, snapshot: &GameSnapshot, received_at: DateTime<Utc>) {
        self.white_anchor = snapshot.white_time;
        self.black_anchor = snapshot.black_time;
        self.anchored_at = Some(snapshot.last_move_at.unwrap_or(received_at));
        self.active = if snapshot.status.in_progress() {
            Some(snapshot.side_to_move())
        } else {
            None
        };
    }

    /// Remaining time for one side at a given instant. The active side's
    /// value subtracts the whole seconds elapsed since the anchor, correcting
    /// for the delay between the server event and us hearing about it, and
    /// floors at zero. The inactive side holds its anchored value.
    pub fn view(&self, side: Side, now: DateTime<Utc>) -> ClockView {
        let anchor = match side {
            Side::White => self.white_anchor,
            Side::Black => self.black_anchor,
        };
        let Some(anchor) = anchor else {
            return ClockView {
                remaining: None,
                running: false,
            };
        };

        if self.active == Some(side) {
            if let Some(anchored_at) = self.anchored_at {
                let elapsed = (now - anchored_at).num_seconds().clamp(0, u32::MAX as i64) as u32;
                let remaining = anchor.saturating_sub(elapsed);
                return ClockView {
                    remaining: Some(remaining),
                    running: remaining > 0,
                };
            }
        }

        ClockView {
            remaining: Some(anchor),
            running: false,
        }
    }
}

/// "m:ss" for a ticking clock, the placeholder for an untimed one.
pub fn format_clock(view: ClockView) -> String {
    match view.remaining {
        None => "--:--".to_string(),
        Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
    }
}
