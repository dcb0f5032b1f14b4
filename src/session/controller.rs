use std::time::Duration;

use actix::prelude::*;
use chrono::Utc;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, info, warn};

use crate::error::ClientError;
use crate::game::clock::{ClockPair, ClockView};
use crate::game::encode::{encode_uci, MoveGesture};
use crate::game::turn::{self, TurnView};
use crate::models::messages::{GamePayload, MoveBody};
use crate::models::session_context::SessionContext;
use crate::models::snapshot::{GameSnapshot, GameStatus, GameUpdate, Side, UpdateSource};
use crate::session::channel::{CloseChannel, GameChannel, PublishMove};
use crate::session::store::{ApplyOutcome, SessionStore};

/// Redundancy fallback: the poll keeps the session usable even with the push
/// channel down.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
const CLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of one game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// First poll issued, push channel opening; nothing landed yet.
    Connecting,
    /// First snapshot held; both channels merge into the store.
    Live,
    /// The game finished. Timers and channel are torn down; the final
    /// snapshot stays visible and outbound actions are refused.
    Terminal,
    /// Session torn down entirely (user navigated away).
    Closed,
}

/// What the session reports to the rendering layer.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub snapshot: GameSnapshot,
    pub turn: TurnView,
    pub prompt_draw: bool,
}

#[derive(Debug)]
pub enum SessionEvent {
    Refreshed(SessionView),
    Clock { white: ClockView, black: ClockView },
    /// An outbound action was refused; the reason is user-visible.
    Rejected(String),
    /// The game reached a terminal status.
    Ended(String),
    /// The session released its resources; nothing further will arrive.
    Closed,
}

/// An update produced by either inbound channel.
#[derive(Message)]
#[rtype(result = "()")]
pub struct InboundUpdate {
    pub update: GameUpdate,
    pub source: UpdateSource,
}

/// The push channel went away; the poll carries the session alone.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ChannelDown;

#[derive(Message)]
#[rtype(result = "()")]
pub struct SubmitMove {
    pub gesture: MoveGesture,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Resign;

#[derive(Message)]
#[rtype(result = "()")]
pub struct OfferDraw;

#[derive(Message)]
#[rtype(result = "()")]
pub struct RespondDraw {
    pub accept: bool,
}

/// Tear the session down. Reachable from every phase.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

/// Reconciliation controller for one game.
///
/// Runs on the single-threaded event loop; poll responses, push frames,
/// timer ticks and user actions are interleaved callbacks, never parallel,
/// so the store needs no lock. Delivery order between the two inbound
/// channels is not server order; the store's ply rule handles that.
pub struct GameSession {
    context: SessionContext,
    http: awc::Client,
    game_id: i64,
    phase: SessionPhase,
    store: SessionStore,
    clocks: ClockPair,
    channel: Option<Addr<GameChannel>>,
    poll_handle: Option<SpawnHandle>,
    clock_handle: Option<SpawnHandle>,
    events: UnboundedSender<SessionEvent>,
}

impl GameSession {
    pub fn new(
        context: SessionContext,
        game_id: i64,
        events: UnboundedSender<SessionEvent>,
    ) -> GameSession {
        let http = awc::Client::builder()
            .add_default_header(("X-USER-ID", context.viewer_id().to_string()))
            .finish();
        GameSession {
            context,
            http,
            game_id,
            phase: SessionPhase::Connecting,
            store: SessionStore::new(),
            clocks: ClockPair::new(),
            channel: None,
            poll_handle: None,
            clock_handle: None,
            events,
        }
    }

    fn over(&self) -> bool {
        matches!(self.phase, SessionPhase::Terminal | SessionPhase::Closed)
    }

    /// Refuse an outbound action once the session is over.
    fn refuse_if_over(&mut self, what: &str) -> bool {
        if self.over() {
            warn!("Ignoring {} after session end", what);
            self.emit(SessionEvent::Rejected(ClientError::SessionEnded.to_string()));
            true
        } else {
            false
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        if self.events.unbounded_send(event).is_err() {
            debug!("Session event consumer is gone");
        }
    }

    /// Fetch the authoritative snapshot now instead of waiting for a timer.
    fn refresh(&mut self, ctx: &mut Context<Self>) {
        if self.over() {
            return;
        }
        let http = self.http.clone();
        let url = self.context.rest_url(&format!("games/{}", self.game_id));
        let fut = async move {
            let mut resp = http
                .get(url)
                .send()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(ClientError::Transport(format!(
                    "poll returned {}",
                    resp.status()
                )));
            }
            resp.json::<GamePayload>()
                .await
                .map_err(|e| ClientError::MalformedPayload(e.to_string()))
        };
        ctx.spawn(fut.into_actor(self).map(|result, act, ctx| match result {
            Ok(payload) => match payload.into_update() {
                Ok(update) => act.ingest(update, UpdateSource::Poll, ctx),
                Err(e) => warn!("Dropping malformed poll payload: {}", e),
            },
            // Tolerated: the push channel may still be delivering.
            Err(e) => debug!("Poll failed: {}", e),
        }));
    }

    fn open_channel(&mut self, ctx: &mut Context<Self>) {
        let ws_url = self.context.ws_url();
        let viewer = self.context.viewer_id();
        let fut = async move {
            awc::Client::new()
                .ws(ws_url)
                .header("X-USER-ID", viewer.to_string())
                .connect()
                .await
        };
        ctx.spawn(fut.into_actor(self).map(|result, act, ctx| match result {
            Ok((_resp, framed)) => {
                if act.over() {
                    // The session ended while the handshake was in flight.
                    return;
                }
                act.channel = Some(GameChannel::start(act.game_id, framed, ctx.address()));
            }
            Err(e) => warn!("Push channel connect failed, continuing on poll alone: {}", e),
        }));
    }

    /// Single funnel for both inbound channels.
    fn ingest(&mut self, update: GameUpdate, source: UpdateSource, ctx: &mut Context<Self>) {
        if self.over() {
            // A late in-flight response after teardown counts as stale.
            debug!("Dropping {:?} update delivered after teardown", source);
            return;
        }
        match self.store.apply(update, source) {
            ApplyOutcome::Stale => {}
            ApplyOutcome::Accepted => {
                if self.phase == SessionPhase::Connecting {
                    info!("First snapshot landed, game {} session is live", self.game_id);
                    self.phase = SessionPhase::Live;
                }
                if let Some(confirmed) = self.store.confirmed() {
                    self.clocks.resync(confirmed, Utc::now());
                }
                if self.store.has_pending() {
                    debug!("Optimistic move(s) still awaiting confirmation");
                }
                if let Some(snapshot) = self.store.view() {
                    self.emit_view(&snapshot);
                    if let GameStatus::Ended(reason) = &snapshot.status {
                        self.enter_terminal(reason.clone(), ctx);
                    }
                }
            }
        }
    }

    fn emit_view(&mut self, snapshot: &GameSnapshot) {
        // Role derivation is a pure recomputation from the fresh snapshot,
        // never cached: in self-play the controlled seat flips every ply.
        let turn = turn::resolve(
            snapshot.player1_id,
            snapshot.player2_id,
            self.context.viewer_id(),
            snapshot.current_ply,
        );
        let prompt_draw =
            snapshot.status.in_progress() && snapshot.draw_offer.prompts(self.context.viewer_id());
        self.emit(SessionEvent::Refreshed(SessionView {
            snapshot: snapshot.clone(),
            turn,
            prompt_draw,
        }));
    }

    fn emit_clocks(&mut self) {
        if self.phase != SessionPhase::Live {
            return;
        }
        let now = Utc::now();
        let white = self.clocks.view(Side::White, now);
        let black = self.clocks.view(Side::Black, now);
        if white.remaining.is_none() && black.remaining.is_none() {
            return; // untimed
        }
        self.emit(SessionEvent::Clock { white, black });
    }

    fn enter_terminal(&mut self, reason: String, ctx: &mut Context<Self>) {
        if self.over() {
            return;
        }
        info!("Game {} ended: {}", self.game_id, reason);
        self.phase = SessionPhase::Terminal;
        self.teardown(ctx);
        self.emit(SessionEvent::Ended(reason));
    }

    /// Stop the timers and close the channel. Idempotent: every handle is
    /// taken, so a second pass finds nothing left to release.
    fn teardown(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.poll_handle.take() {
            ctx.cancel_future(handle);
        }
        if let Some(handle) = self.clock_handle.take() {
            ctx.cancel_future(handle);
        }
        if let Some(channel) = self.channel.take() {
            channel.do_send(CloseChannel);
        }
    }

    fn close(&mut self, ctx: &mut Context<Self>) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        info!("Closing session for game {}", self.game_id);
        self.phase = SessionPhase::Closed;
        self.teardown(ctx);
        self.emit(SessionEvent::Closed);
        ctx.stop();
    }

    /// Fire a plain POST action and surface the outcome.
    fn post_action(
        &mut self,
        ctx: &mut Context<Self>,
        path: String,
        label: &'static str,
        refetch_on_ok: bool,
    ) {
        let http = self.http.clone();
        let url = self.context.rest_url(&path);
        let fut = async move {
            let mut resp = http
                .post(url)
                .send()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            if resp.status().is_success() {
                Ok(())
            } else {
                let status = resp.status();
                let body = resp.body().await.unwrap_or_default();
                let reason = String::from_utf8_lossy(&body).trim().to_string();
                Err(ClientError::Rejected(if reason.is_empty() {
                    status.to_string()
                } else {
                    reason
                }))
            }
        };
        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| match result {
            Ok(()) => {
                info!("{} accepted", label);
                if refetch_on_ok {
                    act.refresh(ctx);
                }
            }
            Err(ClientError::Rejected(reason)) => {
                warn!("{} rejected: {}", label, reason);
                act.emit(SessionEvent::Rejected(reason));
                act.refresh(ctx);
            }
            Err(e) => {
                warn!("{} failed: {}", label, e);
                act.emit(SessionEvent::Rejected(format!("{} failed: {}", label, e)));
            }
        }));
    }
}

impl Actor for GameSession {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        info!(
            "Entering game {} as viewer {}",
            self.game_id,
            self.context.viewer_id()
        );
        self.refresh(ctx);
        self.open_channel(ctx);
        self.poll_handle = Some(ctx.run_interval(POLL_INTERVAL, |act, ctx| act.refresh(ctx)));
        self.clock_handle = Some(ctx.run_interval(CLOCK_INTERVAL, |act, _ctx| act.emit_clocks()));
    }

    fn stopping(&mut self, ctx: &mut Context<Self>) -> Running {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closed;
            self.teardown(ctx);
        }
        Running::Stop
    }
}

impl Handler<InboundUpdate> for GameSession {
    type Result = ();

    fn handle(&mut self, msg: InboundUpdate, ctx: &mut Context<Self>) {
        self.ingest(msg.update, msg.source, ctx);
    }
}

impl Handler<ChannelDown> for GameSession {
    type Result = ();

    fn handle(&mut self, _msg: ChannelDown, _ctx: &mut Context<Self>) {
        if self.over() {
            return;
        }
        if self.channel.take().is_some() {
            warn!("Push channel disconnected; continuing on poll alone");
        }
    }
}

impl Handler<SubmitMove> for GameSession {
    type Result = ();

    fn handle(&mut self, msg: SubmitMove, ctx: &mut Context<Self>) {
        if self.refuse_if_over("move") {
            return;
        }
        let uci = encode_uci(&msg.gesture);
        let Some(pending) = self.store.stage_move(uci.clone()) else {
            self.emit(SessionEvent::Rejected(
                "Game state not loaded yet".to_string(),
            ));
            return;
        };
        info!("Submitting move {} (pending {})", uci, pending.id);
        if let Some(snapshot) = self.store.view() {
            // Optimistic echo so the UI answers before the round trip.
            self.emit_view(&snapshot);
        }

        let http = self.http.clone();
        let url = self.context.rest_url(&format!("games/{}/move", self.game_id));
        let pending_id = pending.id;
        let fallback_uci = uci.clone();
        let fut = async move {
            let mut resp = http
                .post(url)
                .send_json(&MoveBody { uci })
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            if resp.status().is_success() {
                Ok(())
            } else {
                let status = resp.status();
                let body = resp.body().await.unwrap_or_default();
                let reason = String::from_utf8_lossy(&body).trim().to_string();
                Err(ClientError::Rejected(if reason.is_empty() {
                    status.to_string()
                } else {
                    reason
                }))
            }
        };
        ctx.spawn(fut.into_actor(self).map(move |result, act, ctx| match result {
            Ok(()) => {
                // Accepted, but the optimistic record is not final: fetch the
                // authoritative snapshot to replace it.
                act.refresh(ctx);
            }
            Err(ClientError::Rejected(reason)) => {
                warn!("Move rejected: {}", reason);
                act.store.drop_pending(pending_id);
                act.emit(SessionEvent::Rejected(reason));
                // Ground truth comes only from a fresh snapshot.
                act.refresh(ctx);
            }
            Err(e) => {
                // REST never reached the backend. Publish on the channel as
                // the fallback transport; REST stays authoritative and a
                // rejection is never retried this way.
                warn!("Move submission transport failure: {}", e);
                match act.channel.clone() {
                    Some(channel) => channel.do_send(PublishMove { uci: fallback_uci }),
                    None => {
                        act.store.drop_pending(pending_id);
                        act.emit(SessionEvent::Rejected(
                            "Move could not be submitted, no transport available".to_string(),
                        ));
                        act.refresh(ctx);
                    }
                }
            }
        }));
    }
}

impl Handler<Resign> for GameSession {
    type Result = ();

    fn handle(&mut self, _msg: Resign, ctx: &mut Context<Self>) {
        if self.refuse_if_over("resign") {
            return;
        }
        let path = format!("games/{}/resign", self.game_id);
        self.post_action(ctx, path, "Resign", true);
    }
}

impl Handler<OfferDraw> for GameSession {
    type Result = ();

    fn handle(&mut self, _msg: OfferDraw, ctx: &mut Context<Self>) {
        if self.refuse_if_over("draw offer") {
            return;
        }
        let path = format!("games/{}/draw-offer", self.game_id);
        self.post_action(ctx, path, "Draw offer", false);
    }
}

impl Handler<RespondDraw> for GameSession {
    type Result = ();

    fn handle(&mut self, msg: RespondDraw, ctx: &mut Context<Self>) {
        if self.refuse_if_over("draw response") {
            return;
        }
        // Clear the local offer ahead of the network result so the prompt
        // cannot reappear while the request is in flight.
        self.store.clear_draw_offer();
        if let Some(snapshot) = self.store.view() {
            self.emit_view(&snapshot);
        }
        let path = format!(
            "games/{}/draw-response?accept={}",
            self.game_id, msg.accept
        );
        self.post_action(ctx, path, "Draw response", msg.accept);
    }
}

impl Handler<Shutdown> for GameSession {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Context<Self>) {
        self.close(ctx);
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;
    use futures::StreamExt;

    use super::*;
    use crate::models::snapshot::GameStatus;

    fn full_update(ply: u32, status: GameStatus) -> GameUpdate {
        GameUpdate {
            game_id: Some(42),
            player1_id: Some(5),
            player2_id: Some(7),
            status: Some(status),
            current_ply: Some(ply),
            fen: Some("fen".to_string()),
            // Untimed, so no clock events interleave with the assertions.
            white_time: Some(None),
            black_time: Some(None),
            ..GameUpdate::default()
        }
    }

    fn session() -> (Addr<GameSession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded();
        // A port nothing listens on: polls fail with a transport error,
        // which the session tolerates.
        let context = SessionContext::establish("http://127.0.0.1:9".to_string(), Some(5));
        (GameSession::new(context, 42, tx).start(), rx)
    }

    #[actix_rt::test]
    async fn snapshot_lifecycle_stale_skip_and_terminal() {
        let (addr, mut rx) = session();

        addr.do_send(InboundUpdate {
            update: full_update(4, GameStatus::InProgress),
            source: UpdateSource::Poll,
        });
        match rx.next().await {
            Some(SessionEvent::Refreshed(view)) => {
                assert_eq!(view.snapshot.current_ply, 4);
                assert!(view.turn.is_viewer_turn);
            }
            other => panic!("expected Refreshed, got {:?}", other),
        }

        // Stale update emits nothing; the next event is the newer snapshot.
        addr.do_send(InboundUpdate {
            update: full_update(3, GameStatus::InProgress),
            source: UpdateSource::Push,
        });
        addr.do_send(InboundUpdate {
            update: full_update(5, GameStatus::InProgress),
            source: UpdateSource::Push,
        });
        match rx.next().await {
            Some(SessionEvent::Refreshed(view)) => {
                assert_eq!(view.snapshot.current_ply, 5);
                assert!(!view.turn.is_viewer_turn);
            }
            other => panic!("expected Refreshed, got {:?}", other),
        }

        // A terminal snapshot ends the session: Refreshed then Ended.
        addr.do_send(InboundUpdate {
            update: full_update(6, GameStatus::Ended("PLAYER1_WON".to_string())),
            source: UpdateSource::Poll,
        });
        match rx.next().await {
            Some(SessionEvent::Refreshed(view)) => {
                assert!(!view.snapshot.status.in_progress());
            }
            other => panic!("expected Refreshed, got {:?}", other),
        }
        match rx.next().await {
            Some(SessionEvent::Ended(reason)) => assert_eq!(reason, "PLAYER1_WON"),
            other => panic!("expected Ended, got {:?}", other),
        }

        // Outbound actions after the end are refused with a visible error,
        // and late inbound updates are dropped.
        addr.do_send(Resign);
        match rx.next().await {
            Some(SessionEvent::Rejected(reason)) => assert_eq!(reason, "session ended"),
            other => panic!("expected Rejected, got {:?}", other),
        }
        addr.do_send(InboundUpdate {
            update: full_update(7, GameStatus::InProgress),
            source: UpdateSource::Push,
        });

        addr.do_send(Shutdown);
        loop {
            match rx.next().await {
                Some(SessionEvent::Closed) => break,
                Some(SessionEvent::Refreshed(_)) => {
                    panic!("update applied after terminal teardown")
                }
                Some(_) => continue,
                None => panic!("event stream ended without Closed"),
            }
        }
    }

    #[actix_rt::test]
    async fn draw_response_clears_prompt_optimistically() {
        let (addr, mut rx) = session();

        let mut update = full_update(2, GameStatus::InProgress);
        update.draw_offer = Some(crate::models::snapshot::DrawOfferState::OfferedBy(7));
        addr.do_send(InboundUpdate {
            update,
            source: UpdateSource::Poll,
        });
        match rx.next().await {
            Some(SessionEvent::Refreshed(view)) => assert!(view.prompt_draw),
            other => panic!("expected Refreshed, got {:?}", other),
        }

        addr.do_send(RespondDraw { accept: false });
        match rx.next().await {
            // The very next view, emitted before any network result, has the
            // prompt gone.
            Some(SessionEvent::Refreshed(view)) => assert!(!view.prompt_draw),
            other => panic!("expected Refreshed, got {:?}", other),
        }

        addr.do_send(Shutdown);
        while let Some(event) = rx.next().await {
            if matches!(event, SessionEvent::Closed) {
                break;
            }
        }
    }

    #[actix_rt::test]
    async fn shutdown_from_connecting_releases_once() {
        let (addr, mut rx) = session();
        addr.do_send(Shutdown);
        match rx.next().await {
            Some(SessionEvent::Closed) => {}
            other => panic!("expected Closed, got {:?}", other),
        }
        // Nothing further arrives once the session closed.
        assert!(rx.next().await.is_none());
    }
}
