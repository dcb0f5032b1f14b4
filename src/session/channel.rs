use actix::io::SinkWrite;
use actix::prelude::*;
use actix_codec::Framed;
use awc::error::WsProtocolError;
use awc::ws;
use awc::BoxedSocket;
use chrono::Utc;
use futures::stream::{SplitSink, StreamExt};
use log::{debug, info, warn};

use crate::models::messages::{ChannelCommand, ChannelUpdate};
use crate::models::snapshot::UpdateSource;
use crate::session::controller::{ChannelDown, GameSession, InboundUpdate};

type WsSink = SplitSink<Framed<BoxedSocket, ws::Codec>, ws::Message>;

/// Publish a move on the channel, the fallback transport when the REST
/// submission could not reach the backend at all.
#[derive(Message)]
#[rtype(result = "()")]
pub struct PublishMove {
    pub uci: String,
}

/// Close the channel as part of session teardown.
#[derive(Message)]
#[rtype(result = "()")]
pub struct CloseChannel;

/// Push-channel client for one game topic.
///
/// Owned by the session that opened it; ownership never transfers. Inbound
/// frames are parsed here and forwarded to the session as updates; anything
/// unparseable is dropped, which demotes a malformed payload to a transport
/// hiccup the poll covers for.
pub struct GameChannel {
    game_id: i64,
    sink: SinkWrite<ws::Message, WsSink>,
    session: Addr<GameSession>,
}

impl GameChannel {
    pub fn start(
        game_id: i64,
        framed: Framed<BoxedSocket, ws::Codec>,
        session: Addr<GameSession>,
    ) -> Addr<GameChannel> {
        let (sink, stream) = framed.split();
        GameChannel::create(|ctx| {
            ctx.add_stream(stream);
            GameChannel {
                game_id,
                sink: SinkWrite::new(sink, ctx),
                session,
            }
        })
    }

    fn topic(&self) -> String {
        format!("game/{}", self.game_id)
    }

    fn send_command(&mut self, command: &ChannelCommand) {
        match serde_json::to_string(command) {
            Ok(text) => {
                let _ = self.sink.write(ws::Message::Text(text.into()));
            }
            Err(e) => warn!("Could not serialize channel command: {}", e),
        }
    }
}

impl Actor for GameChannel {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        info!("Push channel connected, subscribing to {}", self.topic());
        self.send_command(&ChannelCommand::Subscribe { topic: self.topic() });
    }

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        info!("Push channel for game {} closed", self.game_id);
        self.session.do_send(ChannelDown);
    }
}

impl StreamHandler<Result<ws::Frame, WsProtocolError>> for GameChannel {
    fn handle(&mut self, item: Result<ws::Frame, WsProtocolError>, ctx: &mut Context<Self>) {
        match item {
            Ok(ws::Frame::Text(bytes)) => match serde_json::from_slice::<ChannelUpdate>(&bytes) {
                Ok(frame) => {
                    if frame.topic != self.topic() {
                        debug!("Ignoring frame for other topic {}", frame.topic);
                        return;
                    }
                    debug!(
                        "Push frame for {} (nextTurn {:?})",
                        frame.topic, frame.next_turn
                    );
                    match frame.into_update(Utc::now()) {
                        Ok(update) => self.session.do_send(InboundUpdate {
                            update,
                            source: UpdateSource::Push,
                        }),
                        Err(e) => warn!("Dropping malformed push frame: {}", e),
                    }
                }
                Err(e) => warn!("Dropping unparseable push frame: {}", e),
            },
            Ok(ws::Frame::Ping(payload)) => {
                let _ = self.sink.write(ws::Message::Pong(payload));
            }
            Ok(ws::Frame::Pong(_)) => {}
            Ok(ws::Frame::Close(reason)) => {
                info!("Push channel closed by server: {:?}", reason);
                ctx.stop();
            }
            Ok(_) => {
                debug!("Ignoring non-text frame");
            }
            Err(e) => {
                warn!("Push channel protocol error: {}", e);
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Context<Self>) {
        ctx.stop();
    }
}

impl actix::io::WriteHandler<WsProtocolError> for GameChannel {}

impl Handler<PublishMove> for GameChannel {
    type Result = ();

    fn handle(&mut self, msg: PublishMove, _ctx: &mut Context<Self>) {
        info!("Publishing move {} on the channel as fallback", msg.uci);
        let destination = format!("game/{}/move", self.game_id);
        self.send_command(&ChannelCommand::Publish {
            destination,
            uci: msg.uci,
        });
    }
}

impl Handler<CloseChannel> for GameChannel {
    type Result = ();

    fn handle(&mut self, _msg: CloseChannel, ctx: &mut Context<Self>) {
        let _ = self.sink.write(ws::Message::Close(None));
        ctx.stop();
    }
}
