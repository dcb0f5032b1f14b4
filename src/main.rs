use std::io::BufRead;
use std::thread;

use actix::prelude::*;
use clap::{Parser, Subcommand};
use futures::channel::mpsc;
use futures::StreamExt;
use log::info;

mod error;
mod game;
mod models;
mod session;

use game::clock::format_clock;
use game::encode::MoveGesture;
use game::utils::{render_board, status_line};
use models::messages::GameType;
use models::session_context::{self, SessionContext, DEFAULT_BASE_URL};
use models::snapshot::Side;
use session::controller::{
    GameSession, OfferDraw, Resign, RespondDraw, SessionEvent, SessionView, Shutdown, SubmitMove,
};
use session::matchmaking;

#[derive(Parser)]
#[command(name = "chess_live_client", about = "Terminal client for the multiplayer chess service")]
struct Cli {
    /// Backend base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    server: String,

    /// Override the persisted viewer id
    #[arg(long)]
    user_id: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for an opponent and play
    Play {
        #[arg(long, value_enum, default_value_t = GameType::Standard)]
        game_type: GameType,
    },
    /// Join an existing game as a player or spectator
    Join { game_id: i64 },
    /// Create a game directly; without an opponent this is a self-play board
    Create {
        #[arg(long)]
        opponent: Option<i64>,
        #[arg(long, value_enum, default_value_t = GameType::Standard)]
        game_type: GameType,
    },
    /// Forget the persisted viewer identity
    Logout,
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    let context = SessionContext::establish(cli.server, cli.user_id);
    let http = awc::Client::builder()
        .add_default_header(("X-USER-ID", context.viewer_id().to_string()))
        .finish();

    let game_id = match cli.command {
        Command::Logout => {
            session_context::clear_session()?;
            println!("Session cleared.");
            return Ok(());
        }
        Command::Play { game_type } => {
            match matchmaking::find_match(&http, &context, game_type).await {
                Ok(game_id) => game_id,
                Err(e) => {
                    eprintln!("Matchmaking failed: {}", e);
                    return Ok(());
                }
            }
        }
        Command::Join { game_id } => game_id,
        Command::Create {
            opponent,
            game_type,
        } => {
            let opponent = opponent.unwrap_or_else(|| context.viewer_id());
            match matchmaking::create_game(&http, &context, opponent, game_type).await {
                Ok(game_id) => game_id,
                Err(e) => {
                    eprintln!("Game creation failed: {}", e);
                    return Ok(());
                }
            }
        }
    };

    run_session(context, game_id).await;
    Ok(())
}

/// Drive one game session: keyboard commands in, rendered state out.
async fn run_session(context: SessionContext, game_id: i64) {
    let (event_tx, mut events) = mpsc::unbounded();
    let addr = GameSession::new(context, game_id, event_tx).start();

    // Stdin is blocking; a plain thread feeds lines into the event loop.
    let (input_tx, mut input) = mpsc::unbounded::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.unbounded_send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    print_help();

    let command_addr = addr.clone();
    actix_rt::spawn(async move {
        while let Some(line) = input.next().await {
            dispatch_command(&command_addr, line.trim());
        }
        // Stdin closed; tear the session down.
        command_addr.do_send(Shutdown);
    });

    while let Some(event) = events.next().await {
        match event {
            SessionEvent::Refreshed(view) => render(&view),
            SessionEvent::Clock { white, black } => {
                println!("  clocks: white {}  black {}", format_clock(white), format_clock(black));
            }
            SessionEvent::Rejected(reason) => println!("!! {}", reason),
            SessionEvent::Ended(reason) => {
                println!("Game over: {}. Type quit to leave.", reason);
            }
            SessionEvent::Closed => break,
        }
    }
    info!("Session for game {} finished", game_id);
}

fn dispatch_command(addr: &Addr<GameSession>, line: &str) {
    if line.is_empty() {
        return;
    }
    match line {
        "quit" | "exit" => addr.do_send(Shutdown),
        "resign" => addr.do_send(Resign),
        "draw" => addr.do_send(OfferDraw),
        "accept" => addr.do_send(RespondDraw { accept: true }),
        "decline" => addr.do_send(RespondDraw { accept: false }),
        "help" => print_help(),
        other => match MoveGesture::parse(other) {
            Some(gesture) => addr.do_send(SubmitMove { gesture }),
            None => println!("!! Unrecognized command: {} (type help)", other),
        },
    }
}

fn render(view: &SessionView) {
    let snapshot = &view.snapshot;
    let perspective = view.turn.seat.unwrap_or(Side::White);
    println!();
    println!("{}", render_board(&snapshot.fen, perspective));
    println!("Game {}: {}", snapshot.game_id, status_line(snapshot, &view.turn));
    if !snapshot.moves.is_empty() {
        let listed: Vec<&str> = snapshot.moves.iter().map(|m| m.notation()).collect();
        println!("Moves: {}", listed.join(" "));
    }
    if let Some(last) = snapshot.moves.last() {
        println!("Last move: {} ({})", last.notation(), last.side.label());
    }
    if view.prompt_draw {
        println!("Opponent offers a draw: type accept or decline.");
    }
}

fn print_help() {
    println!("Commands: a move as coordinates (e2e4, e7e8q), resign, draw, accept, decline, quit");
}
