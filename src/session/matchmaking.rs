use std::time::Duration;

use awc::Client;
use log::{info, warn};

use crate::error::ClientError;
use crate::models::messages::{GamePayload, GameType, MatchResponse, MATCH_FAILED, MATCH_WAITING};
use crate::models::session_context::SessionContext;

/// Wall-clock ceiling for one search attempt, measured in poll ticks.
pub const SEARCH_CEILING_SECS: u64 = 90;
const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Join the matchmaking queue and poll until a match lands or the ceiling
/// expires. On expiry the queue entry is vacated on the backend and the
/// failure is surfaced; the caller decides whether to search again.
pub async fn find_match(
    http: &Client,
    context: &SessionContext,
    game_type: GameType,
) -> Result<i64, ClientError> {
    let join_url = context.rest_url(&format!("matchmaking/join?gameType={}", game_type.as_str()));
    let mut resp = http
        .post(join_url)
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ClientError::Transport(format!(
            "matchmaking join returned {}",
            resp.status()
        )));
    }
    let joined: MatchResponse = resp
        .json()
        .await
        .map_err(|e| ClientError::MalformedPayload(e.to_string()))?;

    if joined.match_id > 0 {
        info!("Matched immediately into game {}", joined.match_id);
        return Ok(joined.match_id);
    }
    if joined.match_id != MATCH_WAITING {
        return Err(ClientError::Transport(format!(
            "queue join refused with status {}",
            joined.match_id
        )));
    }

    info!(
        "Waiting for a {} opponent (up to {} seconds)",
        game_type, SEARCH_CEILING_SECS
    );
    let check_url = context.rest_url(&format!("matchmaking/check?gameType={}", game_type.as_str()));
    let mut ticks = actix_rt::time::interval(CHECK_INTERVAL);
    ticks.tick().await; // the first tick fires immediately

    for attempt in 1..=SEARCH_CEILING_SECS {
        ticks.tick().await;
        match check_once(http, &check_url).await {
            Ok(match_id) if match_id > 0 => {
                info!("Match found after {} seconds: game {}", attempt, match_id);
                return Ok(match_id);
            }
            Ok(match_id) if match_id == MATCH_WAITING => {}
            Ok(match_id) if match_id == MATCH_FAILED => {
                cancel(http, context, game_type).await;
                return Err(ClientError::Transport(
                    "matchmaking reported a failure".to_string(),
                ));
            }
            Ok(match_id) => warn!("Unexpected matchmaking status {}", match_id),
            // A failed tick is tolerated; the next one may get through.
            Err(e) => warn!("Matchmaking check failed, will retry: {}", e),
        }
    }

    // Ceiling reached: leave the queue and report. No automatic retry.
    cancel(http, context, game_type).await;
    Err(ClientError::SearchTimeout(SEARCH_CEILING_SECS))
}

async fn check_once(http: &Client, url: &str) -> Result<i64, ClientError> {
    let mut resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ClientError::Transport(format!(
            "matchmaking check returned {}",
            resp.status()
        )));
    }
    let payload: MatchResponse = resp
        .json()
        .await
        .map_err(|e| ClientError::MalformedPayload(e.to_string()))?;
    Ok(payload.match_id)
}

/// Tell the backend to vacate our queue entry.
pub async fn cancel(http: &Client, context: &SessionContext, game_type: GameType) {
    let url = context.rest_url(&format!("matchmaking/cancel?gameType={}", game_type.as_str()));
    match http.post(url).send().await {
        Ok(resp) if resp.status().is_success() => info!("Left the {} queue", game_type),
        Ok(resp) => warn!("Queue cancel returned {}", resp.status()),
        Err(e) => warn!("Failed to leave matchmaking queue: {}", e),
    }
}

/// Create a game directly, bypassing matchmaking (dev path). Creating
/// against one's own id yields a self-play board.
pub async fn create_game(
    http: &Client,
    context: &SessionContext,
    opponent_id: i64,
    game_type: GameType,
) -> Result<i64, ClientError> {
    let url = context.rest_url(&format!("games?gameType={}", game_type.as_str()));
    let mut resp = http
        .post(url)
        .insert_header(("X-PLAYER1-ID", context.viewer_id().to_string()))
        .insert_header(("X-PLAYER2-ID", opponent_id.to_string()))
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ClientError::Transport(format!(
            "game creation returned {}",
            resp.status()
        )));
    }
    let payload: GamePayload = resp
        .json()
        .await
        .map_err(|e| ClientError::MalformedPayload(e.to_string()))?;
    info!(
        "Created game {} ({})",
        payload.game_id,
        payload.game_type.as_deref().unwrap_or("STANDARD")
    );
    Ok(payload.game_id)
}
