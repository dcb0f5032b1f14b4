use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, info, warn};
use rand::Rng;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8060";

/// Identity and endpoint context for one viewer.
///
/// Created once at startup and passed explicitly to everything that talks to
/// the backend, so no component reads identity out of shared global state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    viewer_id: i64,
    base_url: String,
}

impl SessionContext {
    /// Resolve the viewer identity: an explicit override wins, otherwise the
    /// persisted id is reused, otherwise a fresh one is generated and kept
    /// for the rest of the login session.
    pub fn establish(base_url: String, explicit_viewer: Option<i64>) -> SessionContext {
        let viewer_id = explicit_viewer.unwrap_or_else(load_or_generate_viewer_id);
        SessionContext {
            viewer_id,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn viewer_id(&self) -> i64 {
        self.viewer_id
    }

    pub fn rest_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Websocket endpoint for the push channel.
    pub fn ws_url(&self) -> String {
        format!("{}/ws", self.base_url.replacen("http", "ws", 1))
    }
}

fn session_file() -> PathBuf {
    std::env::temp_dir().join("chess_live_client.session")
}

fn load_or_generate_viewer_id() -> i64 {
    if let Ok(raw) = fs::read_to_string(session_file()) {
        if let Ok(id) = raw.trim().parse::<i64>() {
            debug!("Reusing persisted viewer id {}", id);
            return id;
        }
    }

    let id = rand::thread_rng().gen_range(1..100_000);
    if let Err(e) = fs::write(session_file(), id.to_string()) {
        warn!("Could not persist viewer id: {}", e);
    }
    info!("Generated viewer id {}", id);
    id
}

/// Forget the persisted viewer identity (logout).
pub fn clear_session() -> io::Result<()> {
    match fs::remove_file(session_file()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
