use thiserror::Error;

/// Failure classes the client distinguishes.
///
/// None of these are fatal to the process. A transport failure leaves the
/// session on its last known good state until the next timer tick, a rejected
/// action forces a re-fetch of ground truth, and a finished game arrives as
/// ordinary data rather than an error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request or channel delivery could not complete.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend refused the action and said why.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The backend sent something we refuse to interpret.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Matchmaking hit its wall-clock ceiling without an opponent.
    #[error("no opponent found within {0} seconds")]
    SearchTimeout(u64),

    /// The game session is over; outbound actions are no-ops.
    #[error("session ended")]
    SessionEnded,
}
