pub mod messages;
pub mod session_context;
pub mod snapshot;
