//! Per-channel session protocol (message dispatch and state transitions)

pub mod handlers;

pub use handlers::handle_message;
