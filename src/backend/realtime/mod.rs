//! Connection registry and WebSocket transport

pub mod registry;
pub mod ws;

pub use registry::{ClientSender, ConnectionId, CursorPosition, Registry, RegistryStats};
pub use ws::handle_ws_upgrade;
