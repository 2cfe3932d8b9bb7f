//! Server-side modules: storage, room state, realtime fan-out, protocol
//! handling, and HTTP assembly.

pub mod error;
pub mod realtime;
pub mod rooms;
pub mod routes;
pub mod server;
pub mod session;
pub mod store;

pub use error::BackendError;
pub use realtime::Registry;
pub use rooms::RoomManager;
pub use server::{create_app, AppState, ServerConfig};
pub use store::AnnotationStore;
