//! Per-channel room state cache and write-through persistence

pub mod state;

pub use state::{Room, RoomManager, WriteJob};
