//! Shared Types
//!
//! Types shared between the server and any client speaking the wire
//! protocol: the annotation sum type, the room snapshot shape, the message
//! envelope taxonomy, and boundary error types.

pub mod annotation;
pub mod error;
pub mod message;
pub mod room;

pub use annotation::{
    Annotation, AnnotationKind, ChatMessage, DrawOp, Point, StickyOp, TextOp, UserProfile,
};
pub use error::SharedError;
pub use message::{DrawSubmit, StickySubmit, TextSubmit, WsMessage};
pub use room::RoomSnapshot;
