//! pdfpals - collaborative PDF annotation sync server
//!
//! The realtime backend for a Discord activity where a channel reads and
//! marks up PDFs together. Each Discord channel maps to one room: the
//! currently open document, the current page, and three kinds of
//! annotations (draw strokes, text notes, sticky notes) that every
//! connected member sees live. Rooms are cached in memory and written
//! through to SQLite, so annotations survive restarts and document
//! switches.

pub mod backend;
pub mod shared;
