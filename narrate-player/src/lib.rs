//! # Narrate Player Library (narrate-player)
//!
//! Plays narration while it is still being synthesized, and highlights the
//! text of finished narrations as they play.
//!
//! **Purpose:** Accept sentence-audio notifications in any order, play them
//! strictly by index once enough are buffered, and follow a continuous
//! output's position against a timing map for text-sync highlighting.
//! Provides an HTTP/SSE control interface.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
