//! HTTP control surface

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
