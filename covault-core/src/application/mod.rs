//! Application layer: the handler pipeline, proposal lifecycle, and session
//! orchestration.

pub mod context;
pub mod handlers;
pub mod lifecycle;
pub mod session;

pub use context::{SessionContext, Stores};
pub use session::Session;
