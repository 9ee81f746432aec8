//! Reactive session adapter for UI consumers.

pub mod session;
pub mod state;

pub use session::SessionHook;
pub use state::{HookError, HookState};
