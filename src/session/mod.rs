//! Multiplayer sessions: per-session command queues and loop-mode
//! scheduling, the process-wide session registry with its tokens, and
//! viewer-scoped state projection.

mod command;
mod manager;
mod runtime;
mod view;

#[cfg(test)]
mod tests;

pub use command::SessionCommand;
pub use manager::{
    CreatedSession, Game, JoinedRole, PaceUpdate, SessionManager, SessionOptions, SessionStatus,
    SubmitResult,
};
pub use runtime::{ConsumedCommand, ScheduleReport, SessionRuntime};
pub use view::{RoleView, SessionStateView, Viewer};
