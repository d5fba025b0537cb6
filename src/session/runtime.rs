//! Per-session scheduler: turns queued role commands into fixed ticks
//! according to the session's loop mode.

use super::command::SessionCommand;
use crate::error::SessionError;
use crate::interpreter::InputFrame;
use crate::runtime::{RuntimeCore, TickReport};
use crate::scene::{LoopMode, RoleSpec};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// A command taken off a role queue and applied
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsumedCommand {
    pub role: String,
    pub command: SessionCommand,
}

/// Everything one scheduling pass did
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScheduleReport {
    pub ticks: Vec<TickReport>,
    pub consumed: Vec<ConsumedCommand>,
    /// Commands discarded because a newer one from the same role won
    pub discarded: usize,
}

struct RoleQueue {
    role: RoleSpec,
    queue: VecDeque<SessionCommand>,
}

pub struct SessionRuntime {
    core: RuntimeCore,
    mode: LoopMode,
    /// Participating roles in fixed order
    roles: Vec<RoleQueue>,
}

impl SessionRuntime {
    pub fn new(core: RuntimeCore, mode: LoopMode, roles: Vec<RoleSpec>) -> Self {
        Self {
            core,
            mode,
            roles: roles
                .into_iter()
                .map(|role| RoleQueue {
                    role,
                    queue: VecDeque::new(),
                })
                .collect(),
        }
    }

    pub fn core(&self) -> &RuntimeCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut RuntimeCore {
        &mut self.core
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleSpec> {
        self.roles.iter().map(|r| &r.role)
    }

    pub fn queued(&self, role: &str) -> usize {
        self.roles
            .iter()
            .find(|r| r.role.id == role)
            .map_or(0, |r| r.queue.len())
    }

    /// Role whose turn it is (strict-turn and hybrid)
    pub fn current_role(&self) -> Option<&str> {
        if self.mode == LoopMode::Continuous || self.roles.is_empty() {
            return None;
        }
        let idx = (self.core.world().turn() % self.roles.len() as u64) as usize;
        Some(self.roles[idx].role.id.as_str())
    }

    /// Validate and queue a batch of commands for `role`. Either every
    /// command is queued or none is.
    pub fn enqueue(&mut self, role: &str, commands: Vec<SessionCommand>, max_queue: usize) -> Result<(), SessionError> {
        let scene = std::sync::Arc::clone(self.core.world().scene());
        let slot = self
            .roles
            .iter_mut()
            .find(|r| r.role.id == role)
            .ok_or_else(|| SessionError::Validation(format!("Unknown role '{}'", role)))?;

        for command in &commands {
            if let SessionCommand::Tool { name, .. } = command {
                let tool = scene
                    .tool(name)
                    .ok_or_else(|| SessionError::Validation(format!("Unknown tool '{}'", name)))?;
                if !tool.offered_to(role) {
                    return Err(SessionError::Validation(format!(
                        "Tool '{}' is not offered to role '{}'",
                        name, role
                    )));
                }
            }
        }
        if slot.queue.len() + commands.len() > max_queue {
            return Err(SessionError::Validation(format!(
                "Queue for role '{}' is full ({} commands max)",
                role, max_queue
            )));
        }

        slot.queue.extend(commands);
        Ok(())
    }

    /// Run one scheduling pass in the session's loop mode
    pub fn tick(&mut self) -> Result<ScheduleReport, SessionError> {
        match self.mode {
            LoopMode::Continuous => self.tick_continuous(),
            LoopMode::StrictTurn => self.tick_strict_turn(),
            LoopMode::Hybrid => self.tick_hybrid(),
        }
    }

    /// Feed wall-clock time. Continuous sessions run every due tick (the
    /// first one consumes queued commands); turn-based sessions only drain
    /// their queues.
    pub fn advance_clock(&mut self, elapsed_secs: f64) -> Result<ScheduleReport, SessionError> {
        match self.mode {
            LoopMode::Continuous => {
                let due = self.core.due_steps(elapsed_secs);
                let mut report = ScheduleReport::default();
                for _ in 0..due {
                    let pass = self.tick_continuous()?;
                    report.ticks.extend(pass.ticks);
                    report.consumed.extend(pass.consumed);
                    report.discarded += pass.discarded;
                }
                Ok(report)
            }
            LoopMode::StrictTurn | LoopMode::Hybrid => {
                if self.roles.iter().any(|r| !r.queue.is_empty()) {
                    self.tick()
                } else {
                    Ok(ScheduleReport::default())
                }
            }
        }
    }

    /// Latest command of every role, merged in role order into one step
    fn tick_continuous(&mut self) -> Result<ScheduleReport, SessionError> {
        let mut report = ScheduleReport::default();
        let mut frame = InputFrame::default();

        for slot in &mut self.roles {
            let Some(latest) = slot.queue.pop_back() else {
                continue;
            };
            report.discarded += slot.queue.len();
            slot.queue.clear();
            latest.apply_to(&mut frame, &slot.role.id);
            report.consumed.push(ConsumedCommand {
                role: slot.role.id.clone(),
                command: latest,
            });
        }

        report.ticks.push(self.core.step(&frame)?);
        Ok(report)
    }

    /// Drain the current role's queue until the turn changes
    fn tick_strict_turn(&mut self) -> Result<ScheduleReport, SessionError> {
        let mut report = ScheduleReport::default();
        if self.roles.is_empty() {
            return Ok(report);
        }
        let start_turn = self.core.world().turn();
        let idx = (start_turn % self.roles.len() as u64) as usize;

        while let Some(command) = self.roles[idx].queue.pop_front() {
            let role = self.roles[idx].role.id.clone();
            self.apply(&role, command, &mut report)?;
            if self.core.world().turn() != start_turn {
                break;
            }
        }
        Ok(report)
    }

    /// Sweep roles in order, one command each per pass, until the turn
    /// changes or a pass consumes nothing
    fn tick_hybrid(&mut self) -> Result<ScheduleReport, SessionError> {
        let mut report = ScheduleReport::default();
        let start_turn = self.core.world().turn();

        loop {
            let mut consumed_any = false;
            for idx in 0..self.roles.len() {
                let Some(command) = self.roles[idx].queue.pop_front() else {
                    continue;
                };
                consumed_any = true;
                let role = self.roles[idx].role.id.clone();
                self.apply(&role, command, &mut report)?;
                if self.core.world().turn() != start_turn {
                    return Ok(report);
                }
            }
            if !consumed_any {
                return Ok(report);
            }
        }
    }

    /// One fixed step for a single command
    fn apply(&mut self, role: &str, command: SessionCommand, report: &mut ScheduleReport) -> Result<(), SessionError> {
        debug!(role = %role, command = ?command, "Applying command");
        let frame = command.to_frame(role);
        report.ticks.push(self.core.step(&frame)?);
        report.consumed.push(ConsumedCommand {
            role: role.to_string(),
            command,
        });
        Ok(())
    }
}
