use crate::interpreter::{ButtonEvent, InputFrame, PhaseSet, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command a role submits to its session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Agent tool call
    Tool {
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// Raw input: keyboard and mouse phases plus UI button presses
    Input {
        #[serde(default)]
        keyboard: PhaseSet,
        #[serde(default)]
        mouse: PhaseSet,
        #[serde(default)]
        buttons: Vec<String>,
    },
    Button {
        name: String,
    },
    Noop,
}

impl SessionCommand {
    /// Add this command's events to `frame`, attributed to `role`
    pub fn apply_to(&self, frame: &mut InputFrame, role: &str) {
        match self {
            SessionCommand::Tool { name, args } => frame.tools.push(ToolCall {
                name: name.clone(),
                args: args.clone(),
                role: Some(role.to_string()),
            }),
            SessionCommand::Input {
                keyboard,
                mouse,
                buttons,
            } => {
                frame.keyboard.merge(keyboard);
                frame.mouse.merge(mouse);
                frame.buttons.extend(buttons.iter().map(|name| ButtonEvent {
                    name: name.clone(),
                    role: Some(role.to_string()),
                }));
            }
            SessionCommand::Button { name } => frame.buttons.push(ButtonEvent {
                name: name.clone(),
                role: Some(role.to_string()),
            }),
            SessionCommand::Noop => {}
        }
    }

    /// Frame holding just this command
    pub fn to_frame(&self, role: &str) -> InputFrame {
        let mut frame = InputFrame::default();
        self.apply_to(&mut frame, role);
        frame
    }
}
