//! Remote command channel.
//!
//! Lines are `ROTATE <signed integer>` or `STATUS`, case-insensitive.
//! Anything else is dropped without touching control state.

use crate::error::AppError;
use tokio::sync::oneshot;

pub mod buffer;
pub mod listener;

pub use buffer::CommandBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Rotate(i32),
    Status,
}

/// A parsed command waiting for the control loop. STATUS replies go back
/// through `reply` when one is attached.
#[derive(Debug)]
pub struct RemoteRequest {
    pub command: Command,
    pub reply: Option<oneshot::Sender<String>>,
}

impl RemoteRequest {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    pub fn with_reply(command: Command) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }
}

pub fn parse_command(line: &str) -> Result<Command, AppError> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    let keyword = parts
        .next()
        .ok_or_else(|| AppError::MalformedCommand("empty line".to_string()))?
        .to_ascii_uppercase();

    match keyword.as_str() {
        "ROTATE" => {
            let argument = parts
                .next()
                .ok_or_else(|| AppError::MalformedCommand("ROTATE needs an angle".to_string()))?;
            if parts.next().is_some() {
                return Err(AppError::MalformedCommand(format!(
                    "trailing input after ROTATE: {line}"
                )));
            }
            argument
                .parse::<i32>()
                .map(Command::Rotate)
                .map_err(|_| AppError::MalformedCommand(format!("invalid angle: {argument}")))
        }
        "STATUS" if parts.next().is_none() => Ok(Command::Status),
        _ => Err(AppError::MalformedCommand(format!("unknown command: {line}"))),
    }
}
