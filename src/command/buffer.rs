use crate::command::{Command, parse_command};
use heapless::String as HString;
use tracing::debug;

pub const COMMAND_TERMINATOR: u8 = b'\n';

/// Room for 63 payload bytes; one slot stays reserved as in a 64-byte line.
pub const COMMAND_CAPACITY: usize = 63;

/// Accumulates bytes until a terminator. Non-printable bytes are discarded
/// and bytes past the capacity are dropped.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    line: HString<COMMAND_CAPACITY>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &str {
        self.line.as_str()
    }

    /// Feed one byte. Returns a command when a terminator completes a line
    /// that parses.
    pub fn push(&mut self, byte: u8) -> Option<Command> {
        if byte == COMMAND_TERMINATOR {
            return self.finish_line();
        }
        if is_printable(byte) {
            // Full buffer: the byte is dropped.
            let _ = self.line.push(char::from(byte));
        }
        None
    }

    /// Feed a chunk, collecting every command it completes.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Command> {
        bytes.iter().filter_map(|byte| self.push(*byte)).collect()
    }

    fn finish_line(&mut self) -> Option<Command> {
        let line = self.line.trim();
        let parsed = if line.is_empty() {
            None
        } else {
            match parse_command(line) {
                Ok(command) => Some(command),
                Err(err) => {
                    debug!(error = %err, "Dropping remote command");
                    None
                }
            }
        };
        self.line.clear();
        parsed
    }
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte)
}
