//! Command set and the two-byte wire framing.
//!
//! Opcodes: `.` no-op, `?` query, `!` query-or-detect, `+n`/`-n` relative
//! moves, `>p`/`<p` absolute moves turning forward/backward. Opcodes from
//! the second group consume the following byte as their argument.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::position::{NUM_HOLES, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Nop,
    Query,
    QueryOrDetect,
    Forward(u8),
    Backward(u8),
    /// Target taken modulo 17.
    GotoForward(u8),
    GotoBackward(u8),
}

impl Command {
    pub const NOP: u8 = b'.';
    pub const QUERY: u8 = b'?';
    pub const QUERY_OR_DETECT: u8 = b'!';
    pub const FORWARD: u8 = b'+';
    pub const BACKWARD: u8 = b'-';
    pub const GOTO_FORWARD: u8 = b'>';
    pub const GOTO_BACKWARD: u8 = b'<';

    /// Everything but `Nop` and `Query` must wait for the ear to settle.
    #[inline]
    pub fn requires_idle(&self) -> bool {
        !matches!(self, Command::Nop | Command::Query)
    }

    /// Whether a writer blocks until the ear settles before this command
    /// runs. Only `Query` answers mid-motion; `Nop` is accepted in any
    /// state but still waits.
    #[inline]
    pub fn waits_for_idle(&self) -> bool {
        !matches!(self, Command::Query)
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Command::Nop => Self::NOP,
            Command::Query => Self::QUERY,
            Command::QueryOrDetect => Self::QUERY_OR_DETECT,
            Command::Forward(_) => Self::FORWARD,
            Command::Backward(_) => Self::BACKWARD,
            Command::GotoForward(_) => Self::GOTO_FORWARD,
            Command::GotoBackward(_) => Self::GOTO_BACKWARD,
        }
    }

    /// Goto target folded into the valid range.
    pub fn goto_target(&self) -> Option<Position> {
        match *self {
            Command::GotoForward(p) | Command::GotoBackward(p) => {
                Position::new(p % NUM_HOLES)
            }
            _ => None,
        }
    }

    /// Wire encoding: one byte, or two for argument-carrying opcodes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        match *self {
            Command::Forward(n)
            | Command::Backward(n)
            | Command::GotoForward(n)
            | Command::GotoBackward(n) => out.push(n),
            _ => {}
        }
    }

    fn takes_argument(opcode: u8) -> bool {
        matches!(
            opcode,
            Self::FORWARD | Self::BACKWARD | Self::GOTO_FORWARD | Self::GOTO_BACKWARD
        )
    }

    fn with_argument(opcode: u8, arg: u8) -> Option<Self> {
        Some(match opcode {
            Self::FORWARD => Command::Forward(arg),
            Self::BACKWARD => Command::Backward(arg),
            Self::GOTO_FORWARD => Command::GotoForward(arg),
            Self::GOTO_BACKWARD => Command::GotoBackward(arg),
            _ => return None,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::Nop => f.write_str("."),
            Command::Query => f.write_str("?"),
            Command::QueryOrDetect => f.write_str("!"),
            Command::Forward(n) => write!(f, "+{n}"),
            Command::Backward(n) => write!(f, "-{n}"),
            Command::GotoForward(p) => write!(f, ">{p}"),
            Command::GotoBackward(p) => write!(f, "<{p}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown opcode {0:?}")]
    UnknownOpcode(char),
    #[error("missing argument for {0:?}")]
    MissingArgument(char),
    #[error("invalid argument {0:?}")]
    InvalidArgument(String),
    #[error("unexpected argument for {0:?}")]
    UnexpectedArgument(char),
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let op = chars.next().ok_or(ParseCommandError::Empty)?;
        let rest = chars.as_str();
        let opcode = u8::try_from(op).map_err(|_| ParseCommandError::UnknownOpcode(op))?;

        if Command::takes_argument(opcode) {
            if rest.is_empty() {
                return Err(ParseCommandError::MissingArgument(op));
            }
            let arg: u8 = rest
                .parse()
                .map_err(|_| ParseCommandError::InvalidArgument(rest.to_string()))?;
            return Command::with_argument(opcode, arg)
                .ok_or(ParseCommandError::UnknownOpcode(op));
        }

        let cmd = match opcode {
            Command::NOP => Command::Nop,
            Command::QUERY => Command::Query,
            Command::QUERY_OR_DETECT => Command::QueryOrDetect,
            _ => return Err(ParseCommandError::UnknownOpcode(op)),
        };
        if rest.is_empty() {
            Ok(cmd)
        } else {
            Err(ParseCommandError::UnexpectedArgument(op))
        }
    }
}

/// Result of feeding one byte to the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// The byte was an opcode waiting for its argument.
    Pending,
    Command(Command),
    /// Not an opcode; skipped.
    Unknown(u8),
}

/// Byte-at-a-time command decoder; keeps a pending opcode across writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandFramer {
    pending: Option<u8>,
}

impl CommandFramer {
    pub fn push(&mut self, byte: u8) -> Decoded {
        if let Some(op) = self.pending.take() {
            return match Command::with_argument(op, byte) {
                Some(cmd) => Decoded::Command(cmd),
                None => Decoded::Unknown(op),
            };
        }
        if Command::takes_argument(byte) {
            self.pending = Some(byte);
            return Decoded::Pending;
        }
        match byte {
            Command::NOP => Decoded::Command(Command::Nop),
            Command::QUERY => Decoded::Command(Command::Query),
            Command::QUERY_OR_DETECT => Decoded::Command(Command::QueryOrDetect),
            other => Decoded::Unknown(other),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }
}
