//! Single-slot result mailbox read by the notification side.

use std::fmt;

use crate::position::Position;

/// Wire byte for an unknown position (`-1` as a signed byte).
pub const UNKNOWN_BYTE: u8 = 0xFF;
/// Wire byte for "moved by user".
pub const MOVED_BYTE: u8 = b'm';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Answer to a position query; `None` is reported as -1.
    Position(Option<Position>),
    /// The ear was turned by hand while idle.
    Moved,
}

impl Reading {
    pub fn to_byte(self) -> u8 {
        match self {
            Reading::Position(Some(p)) => p.get(),
            Reading::Position(None) => UNKNOWN_BYTE,
            Reading::Moved => MOVED_BYTE,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            UNKNOWN_BYTE => Some(Reading::Position(None)),
            MOVED_BYTE => Some(Reading::Moved),
            b => Position::new(b).map(|p| Reading::Position(Some(p))),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Position(Some(p)) => write!(f, "{p}"),
            Reading::Position(None) => f.write_str("-1"),
            Reading::Moved => f.write_str("moved"),
        }
    }
}

/// At most one undelivered reading; newer readings overwrite older ones.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mailbox {
    slot: Option<Reading>,
}

impl Mailbox {
    /// Store `reading`, replacing whatever is pending.
    pub fn post(&mut self, reading: Reading) {
        self.slot = Some(reading);
    }

    /// Store a "moved" marker unless one is already pending.
    /// Returns whether the slot changed.
    pub fn post_moved(&mut self) -> bool {
        if self.slot == Some(Reading::Moved) {
            return false;
        }
        self.slot = Some(Reading::Moved);
        true
    }

    /// Replace a pending reading with a fresh position; an empty slot stays
    /// empty. Returns whether the slot changed.
    pub fn refresh(&mut self, position: Option<Position>) -> bool {
        match self.slot {
            Some(_) => {
                self.slot = Some(Reading::Position(position));
                true
            }
            None => false,
        }
    }

    pub fn take(&mut self) -> Option<Reading> {
        self.slot.take()
    }

    pub fn peek(&self) -> Option<Reading> {
        self.slot
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
