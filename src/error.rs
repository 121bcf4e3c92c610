//! Crate-wide error type

use core::fmt;
use ufmt::{uDisplay, uWrite, Formatter};

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can go wrong in the runloop, the shell and the drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Runloop
    /// Invalid execution count / period / delay combination
    BadSchedule,
    /// No free slot left in the task table
    TableFull,
    /// Id does not name a live task
    NoSuchTask,
    /// Tick source cannot run at the requested period
    TickRate,

    // Shell
    /// Input line exceeded the line buffer
    LineTooLong,
    /// More tokens than the argument vector holds
    TooManyArgs,
    /// No command registered under that name
    UnknownCommand,
    /// Missing or unparsable argument
    BadArgument,

    // Drivers
    /// SPI transfer failed
    Bus,
    /// All CAN transmit buffers are busy
    CanBufferFull,
    /// Frame id or length out of range
    CanBadFrame,
}

impl Error {
    /// Short human readable description
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadSchedule => "bad schedule",
            Self::TableFull => "task table full",
            Self::NoSuchTask => "no such task",
            Self::TickRate => "tick rate not supported",
            Self::LineTooLong => "line too long",
            Self::TooManyArgs => "too many arguments",
            Self::UnknownCommand => "unknown command",
            Self::BadArgument => "bad argument",
            Self::Bus => "bus error",
            Self::CanBufferFull => "can tx buffers full",
            Self::CanBadFrame => "bad can frame",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl uDisplay for Error {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}
