//! Configuration constants for ATmega128 firmware

use crate::logger::Level;

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// UART baud rate
pub const UART_BAUD: u32 = 9600;

/// Runloop tick period in milliseconds
pub const TICK_PERIOD_MS: u16 = 1;

/// Task table capacity
pub const MAX_TASKS: usize = 16;

/// Longest command line the shell accepts, terminator excluded
pub const SHELL_LINE_LEN: usize = 64;

/// Maximum number of tokens on one command line
pub const SHELL_MAX_ARGS: usize = 8;

/// Console poll interval in milliseconds. The 32 byte receive queue fills in
/// about 33 ms at 9600 baud.
pub const SHELL_POLL_PERIOD_MS: u16 = 20;

/// Shortest gap between two logged drift reports, in milliseconds
pub const DRIFT_REPORT_INTERVAL_MS: u32 = 1000;

/// Heartbeat LED toggle interval in milliseconds
pub const HEARTBEAT_PERIOD_MS: u16 = 500;

/// Most verbose level the console logger emits
#[cfg(feature = "debug")]
pub const LOG_LEVEL: Level = Level::Debug;
#[cfg(not(feature = "debug"))]
pub const LOG_LEVEL: Level = Level::Info;
