//! Leveled logging over any `ufmt` writer
//!
//! Records look like `[I 0 00:00:01.250 scheduler] task 3 started`: level
//! tag, uptime, the last segment of the emitting module, then the message.
//! Use the crate-level `error!`, `warn!`, `info!` and `debug!` macros; they
//! skip formatting when the level is filtered out.

use core::cell::RefCell;
use critical_section::Mutex;
use ufmt::{uWrite, uwrite};

use crate::rtos::{Tick, Uptime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Error => "E",
            Self::Warn => "W",
            Self::Info => "I",
            Self::Debug => "D",
        }
    }
}

/// Source of record timestamps
pub type Timestamp = fn() -> Uptime;

pub struct Logger<W> {
    sink: W,
    max: Level,
    timestamp: Timestamp,
}

impl<W: uWrite> Logger<W> {
    pub const fn new(sink: W, max: Level, timestamp: Timestamp) -> Self {
        Self {
            sink,
            max,
            timestamp,
        }
    }

    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max
    }

    pub fn set_level(&mut self, max: Level) {
        self.max = max;
    }

    pub fn level(&self) -> Level {
        self.max
    }

    /// Write the record prefix and hand back the sink for the message body
    pub fn begin(&mut self, level: Level, module: &str) -> Result<&mut W, W::Error> {
        let uptime = (self.timestamp)();
        let sink = &mut self.sink;
        uwrite!(sink, "[{} {} {}] ", level.tag(), uptime, module)?;
        Ok(sink)
    }

    pub fn sink(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Last path segment of a `module_path!()`
pub fn short_module(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Logger reachable from interrupt-free callbacks that cannot capture state,
/// such as the runloop error handlers.
///
/// The logger is moved out for the duration of each use so the sink never
/// runs inside a critical section. A nested use while it is out is dropped.
pub struct GlobalLogger<W> {
    slot: Mutex<RefCell<Option<Logger<W>>>>,
}

impl<W: uWrite> GlobalLogger<W> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    pub fn install(&self, logger: Logger<W>) {
        critical_section::with(|cs| {
            self.slot.borrow_ref_mut(cs).replace(logger);
        });
    }

    pub fn uninstall(&self) -> Option<Logger<W>> {
        critical_section::with(|cs| self.slot.borrow_ref_mut(cs).take())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Logger<W>) -> R) -> Option<R> {
        let mut logger = critical_section::with(|cs| self.slot.borrow_ref_mut(cs).take())?;
        let result = f(&mut logger);
        critical_section::with(|cs| {
            self.slot.borrow_ref_mut(cs).replace(logger);
        });
        Some(result)
    }
}

impl<W: uWrite> Default for GlobalLogger<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets through at most one report per `interval` ticks and counts the ones
/// held back.
///
/// Console writes block once the UART queue is full, so a report about a
/// late task can itself make the next pass late.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    interval: Tick,
    last: Option<Tick>,
    held_back: u16,
}

impl Throttle {
    pub const fn new(interval: Tick) -> Self {
        Self {
            interval,
            last: None,
            held_back: 0,
        }
    }

    /// `Some(n)` if a report at `now` may go out, `n` being the number held
    /// back since the previous one; `None` if it should be dropped.
    pub fn admit(&mut self, now: Tick) -> Option<u16> {
        if let Some(last) = self.last {
            if now.wrapping_sub(last) < self.interval {
                self.held_back = self.held_back.saturating_add(1);
                return None;
            }
        }
        self.last = Some(now);
        Some(core::mem::take(&mut self.held_back))
    }
}

#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        if $logger.enabled($level) {
            // uwriteln! expands to bare `ufmt::` paths
            use $crate::ufmt;
            let module = $crate::logger::short_module(module_path!());
            if let Ok(sink) = $logger.begin($level, module) {
                let _ = ufmt::uwriteln!(sink, $($arg)+);
            }
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::logger::Level::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::logger::Level::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::logger::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::logger::Level::Debug, $($arg)+)
    };
}
