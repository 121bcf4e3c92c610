//! System time base driven by the tick interrupt

use core::cell::Cell;
use critical_section::Mutex;
use ufmt::{uDisplay, uWrite, uwrite, Formatter};

use crate::error::{Error, Result};

/// One unit of the tick counter
pub type Tick = u32;

/// Largest delay or period the wrap-safe comparison can represent
pub const MAX_SPAN: Tick = i32::MAX as Tick;

const MS_PER_SECOND: u64 = 1000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Signed distance from `then` to `now` on the wrapping counter.
///
/// Non-negative once `now` has reached or passed `then`, as long as the two
/// are less than half the counter range apart.
#[inline]
pub fn ticks_since(now: Tick, then: Tick) -> i32 {
    now.wrapping_sub(then) as i32
}

/// Length of one tick in whole milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPeriod(u16);

impl TickPeriod {
    /// Period of `ms` milliseconds; zero is rejected
    pub const fn from_ms(ms: u16) -> Option<Self> {
        if ms == 0 {
            None
        } else {
            Some(Self(ms))
        }
    }

    pub const fn as_ms(&self) -> u16 {
        self.0
    }

    /// Convert a millisecond span into ticks.
    ///
    /// Spans that are not an exact multiple of the period are rejected rather
    /// than rounded, as are spans too long for the wrap-safe comparison.
    pub fn ms_to_ticks(&self, ms: u32) -> Result<Tick> {
        let period = u32::from(self.0);
        if ms % period != 0 {
            return Err(Error::BadSchedule);
        }
        let ticks = ms / period;
        if ticks > MAX_SPAN {
            return Err(Error::BadSchedule);
        }
        Ok(ticks)
    }

    /// Uptime represented by a tick count
    pub fn uptime(&self, ticks: Tick) -> Uptime {
        Uptime::from_millis(u64::from(ticks) * u64::from(self.0))
    }
}

impl Default for TickPeriod {
    fn default() -> Self {
        Self(crate::config::TICK_PERIOD_MS)
    }
}

/// Monotonic tick counter shared between the tick interrupt and the
/// foreground.
///
/// The interrupt is the only writer. Foreground reads happen inside a
/// critical section so a half-updated multi-byte counter is never observed
/// on an 8-bit core.
pub struct Clock {
    ticks: Mutex<Cell<Tick>>,
}

impl Clock {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Advance by one tick. Called from the tick interrupt.
    #[inline]
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    /// Current tick count
    #[inline]
    pub fn now(&self) -> Tick {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    pub fn reset(&self) {
        critical_section::with(|cs| self.ticks.borrow(cs).set(0));
    }

    /// Call `sleep` in a critical section, but only if the count still reads
    /// `seen`. Returns whether it was called.
    ///
    /// `sleep` has to unmask interrupts and halt in one step (`sei; sleep` on
    /// AVR). A tick that lands between the check and the halt then wakes the
    /// CPU right away instead of on the tick after it.
    pub fn sleep_unless_ticked(&self, seen: Tick, sleep: impl FnOnce()) -> bool {
        critical_section::with(|cs| {
            if self.ticks.borrow(cs).get() != seen {
                return false;
            }
            sleep();
            true
        })
    }

    /// Elapsed time since the last reset
    pub fn uptime(&self, period: TickPeriod) -> Uptime {
        period.uptime(self.now())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Human readable decomposition of elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uptime {
    pub days: u32,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub millis: u16,
}

impl Uptime {
    pub fn from_millis(total: u64) -> Self {
        Self {
            days: (total / MS_PER_DAY) as u32,
            hours: ((total % MS_PER_DAY) / MS_PER_HOUR) as u8,
            minutes: ((total % MS_PER_HOUR) / MS_PER_MINUTE) as u8,
            seconds: ((total % MS_PER_MINUTE) / MS_PER_SECOND) as u8,
            millis: (total % MS_PER_SECOND) as u16,
        }
    }

    pub fn as_millis(&self) -> u64 {
        u64::from(self.days) * MS_PER_DAY
            + u64::from(self.hours) * MS_PER_HOUR
            + u64::from(self.minutes) * MS_PER_MINUTE
            + u64::from(self.seconds) * MS_PER_SECOND
            + u64::from(self.millis)
    }

    /// Tick count this uptime corresponds to, modulo the counter width
    pub fn to_ticks(&self, period: TickPeriod) -> Tick {
        (self.as_millis() / u64::from(period.as_ms())) as Tick
    }
}

impl uDisplay for Uptime {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        uwrite!(f, "{} ", self.days)?;
        pad2(f, self.hours)?;
        f.write_str(":")?;
        pad2(f, self.minutes)?;
        f.write_str(":")?;
        pad2(f, self.seconds)?;
        f.write_str(".")?;
        if self.millis < 100 {
            f.write_str("0")?;
        }
        if self.millis < 10 {
            f.write_str("0")?;
        }
        uwrite!(f, "{}", self.millis)
    }
}

// ufmt has no width specifiers
fn pad2<W>(f: &mut Formatter<'_, W>, value: u8) -> core::result::Result<(), W::Error>
where
    W: uWrite + ?Sized,
{
    if value < 10 {
        f.write_str("0")?;
    }
    uwrite!(f, "{}", value)
}
