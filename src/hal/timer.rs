//! Timer0 as the runloop tick source
//!
//! Timer0 runs in CTC mode; every compare match raises `TIMER0_COMP`, whose
//! handler calls the registered tick callback.

/// Timer0 clock select values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Prescaler {
    Direct = 1,
    Div8 = 2,
    Div32 = 3,
    Div64 = 4,
    Div128 = 5,
    Div256 = 6,
    Div1024 = 7,
}

impl Prescaler {
    const ALL: [Prescaler; 7] = [
        Prescaler::Direct,
        Prescaler::Div8,
        Prescaler::Div32,
        Prescaler::Div64,
        Prescaler::Div128,
        Prescaler::Div256,
        Prescaler::Div1024,
    ];

    pub const fn divisor(&self) -> u32 {
        match self {
            Self::Direct => 1,
            Self::Div8 => 8,
            Self::Div32 => 32,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
            Self::Div1024 => 1024,
        }
    }
}

/// Smallest prescaler and the compare value giving exactly one compare match
/// every `period_ms` with an 8-bit counter, if there is one.
pub fn tick_divider(cpu_hz: u32, period_ms: u16) -> Option<(Prescaler, u8)> {
    let cycles = u64::from(cpu_hz) * u64::from(period_ms);
    Prescaler::ALL.iter().find_map(|&prescaler| {
        let per_count = u64::from(prescaler.divisor()) * 1000;
        if cycles % per_count != 0 {
            return None;
        }
        match cycles / per_count {
            counts @ 1..=256 => Some((prescaler, (counts - 1) as u8)),
            _ => None,
        }
    })
}

#[cfg(target_arch = "avr")]
pub use self::avr::Timer0;

#[cfg(target_arch = "avr")]
mod avr {
    use avr_device::atmega128a::TC0;
    use core::cell::Cell;
    use critical_section::Mutex;

    use super::tick_divider;
    use crate::config::CPU_FREQ_HZ;
    use crate::error::{Error, Result};
    use crate::rtos::{TickPeriod, TickSource};

    const WGM01: u8 = 1 << 3;
    const OCIE0: u8 = 1 << 1;

    static TICK_CALLBACK: Mutex<Cell<Option<fn()>>> = Mutex::new(Cell::new(None));

    pub struct Timer0 {
        tc0: TC0,
    }

    impl Timer0 {
        pub fn new(tc0: TC0) -> Self {
            // Stopped, normal mode
            tc0.tccr0.write(|w| unsafe { w.bits(0) });
            tc0.tcnt0.write(|w| unsafe { w.bits(0) });
            Self { tc0 }
        }

        pub fn stop(&mut self) {
            self.tc0.timsk.modify(|r, w| unsafe { w.bits(r.bits() & !OCIE0) });
            self.tc0.tccr0.write(|w| unsafe { w.bits(0) });
        }
    }

    impl TickSource for Timer0 {
        fn configure(&mut self, period: TickPeriod) -> Result<()> {
            let (prescaler, compare) =
                tick_divider(CPU_FREQ_HZ, period.as_ms()).ok_or(Error::TickRate)?;

            self.tc0.tccr0.write(|w| unsafe { w.bits(0) });
            self.tc0.tcnt0.write(|w| unsafe { w.bits(0) });
            self.tc0.ocr0.write(|w| unsafe { w.bits(compare) });
            self.tc0.timsk.modify(|r, w| unsafe { w.bits(r.bits() | OCIE0) });
            // Starting the clock last keeps the first period full length
            self.tc0
                .tccr0
                .write(|w| unsafe { w.bits(WGM01 | prescaler as u8) });
            Ok(())
        }

        fn set_tick_callback(&mut self, callback: fn()) {
            critical_section::with(|cs| TICK_CALLBACK.borrow(cs).set(Some(callback)));
        }
    }

    #[cfg(feature = "rt")]
    #[avr_device::interrupt(atmega128a)]
    fn TIMER0_COMP() {
        let callback = critical_section::with(|cs| TICK_CALLBACK.borrow(cs).get());
        if let Some(callback) = callback {
            callback();
        }
    }
}
