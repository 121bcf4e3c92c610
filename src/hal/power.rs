use avr_device::atmega128a::CPU;

use crate::rtos::{Clock, Tick};

/// MCUCR sleep mode bits (SM1 = 4, SM0 = 3, SM2 = 2)
#[derive(Clone, Copy)]
#[repr(u8)]
pub enum SleepMode {
    Idle = 0x00,
    AdcNoiseReduction = 0x08,
    PowerDown = 0x10,
    PowerSave = 0x18,
    Standby = 0x14,
    ExtendedStandby = 0x1C,
}

const SM_MASK: u8 = 0x1C;
const SE: u8 = 1 << 5;

pub struct Power {
    _private: (),
}

impl Power {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn mcucr(&self) -> &avr_device::atmega128a::cpu::MCUCR {
        // MCUCR is only touched from the foreground
        unsafe { &(*CPU::ptr()).mcucr }
    }

    #[inline]
    pub fn set_sleep_mode(&mut self, mode: SleepMode) {
        self.mcucr()
            .modify(|r, w| unsafe { w.bits((r.bits() & !SM_MASK) | mode as u8) });
    }

    /// Sleep in `mode` until the next enabled interrupt
    pub fn sleep(&mut self, mode: SleepMode) {
        self.set_sleep_mode(mode);
        self.mcucr().modify(|r, w| unsafe { w.bits(r.bits() | SE) });
        avr_device::asm::sleep();
        self.mcucr().modify(|r, w| unsafe { w.bits(r.bits() & !SE) });
    }

    /// Sleep in `mode`, entered with interrupts masked. `sei` takes effect
    /// after the next instruction, so an interrupt that went pending while
    /// masked wakes the CPU instead of being slept through. Interrupts are
    /// enabled on return.
    pub fn sleep_unmasking(&mut self, mode: SleepMode) {
        self.set_sleep_mode(mode);
        self.mcucr().modify(|r, w| unsafe { w.bits(r.bits() | SE) });
        unsafe { core::arch::asm!("sei", "sleep") };
        self.mcucr().modify(|r, w| unsafe { w.bits(r.bits() & !SE) });
    }
}

impl Default for Power {
    fn default() -> Self {
        Self::new()
    }
}

/// Runloop idle hook: halt the CPU until the next tick or UART interrupt,
/// unless the tick after `seen` has already arrived
pub fn idle(clock: &Clock, seen: Tick) {
    clock.sleep_unless_ticked(seen, || Power::new().sleep_unmasking(SleepMode::Idle));
}

/// Halt the CPU until the next interrupt
pub fn wait_for_interrupt() {
    Power::new().sleep(SleepMode::Idle);
}
