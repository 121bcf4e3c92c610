//! ATmega128 peripherals
//!
//! Register level modules exist only on AVR builds; the pieces with no
//! register access are shared with the host so they can be unit tested.

pub mod buffer;
pub mod timer;

#[cfg(target_arch = "avr")]
pub mod gpio;
#[cfg(target_arch = "avr")]
pub mod power;
#[cfg(target_arch = "avr")]
pub mod spi;
#[cfg(target_arch = "avr")]
pub mod uart;

pub use buffer::RingBuffer;
pub use timer::{tick_divider, Prescaler};

#[cfg(target_arch = "avr")]
pub use gpio::{board, Output};
#[cfg(target_arch = "avr")]
pub use power::{Power, SleepMode};
#[cfg(target_arch = "avr")]
pub use spi::Spi;
#[cfg(target_arch = "avr")]
pub use timer::Timer0;
#[cfg(target_arch = "avr")]
pub use uart::Uart;
