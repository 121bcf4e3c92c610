use avr_device::atmega128a::{PORTA, PORTB};
use core::convert::Infallible;
use core::marker::PhantomData;
use embedded_hal::digital::v2::{OutputPin, ToggleableOutputPin};

/// Register access for one I/O port
pub trait Port {
    fn ddr_modify(f: impl FnOnce(u8) -> u8);
    fn port_modify(f: impl FnOnce(u8) -> u8);
}

macro_rules! impl_port {
    ($PORT:ident, $ddr:ident, $port:ident) => {
        impl Port for $PORT {
            fn ddr_modify(f: impl FnOnce(u8) -> u8) {
                unsafe { (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(f(r.bits()))) }
            }

            fn port_modify(f: impl FnOnce(u8) -> u8) {
                unsafe { (*$PORT::ptr()).$port.modify(|r, w| w.bits(f(r.bits()))) }
            }
        }
    };
}

impl_port!(PORTA, ddra, porta);
impl_port!(PORTB, ddrb, portb);

/// Push-pull output on pin `PIN` of `PORT`
pub struct Output<PORT, const PIN: u8> {
    _port: PhantomData<PORT>,
}

impl<PORT: Port, const PIN: u8> Output<PORT, PIN> {
    /// Switch the pin to output, driven low. The caller must own the pin.
    pub fn new() -> Self {
        PORT::port_modify(|bits| bits & !(1 << PIN));
        PORT::ddr_modify(|bits| bits | (1 << PIN));
        Self { _port: PhantomData }
    }
}

impl<PORT: Port, const PIN: u8> OutputPin for Output<PORT, PIN> {
    type Error = Infallible;

    fn set_high(&mut self) -> Result<(), Infallible> {
        PORT::port_modify(|bits| bits | (1 << PIN));
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        PORT::port_modify(|bits| bits & !(1 << PIN));
        Ok(())
    }
}

impl<PORT: Port, const PIN: u8> ToggleableOutputPin for Output<PORT, PIN> {
    type Error = Infallible;

    fn toggle(&mut self) -> Result<(), Infallible> {
        PORT::port_modify(|bits| bits ^ (1 << PIN));
        Ok(())
    }
}

// BigAVR2 board-specific pin definitions
pub mod board {
    use super::*;

    pub type Led0 = Output<PORTA, 0>;
    pub type Led1 = Output<PORTA, 1>;
    /// MCP2515 chip select
    pub type CanCs = Output<PORTB, 4>;
    /// SPI slave select, must be an output in master mode
    pub type SpiSs = Output<PORTB, 0>;
    pub type SpiSck = Output<PORTB, 1>;
    pub type SpiMosi = Output<PORTB, 2>;
}
