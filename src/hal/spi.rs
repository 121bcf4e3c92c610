//! SPI (Serial Peripheral Interface) master

use avr_device::atmega128a::SPI;
use core::convert::Infallible;
use embedded_hal::blocking::spi;

/// SPI clock prescaler options
#[derive(Clone, Copy)]
#[repr(u8)]
pub enum SpiPrescaler {
    Div4 = 0,
    Div16 = 1,
    Div64 = 2,
    Div128 = 3,
}

/// SPI data order
#[derive(Clone, Copy)]
pub enum DataOrder {
    MsbFirst,
    LsbFirst,
}

/// SPI mode configurations
#[derive(Clone, Copy)]
pub enum SpiMode {
    Mode0, // CPOL=0, CPHA=0
    Mode1, // CPOL=0, CPHA=1
    Mode2, // CPOL=1, CPHA=0
    Mode3, // CPOL=1, CPHA=1
}

// SPCR
const SPE: u8 = 1 << 6;
const DORD: u8 = 1 << 5;
const MSTR: u8 = 1 << 4;
const MODE_MASK: u8 = 0x0C;
const CLOCK_MASK: u8 = 0x03;
// SPSR
const SPIF: u8 = 1 << 7;

/// SPI peripheral driver. SS, SCK and MOSI must already be outputs.
pub struct Spi {
    spi: SPI,
}

impl Spi {
    /// Enable as master: mode 0, MSB first, Fosc/4
    pub fn new(spi: SPI) -> Self {
        spi.spcr.write(|w| unsafe { w.bits(SPE | MSTR) });
        Self { spi }
    }

    pub fn set_mode(&mut self, mode: SpiMode) {
        let bits = match mode {
            SpiMode::Mode0 => 0x00,
            SpiMode::Mode1 => 0x04,
            SpiMode::Mode2 => 0x08,
            SpiMode::Mode3 => 0x0C,
        };
        self.spi
            .spcr
            .modify(|r, w| unsafe { w.bits((r.bits() & !MODE_MASK) | bits) });
    }

    pub fn set_clock(&mut self, prescaler: SpiPrescaler) {
        self.spi
            .spcr
            .modify(|r, w| unsafe { w.bits((r.bits() & !CLOCK_MASK) | prescaler as u8) });
    }

    pub fn set_data_order(&mut self, order: DataOrder) {
        self.spi.spcr.modify(|r, w| unsafe {
            match order {
                DataOrder::MsbFirst => w.bits(r.bits() & !DORD),
                DataOrder::LsbFirst => w.bits(r.bits() | DORD),
            }
        });
    }

    /// Exchange a single byte
    pub fn transfer_byte(&mut self, byte: u8) -> u8 {
        self.spi.spdr.write(|w| unsafe { w.bits(byte) });
        while self.spi.spsr.read().bits() & SPIF == 0 {}
        self.spi.spdr.read().bits()
    }
}

impl spi::Transfer<u8> for Spi {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(*word);
        }
        Ok(words)
    }
}

impl spi::Write<u8> for Spi {
    type Error = Infallible;

    fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
        for &word in words {
            self.transfer_byte(word);
        }
        Ok(())
    }
}
