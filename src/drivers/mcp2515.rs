//! MCP2515 stand-alone CAN controller over SPI
//!
//! Standard (11-bit) data frames only. Transmission uses the first idle of
//! the three TX buffers; reception drains RXB0 before RXB1.

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;

use crate::error::{Error, Result};

// SPI instructions
const RESET: u8 = 0xC0;
const READ: u8 = 0x03;
const WRITE: u8 = 0x02;
const BIT_MODIFY: u8 = 0x05;
const READ_STATUS: u8 = 0xA0;
const LOAD_TX: u8 = 0x40;
const RTS: u8 = 0x80;
const READ_RX: u8 = 0x90;

// Registers
const CANSTAT: u8 = 0x0E;
const CANCTRL: u8 = 0x0F;
const CNF3: u8 = 0x28;

const MODE_MASK: u8 = 0xE0;

// READ STATUS bits
const RX0IF: u8 = 1 << 0;
const RX1IF: u8 = 1 << 1;
const TX_PENDING: [u8; 3] = [1 << 2, 1 << 4, 1 << 6];

const MAX_STANDARD_ID: u16 = 0x7FF;
const MAX_DLC: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal = 0x00,
    Sleep = 0x20,
    Loopback = 0x40,
    ListenOnly = 0x60,
    Configuration = 0x80,
}

impl Mode {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits & MODE_MASK {
            0x00 => Some(Self::Normal),
            0x20 => Some(Self::Sleep),
            0x40 => Some(Self::Loopback),
            0x60 => Some(Self::ListenOnly),
            0x80 => Some(Self::Configuration),
            _ => None,
        }
    }
}

/// CNF1..CNF3 register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    pub cnf1: u8,
    pub cnf2: u8,
    pub cnf3: u8,
}

impl BitTiming {
    /// 125 kbit/s with a 16 MHz crystal
    pub const KBPS_125_16MHZ: Self = Self {
        cnf1: 0x03,
        cnf2: 0xF0,
        cnf3: 0x86,
    };

    /// 500 kbit/s with a 16 MHz crystal
    pub const KBPS_500_16MHZ: Self = Self {
        cnf1: 0x00,
        cnf2: 0xF0,
        cnf3: 0x86,
    };
}

/// Standard data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u16,
    len: u8,
    data: [u8; MAX_DLC],
}

impl CanFrame {
    pub fn new(id: u16, payload: &[u8]) -> Result<Self> {
        if id > MAX_STANDARD_ID || payload.len() > MAX_DLC {
            return Err(Error::CanBadFrame);
        }
        let mut data = [0; MAX_DLC];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }

    fn header(&self) -> [u8; 5] {
        [
            (self.id >> 3) as u8,
            ((self.id & 0x07) as u8) << 5,
            0,
            0,
            self.len,
        ]
    }

    fn from_rx_buffer(raw: &[u8; 13]) -> Self {
        let id = (u16::from(raw[0]) << 3) | u16::from(raw[1] >> 5);
        let len = (raw[4] & 0x0F).min(MAX_DLC as u8);
        let mut data = [0; MAX_DLC];
        data.copy_from_slice(&raw[5..13]);
        Self { id, len, data }
    }
}

pub struct Mcp2515<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Mcp2515<SPI, CS>
where
    SPI: Transfer<u8> + Write<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.cs.set_low().map_err(|_| Error::Bus)?;
        let result = Write::write(&mut self.spi, bytes).map_err(|_| Error::Bus);
        self.cs.set_high().map_err(|_| Error::Bus)?;
        result
    }

    fn transfer(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.cs.set_low().map_err(|_| Error::Bus)?;
        let result = self.spi.transfer(bytes).map(|_| ()).map_err(|_| Error::Bus);
        self.cs.set_high().map_err(|_| Error::Bus)?;
        result
    }

    /// Software reset; the controller comes back in configuration mode
    pub fn reset(&mut self) -> Result<()> {
        self.write(&[RESET])
    }

    pub fn read_register(&mut self, address: u8) -> Result<u8> {
        let mut buf = [READ, address, 0];
        self.transfer(&mut buf)?;
        Ok(buf[2])
    }

    pub fn write_register(&mut self, address: u8, value: u8) -> Result<()> {
        self.write(&[WRITE, address, value])
    }

    pub fn modify_register(&mut self, address: u8, mask: u8, value: u8) -> Result<()> {
        self.write(&[BIT_MODIFY, address, mask, value])
    }

    /// Only takes effect in configuration mode
    pub fn set_bit_timing(&mut self, timing: BitTiming) -> Result<()> {
        self.write(&[WRITE, CNF3, timing.cnf3, timing.cnf2, timing.cnf1])
    }

    /// Request an operating mode. The switch completes asynchronously; poll
    /// [`Mcp2515::mode`] to confirm.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.modify_register(CANCTRL, MODE_MASK, mode as u8)
    }

    pub fn mode(&mut self) -> Result<Mode> {
        let stat = self.read_register(CANSTAT)?;
        Mode::from_bits(stat).ok_or(Error::Bus)
    }

    fn status(&mut self) -> Result<u8> {
        let mut buf = [READ_STATUS, 0];
        self.transfer(&mut buf)?;
        Ok(buf[1])
    }

    /// Queue `frame` in a free TX buffer and request its transmission
    pub fn transmit(&mut self, frame: &CanFrame) -> Result<()> {
        let status = self.status()?;
        let buffer = TX_PENDING
            .iter()
            .position(|&pending| status & pending == 0)
            .ok_or(Error::CanBufferFull)? as u8;

        let mut load = [0u8; 1 + 5 + MAX_DLC];
        load[0] = LOAD_TX | (buffer << 1);
        load[1..6].copy_from_slice(&frame.header());
        let end = 6 + frame.data().len();
        load[6..end].copy_from_slice(frame.data());
        self.write(&load[..end])?;

        self.write(&[RTS | (1 << buffer)])
    }

    pub fn has_pending_rx(&mut self) -> Result<bool> {
        Ok(self.status()? & (RX0IF | RX1IF) != 0)
    }

    /// Take the oldest received frame, if any
    pub fn receive(&mut self) -> Result<Option<CanFrame>> {
        let status = self.status()?;
        let instruction = if status & RX0IF != 0 {
            READ_RX
        } else if status & RX1IF != 0 {
            READ_RX | 0x04
        } else {
            return Ok(None);
        };

        let mut buf = [0u8; 14];
        buf[0] = instruction;
        // Raising CS after READ RX BUFFER clears the RXnIF flag
        self.transfer(&mut buf)?;

        let mut raw = [0u8; 13];
        raw.copy_from_slice(&buf[1..]);
        Ok(Some(CanFrame::from_rx_buffer(&raw)))
    }
}
