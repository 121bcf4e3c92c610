//! Interrupt driven USART0
//!
//! Received bytes are queued by `USART0_RX`; transmitted bytes are queued by
//! the foreground and drained by `USART0_UDRE`.

use avr_device::atmega128a::USART0;
use core::cell::RefCell;
use core::convert::Infallible;
use critical_section::Mutex;
use embedded_hal::serial;

use super::buffer::RingBuffer;
use crate::config::{CPU_FREQ_HZ, UART_BAUD};

const BUFFER_SIZE: usize = 32;

const UBRR: u16 = (CPU_FREQ_HZ / (16 * UART_BAUD) - 1) as u16;

// UCSR0B
const RXCIE: u8 = 1 << 7;
const UDRIE: u8 = 1 << 5;
const RXEN: u8 = 1 << 4;
const TXEN: u8 = 1 << 3;
// UCSR0C: 8 data bits, no parity, 1 stop bit
const FRAME_8N1: u8 = 0x06;

static TX_BUFFER: Mutex<RefCell<RingBuffer<BUFFER_SIZE>>> =
    Mutex::new(RefCell::new(RingBuffer::new()));
static RX_BUFFER: Mutex<RefCell<RingBuffer<BUFFER_SIZE>>> =
    Mutex::new(RefCell::new(RingBuffer::new()));

pub struct Uart {
    usart: USART0,
}

impl Uart {
    pub fn new(usart: USART0) -> Self {
        usart.ubrr0h.write(|w| unsafe { w.bits((UBRR >> 8) as u8) });
        usart.ubrr0l.write(|w| unsafe { w.bits(UBRR as u8) });
        usart.ucsr0c.write(|w| unsafe { w.bits(FRAME_8N1) });
        usart.ucsr0b.write(|w| unsafe { w.bits(RXEN | TXEN | RXCIE) });

        Self { usart }
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        critical_section::with(|cs| RX_BUFFER.borrow_ref_mut(cs).read())
    }

    /// Queue a byte for transmission; `false` if the queue is full
    pub fn write_byte(&mut self, byte: u8) -> bool {
        let queued = critical_section::with(|cs| TX_BUFFER.borrow_ref_mut(cs).write(byte));
        if queued {
            self.usart
                .ucsr0b
                .modify(|r, w| unsafe { w.bits(r.bits() | UDRIE) });
        }
        queued
    }

    fn tx_idle(&self) -> bool {
        critical_section::with(|cs| TX_BUFFER.borrow_ref(cs).is_empty())
    }
}

impl serial::Read<u8> for Uart {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.read_byte().ok_or(nb::Error::WouldBlock)
    }
}

impl serial::Write<u8> for Uart {
    type Error = Infallible;

    fn write(&mut self, byte: u8) -> nb::Result<(), Infallible> {
        if self.write_byte(byte) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn flush(&mut self) -> nb::Result<(), Infallible> {
        if self.tx_idle() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

#[cfg(feature = "rt")]
#[avr_device::interrupt(atmega128a)]
fn USART0_RX() {
    let usart = unsafe { &*USART0::ptr() };
    let byte = usart.udr0.read().bits();
    // Overruns drop the newest byte
    critical_section::with(|cs| {
        RX_BUFFER.borrow_ref_mut(cs).write(byte);
    });
}

#[cfg(feature = "rt")]
#[avr_device::interrupt(atmega128a)]
fn USART0_UDRE() {
    let usart = unsafe { &*USART0::ptr() };
    match critical_section::with(|cs| TX_BUFFER.borrow_ref_mut(cs).read()) {
        Some(byte) => usart.udr0.write(|w| unsafe { w.bits(byte) }),
        None => usart
            .ucsr0b
            .modify(|r, w| unsafe { w.bits(r.bits() & !UDRIE) }),
    }
}
