use embedded_hal::serial;
use ufmt::uWrite;

/// Text console on top of any byte-oriented serial port.
///
/// Writes block until the port accepts each byte; `\n` goes out as `\r\n`.
pub struct SerialConsole<S> {
    serial: S,
}

impl<S> SerialConsole<S> {
    pub fn new(serial: S) -> Self {
        Self { serial }
    }

    pub fn into_inner(self) -> S {
        self.serial
    }
}

impl<S: serial::Read<u8>> SerialConsole<S> {
    /// Next received byte, if one is waiting
    pub fn read_byte(&mut self) -> Option<u8> {
        self.serial.read().ok()
    }
}

impl<S: serial::Write<u8>> SerialConsole<S> {
    pub fn write_byte(&mut self, byte: u8) -> Result<(), S::Error> {
        nb::block!(self.serial.write(byte))
    }

    pub fn write_line(&mut self, s: &str) -> Result<(), S::Error> {
        self.write_str(s)?;
        self.write_str("\n")
    }

    pub fn flush(&mut self) -> Result<(), S::Error> {
        nb::block!(self.serial.flush())
    }
}

impl<S: serial::Write<u8>> uWrite for SerialConsole<S> {
    type Error = S::Error;

    fn write_str(&mut self, s: &str) -> Result<(), S::Error> {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r')?;
            }
            self.write_byte(byte)?;
        }
        Ok(())
    }
}
