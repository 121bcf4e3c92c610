pub mod mcp2515;
pub mod serial_console;

pub use mcp2515::{BitTiming, CanFrame, Mcp2515, Mode};
pub use serial_console::SerialConsole;
