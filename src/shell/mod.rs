//! Line oriented command interpreter for the serial console
//!
//! Bytes are fed one at a time as they arrive from the UART. A carriage
//! return or line feed completes the line, which is split into whitespace
//! separated tokens (double quotes keep spaces inside a token) and handed to
//! the first command whose name matches the first token.
//!
//! The command table is passed to [`Shell::feed`] rather than stored, so the
//! environment a handler acts on may borrow from the caller for just that
//! call. On target the environment is the runloop [`Context`] of the task
//! polling the console.
//!
//! [`Context`]: crate::rtos::Context

use heapless::Vec;
use ufmt::{uWrite, uwrite, uwriteln};

use crate::config::{SHELL_LINE_LEN, SHELL_MAX_ARGS};
use crate::error::{Error, Result};

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

/// Command handler: environment, arguments (without the command name), and
/// the console to answer on. Console write failures are not errors.
pub type Handler<E, W> = fn(&mut E, &Args<'_>, &mut W) -> Result<()>;

pub struct Command<E, W> {
    pub name: &'static str,
    pub help: &'static str,
    pub handler: Handler<E, W>,
}

impl<E, W> Command<E, W> {
    pub const fn new(name: &'static str, help: &'static str, handler: Handler<E, W>) -> Self {
        Self {
            name,
            help,
            handler,
        }
    }
}

/// Tokens following the command name
pub struct Args<'l> {
    /// Whole line, command name included
    tokens: Vec<&'l str, SHELL_MAX_ARGS>,
}

impl<'l> Args<'l> {
    pub fn len(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&'l str> {
        self.tokens.get(index + 1).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'l str> + '_ {
        self.tokens.iter().skip(1).copied()
    }

    /// Argument `index` as a decimal number; missing or malformed is
    /// [`Error::BadArgument`]
    pub fn parse_u16(&self, index: usize) -> Result<u16> {
        self.get(index)
            .and_then(|token| token.parse().ok())
            .ok_or(Error::BadArgument)
    }

    /// Like [`Args::parse_u16`], but `default` when the argument is absent
    pub fn parse_u16_or(&self, index: usize, default: u16) -> Result<u16> {
        if index < self.len() {
            self.parse_u16(index)
        } else {
            Ok(default)
        }
    }
}

/// Split `line` into at most `SHELL_MAX_ARGS` tokens, the first being the
/// command name. An unterminated quote runs to the end of the line.
pub fn tokenize(line: &str) -> Result<Vec<&str, SHELL_MAX_ARGS>> {
    let mut tokens = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let (start, end) = if bytes[i] == b'"' {
            let start = i + 1;
            let end = bytes[start..]
                .iter()
                .position(|&b| b == b'"')
                .map_or(bytes.len(), |n| start + n);
            i = end + 1;
            (start, end)
        } else {
            let start = i;
            let end = bytes[start..]
                .iter()
                .position(|b| b.is_ascii_whitespace())
                .map_or(bytes.len(), |n| start + n);
            i = end;
            (start, end)
        };

        tokens
            .push(&line[start..end])
            .map_err(|_| Error::TooManyArgs)?;
    }

    Ok(tokens)
}

pub struct Shell {
    line: Vec<u8, SHELL_LINE_LEN>,
    overflowed: bool,
    echo: bool,
}

impl Shell {
    pub const fn new(echo: bool) -> Self {
        Self {
            line: Vec::new(),
            overflowed: false,
            echo,
        }
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Consume one input byte.
    ///
    /// Returns `None` while a line is being collected (and for empty lines),
    /// otherwise the outcome of running the completed line.
    pub fn feed<E, W: uWrite>(
        &mut self,
        byte: u8,
        commands: &[Command<E, W>],
        env: &mut E,
        out: &mut W,
    ) -> Option<Result<()>> {
        match byte {
            b'\r' | b'\n' => {
                if self.echo {
                    let _ = out.write_str("\n");
                }
                let result = self.complete(commands, env, out);
                self.line.clear();
                self.overflowed = false;
                result
            }
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() && self.echo {
                    let _ = out.write_str("\x08 \x08");
                }
                None
            }
            0x20..=0x7E => {
                if self.line.push(byte).is_err() {
                    self.overflowed = true;
                } else if self.echo {
                    let _ = out.write_char(char::from(byte));
                }
                None
            }
            _ => None,
        }
    }

    fn complete<E, W: uWrite>(
        &mut self,
        commands: &[Command<E, W>],
        env: &mut E,
        out: &mut W,
    ) -> Option<Result<()>> {
        if self.overflowed {
            return Some(Err(Error::LineTooLong));
        }
        // Only printable ASCII is ever stored
        let line = core::str::from_utf8(&self.line).ok()?;
        let tokens = match tokenize(line) {
            Ok(tokens) => tokens,
            Err(e) => return Some(Err(e)),
        };
        let name = *tokens.first()?;
        let args = Args { tokens };

        if name == "help" {
            print_help(commands, out);
            return Some(Ok(()));
        }

        let result = match commands.iter().find(|command| command.name == name) {
            Some(command) => (command.handler)(env, &args, out),
            None => Err(Error::UnknownCommand),
        };
        Some(result)
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(true)
    }
}

fn print_help<E, W: uWrite>(commands: &[Command<E, W>], out: &mut W) {
    let _ = uwriteln!(out, "help - list commands");
    for command in commands {
        let _ = uwrite!(out, "{} - ", command.name);
        let _ = uwriteln!(out, "{}", command.help);
    }
}
