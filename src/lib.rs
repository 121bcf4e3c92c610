//! Cooperative tick-driven runloop for the ATmega128
//!
//! The scheduler ([`rtos`]), the command interpreter ([`shell`]), the
//! logger and the device drivers are plain `no_std` code that also builds on
//! the host. The register level [`hal`] modules are compiled for AVR only.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(
    all(target_arch = "avr", feature = "rt"),
    feature(abi_avr_interrupt)
)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

#[macro_use]
pub mod logger;

pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod rtos;
pub mod shell;

// The logging macros expand to `ufmt` formatting
#[doc(hidden)]
pub use ufmt;

pub use error::{Error, Result};
pub use rtos::{
    Action, Clock, Context, Runloop, RunloopConfig, Spawn, Task, TaskBuilder, TaskFn, TaskId,
    TaskStatus, TickPeriod, TickSource, Uptime, FOREVER,
};
