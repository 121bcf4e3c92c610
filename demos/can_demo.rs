//! MCP2515 on the SPI bus, driven from two runloop tasks
//!
//! One task queues a counter frame every 100 ms; the other polls the
//! controller for received frames every 10 ms and logs them.
#![no_std]
#![no_main]

use core::cell::RefCell;
use embedded_hal::digital::v2::OutputPin;
use panic_halt as _;

use avr_device::atmega128a::Peripherals;
use avr_runloop::config::LOG_LEVEL;
use avr_runloop::drivers::{BitTiming, CanFrame, Mcp2515, Mode, SerialConsole};
use avr_runloop::hal::spi::SpiPrescaler;
use avr_runloop::hal::{board, power, Spi, Timer0, Uart};
use avr_runloop::logger::{GlobalLogger, Logger};
use avr_runloop::rtos::{
    Action, Clock, Context, Runloop, RunloopConfig, TaskId, TaskStatus, TickPeriod, Uptime,
    FOREVER,
};
use avr_runloop::{debug, error, info, warn, Error};

const TX_ID: u16 = 0x100;
const TX_PERIOD_MS: u32 = 100;
const RX_PERIOD_MS: u32 = 10;

static CLOCK: Clock = Clock::new();
static LOG: GlobalLogger<SerialConsole<Uart>> = GlobalLogger::new();

fn on_tick() {
    CLOCK.tick();
}

fn uptime() -> Uptime {
    CLOCK.uptime(TickPeriod::default())
}

fn halt() -> ! {
    loop {
        power::wait_for_interrupt();
    }
}

fn on_task_error(_: &mut Context<'_, '_>, id: TaskId, code: u8) {
    LOG.with(|log| error!(log, "task {} stopped on bus error {}", id, code));
}

#[avr_device::entry]
fn main() -> ! {
    let dp = match Peripherals::take() {
        Some(dp) => dp,
        None => halt(),
    };

    let console = SerialConsole::new(Uart::new(dp.USART0));
    LOG.install(Logger::new(console, LOG_LEVEL, uptime));

    // SS must be an output for the SPI to stay master
    let _ss = board::SpiSs::new();
    let _sck = board::SpiSck::new();
    let _mosi = board::SpiMosi::new();
    let mut cs = board::CanCs::new();
    let _ = cs.set_high();

    let mut spi = Spi::new(dp.SPI);
    spi.set_clock(SpiPrescaler::Div16);

    let mut timer = Timer0::new(dp.TC0);
    let config = RunloopConfig {
        on_task_error,
        idle: Some(power::idle),
        ..RunloopConfig::default()
    };
    let mut runloop = match Runloop::init(&CLOCK, &mut timer, on_tick, config) {
        Ok(runloop) => runloop,
        Err(_) => halt(),
    };
    unsafe { avr_device::interrupt::enable() };

    let mut mcp = Mcp2515::new(spi, cs);
    let setup = mcp
        .reset()
        .and_then(|_| {
            // Oscillator start-up after reset
            for _ in 0..1_000u16 {
                avr_device::asm::nop();
            }
            mcp.set_bit_timing(BitTiming::KBPS_125_16MHZ)
        })
        .and_then(|_| mcp.set_mode(Mode::Normal));
    if let Err(e) = setup {
        LOG.with(|log| error!(log, "MCP2515 setup failed: {}", e));
        halt();
    }
    let can = RefCell::new(mcp);

    let mut sequence = 0u8;
    let mut transmit = |_: &mut Context<'_, '_>| {
        let frame = match CanFrame::new(TX_ID, &[sequence]) {
            Ok(frame) => frame,
            Err(_) => return TaskStatus::Error(1),
        };
        match can.borrow_mut().transmit(&frame) {
            Ok(()) => {
                sequence = sequence.wrapping_add(1);
                TaskStatus::Ok
            }
            Err(Error::CanBufferFull) => {
                LOG.with(|log| warn!(log, "TX buffers full, frame {} dropped", sequence));
                TaskStatus::Ok
            }
            Err(_) => TaskStatus::Error(2),
        }
    };

    let mut receive = |_: &mut Context<'_, '_>| {
        let mut can = can.borrow_mut();
        loop {
            match can.receive() {
                Ok(Some(frame)) => LOG.with(|log| {
                    info!(log, "rx id {} len {}", frame.id(), frame.data().len())
                }),
                Ok(None) => return TaskStatus::Ok,
                Err(_) => return TaskStatus::Error(3),
            };
        }
    };

    let started = runloop
        .add_task(Action::Task(&mut transmit), FOREVER, TX_PERIOD_MS, 0)
        .and_then(|_| runloop.add_task(Action::Task(&mut receive), FOREVER, RX_PERIOD_MS, 0));
    if let Err(e) = started {
        LOG.with(|log| error!(log, "cannot start tasks: {}", e));
        halt();
    }
    LOG.with(|log| debug!(log, "CAN demo running"));

    runloop.run()
}
