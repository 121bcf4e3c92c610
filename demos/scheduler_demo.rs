//! Runloop walkthrough on the BigAVR2 board
//!
//! - a one-shot greeting after 100 ms
//! - a stateful periodic task that stops itself after five runs
//! - a countdown that re-schedules itself instead of blocking in a delay loop
//! - a task that overstays its period now and then, so the sync error
//!   handler reports the skipped slots
//! - a one-shot that stops the runloop after ten seconds
#![no_std]
#![no_main]

use core::cell::{Cell, RefCell};
use critical_section::Mutex;
use panic_halt as _;

use avr_device::atmega128a::Peripherals;
use avr_runloop::config::{DRIFT_REPORT_INTERVAL_MS, LOG_LEVEL, TICK_PERIOD_MS};
use avr_runloop::drivers::SerialConsole;
use avr_runloop::hal::{power, Timer0, Uart};
use avr_runloop::logger::{GlobalLogger, Logger, Throttle};
use avr_runloop::rtos::{
    Action, Clock, Context, Runloop, RunloopConfig, TaskBuilder, TaskId, TaskStatus, TickPeriod,
    Uptime,
};
use avr_runloop::{error, info, warn};

static CLOCK: Clock = Clock::new();
static LOG: GlobalLogger<SerialConsole<Uart>> = GlobalLogger::new();
static COUNTDOWN: Mutex<Cell<u8>> = Mutex::new(Cell::new(5));
static DRIFT_REPORTS: Mutex<RefCell<Throttle>> = Mutex::new(RefCell::new(Throttle::new(
    DRIFT_REPORT_INTERVAL_MS / TICK_PERIOD_MS as u32,
)));

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
    LOG.with(|log| error!(log, "task {} failed with {}", id, code));
}

fn on_sync_error(ctx: &mut Context<'_, '_>, id: TaskId, missed: u32) {
    let now = ctx.now();
    let admitted = critical_section::with(|cs| DRIFT_REPORTS.borrow_ref_mut(cs).admit(now));
    if let Some(held_back) = admitted {
        LOG.with(|log| {
            warn!(log, "task {} late, skipped {} slots ({} quiet)", id, missed, held_back)
        });
    }
}

fn greet(ctx: &mut Context<'_, '_>) -> TaskStatus {
    let id = ctx.task_id();
    LOG.with(|log| info!(log, "one-shot {} fired", id));
    TaskStatus::Ok
}

fn countdown(ctx: &mut Context<'_, '_>) -> TaskStatus {
    let left = critical_section::with(|cs| {
        let counter = COUNTDOWN.borrow(cs);
        let left = counter.get().saturating_sub(1);
        counter.set(left);
        left
    });

    if left == 0 {
        LOG.with(|log| info!(log, "liftoff"));
        return TaskStatus::Ok;
    }

    LOG.with(|log| info!(log, "T-{}", left));
    // Our own slot stays reserved until we return, so the next step lands
    // in another one
    match ctx.add_task(Action::Fn(countdown), 1, 0, 1000) {
        Ok(_) => TaskStatus::Ok,
        Err(_) => TaskStatus::Error(1),
    }
}

fn stop(ctx: &mut Context<'_, '_>) -> TaskStatus {
    ctx.request_stop();
    TaskStatus::Ok
}

#[avr_device::entry]
fn main() -> ! {
    let dp = match Peripherals::take() {
        Some(dp) => dp,
        None => halt(),
    };

    let console = SerialConsole::new(Uart::new(dp.USART0));
    LOG.install(Logger::new(console, LOG_LEVEL, uptime));

    let mut runs = 0u8;
    let mut counter = move |ctx: &mut Context<'_, '_>| {
        runs += 1;
        let id = ctx.task_id();
        LOG.with(|log| info!(log, "task {} run {}", id, runs));
        if runs == 5 {
            TaskStatus::Abort
        } else {
            TaskStatus::Ok
        }
    };

    let mut passes = 0u8;
    let mut sluggish = move |_: &mut Context<'_, '_>| {
        passes = passes.wrapping_add(1);
        if passes % 4 == 0 {
            // Several periods' worth at 16 MHz
            for _ in 0..40_000u32 {
                avr_device::asm::nop();
            }
        }
        TaskStatus::Ok
    };

    let mut timer = Timer0::new(dp.TC0);
    let config = RunloopConfig {
        on_task_error,
        on_sync_error,
        idle: Some(power::idle),
        ..RunloopConfig::default()
    };
    let mut runloop = match Runloop::init(&CLOCK, &mut timer, on_tick, config) {
        Ok(runloop) => runloop,
        Err(_) => halt(),
    };
    unsafe { avr_device::interrupt::enable() };

    let scheduled = TaskBuilder::function(greet)
        .delay(100)
        .spawn(&mut runloop)
        .and_then(|_| {
            TaskBuilder::task(&mut counter)
                .executions(100)
                .period(200)
                .spawn(&mut runloop)
        })
        .and_then(|_| TaskBuilder::function(countdown).delay(1000).spawn(&mut runloop))
        .and_then(|_| {
            TaskBuilder::task(&mut sluggish)
                .forever()
                .period(10)
                .spawn(&mut runloop)
        })
        .and_then(|_| TaskBuilder::function(stop).delay(10_000).spawn(&mut runloop));
    if let Err(e) = scheduled {
        LOG.with(|log| error!(log, "scheduling failed: {}", e));
        halt();
    }

    runloop.run_until_stopped();

    let left = runloop.task_count();
    LOG.with(|log| info!(log, "stopped with {} tasks scheduled", left));
    halt()
}
