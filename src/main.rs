#![no_std]
#![no_main]

use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::digital::v2::ToggleableOutputPin;
use panic_halt as _;
use ufmt::{uwrite, uwriteln};

use avr_device::atmega128a::Peripherals;
use avr_runloop::config::{
    DRIFT_REPORT_INTERVAL_MS, HEARTBEAT_PERIOD_MS, LOG_LEVEL, SHELL_POLL_PERIOD_MS, TICK_PERIOD_MS,
};
use avr_runloop::drivers::SerialConsole;
use avr_runloop::hal::{board, power, Timer0, Uart};
use avr_runloop::logger::{GlobalLogger, Logger, Throttle};
use avr_runloop::rtos::{
    Action, Clock, Context, Runloop, RunloopConfig, TaskId, TaskStatus, TickPeriod, Uptime,
    FOREVER,
};
use avr_runloop::shell::{Args, Command, Shell};
use avr_runloop::{error, info, warn, Error, Result};

type Console = SerialConsole<Uart>;

static CLOCK: Clock = Clock::new();
static LOG: GlobalLogger<Console> = GlobalLogger::new();
static BLINK_LED: Mutex<RefCell<Option<board::Led1>>> = Mutex::new(RefCell::new(None));
static DRIFT_REPORTS: Mutex<RefCell<Throttle>> = Mutex::new(RefCell::new(Throttle::new(
    DRIFT_REPORT_INTERVAL_MS / TICK_PERIOD_MS as u32,
)));

/// Blink tasks started from the console run this many times by default
const BLINK_COUNT: u16 = 20;

fn on_tick() {
    CLOCK.tick();
}

fn uptime() -> Uptime {
    CLOCK.uptime(TickPeriod::default())
}

fn on_task_error(_: &mut Context<'_, '_>, id: TaskId, code: u8) {
    LOG.with(|log| error!(log, "task {} failed with {}", id, code));
}

fn on_sync_error(ctx: &mut Context<'_, '_>, id: TaskId, missed: u32) {
    let now = ctx.now();
    let admitted = critical_section::with(|cs| DRIFT_REPORTS.borrow_ref_mut(cs).admit(now));
    if let Some(held_back) = admitted {
        LOG.with(|log| {
            warn!(log, "task {} missed {} slots, {} reports held back", id, missed, held_back)
        });
    }
}

fn halt() -> ! {
    loop {
        power::wait_for_interrupt();
    }
}

fn toggle_blink_led(_: &mut Context<'_, '_>) -> TaskStatus {
    critical_section::with(|cs| match BLINK_LED.borrow_ref_mut(cs).as_mut() {
        Some(led) => {
            let _ = led.toggle();
            TaskStatus::Ok
        }
        None => TaskStatus::Error(1),
    })
}

fn task_arg(args: &Args<'_>, index: usize) -> Result<TaskId> {
    let index = args.parse_u16(index)?;
    u8::try_from(index)
        .ok()
        .and_then(TaskId::from_index)
        .ok_or(Error::BadArgument)
}

/// blink <period_ms> [count]
fn cmd_blink(ctx: &mut Context<'_, '_>, args: &Args<'_>, out: &mut Console) -> Result<()> {
    let period = args.parse_u16(0)?;
    let count = args.parse_u16_or(1, BLINK_COUNT)?;
    let id = ctx.add_task(Action::Fn(toggle_blink_led), count, period.into(), 0)?;
    let _ = uwriteln!(out, "task {}", id);
    Ok(())
}

/// kill <id>
fn cmd_kill(ctx: &mut Context<'_, '_>, args: &Args<'_>, out: &mut Console) -> Result<()> {
    let id = task_arg(args, 0)?;
    if !ctx.contains(id) {
        return Err(Error::NoSuchTask);
    }
    ctx.remove_task(id);
    let _ = uwriteln!(out, "removed {}", id);
    Ok(())
}

fn cmd_tasks(ctx: &mut Context<'_, '_>, _: &Args<'_>, out: &mut Console) -> Result<()> {
    for task in ctx.tasks() {
        let _ = uwrite!(out, "{} every {} ticks, due {}, ", task.id, task.period, task.next_due);
        if task.remaining == FOREVER {
            let _ = uwriteln!(out, "forever");
        } else {
            let _ = uwriteln!(out, "{} left", task.remaining);
        }
    }
    Ok(())
}

fn cmd_uptime(ctx: &mut Context<'_, '_>, _: &Args<'_>, out: &mut Console) -> Result<()> {
    let _ = uwriteln!(out, "{}", ctx.uptime());
    Ok(())
}

/// Drain the UART receive queue into the shell
fn poll_console(shell: &mut Shell, ctx: &mut Context<'_, '_>) -> TaskStatus {
    let commands: [Command<Context<'_, '_>, Console>; 4] = [
        Command::new("blink", "blink <period_ms> [count]", cmd_blink),
        Command::new("kill", "kill <task id>", cmd_kill),
        Command::new("tasks", "list scheduled tasks", cmd_tasks),
        Command::new("uptime", "time since start", cmd_uptime),
    ];

    LOG.with(|log| {
        let console = log.sink();
        while let Some(byte) = console.read_byte() {
            if let Some(Err(e)) = shell.feed(byte, &commands, ctx, console) {
                let _ = uwriteln!(console, "error: {}", e);
            }
        }
    });
    TaskStatus::Ok
}

#[avr_device::entry]
fn main() -> ! {
    let dp = match Peripherals::take() {
        Some(dp) => dp,
        None => halt(),
    };

    let mut heartbeat_led = board::Led0::new();
    critical_section::with(|cs| {
        BLINK_LED.borrow_ref_mut(cs).replace(board::Led1::new());
    });

    let console = SerialConsole::new(Uart::new(dp.USART0));
    LOG.install(Logger::new(console, LOG_LEVEL, uptime));

    let mut heartbeat = move |_: &mut Context<'_, '_>| {
        let _ = heartbeat_led.toggle();
        TaskStatus::Ok
    };
    let mut shell = Shell::new(true);
    let mut console_task = move |ctx: &mut Context<'_, '_>| poll_console(&mut shell, ctx);

    let mut timer = Timer0::new(dp.TC0);
    let config = RunloopConfig {
        period: TickPeriod::default(),
        on_task_error,
        on_sync_error,
        idle: Some(power::idle),
    };
    let mut runloop = match Runloop::init(&CLOCK, &mut timer, on_tick, config) {
        Ok(runloop) => runloop,
        Err(e) => {
            // The console still works with interrupts enabled
            unsafe { avr_device::interrupt::enable() };
            LOG.with(|log| error!(log, "runloop init failed: {}", e));
            halt()
        }
    };

    unsafe { avr_device::interrupt::enable() };
    LOG.with(|log| info!(log, "avr_runloop {}", env!("CARGO_PKG_VERSION")));

    let heartbeat_task = runloop.add_task(
        Action::Task(&mut heartbeat),
        FOREVER,
        HEARTBEAT_PERIOD_MS.into(),
        0,
    );
    let shell_task = runloop.add_task(
        Action::Task(&mut console_task),
        FOREVER,
        SHELL_POLL_PERIOD_MS.into(),
        0,
    );
    if let Err(e) = heartbeat_task.and(shell_task) {
        LOG.with(|log| error!(log, "cannot start tasks: {}", e));
        halt();
    }

    runloop.run()
}
