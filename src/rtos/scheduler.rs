//! Cooperative runloop driven by the tick interrupt
//!
//! One [`Runloop`] owns the task table and reads the shared [`Clock`]. Each
//! pass scans the table in ascending task id order and runs every task whose
//! due tick has been reached. Tasks run to completion; a task that overstays
//! its period makes the next due time slip, which is reported through the
//! sync error handler and answered by skipping the missed slots instead of
//! replaying them.
//!
//! The tick interrupt only ever touches the clock. Everything else, including
//! tasks adding or removing tasks through their [`Context`], happens in the
//! foreground.

use super::clock::{ticks_since, Clock, Tick, TickPeriod, Uptime};
use super::task::{Action, Iter, Task, TaskFn, TaskId, TaskStatus, TaskTable, FOREVER};
use crate::error::Result;

/// Hardware timer that produces the runloop tick
pub trait TickSource {
    /// Arrange for one interrupt every `period`
    fn configure(&mut self, period: TickPeriod) -> Result<()>;

    /// Function invoked from interrupt context on every tick. It must do no
    /// more than advance the clock.
    fn set_tick_callback(&mut self, callback: fn());
}

/// Called after a task returns [`TaskStatus::Error`], before it is removed
pub type TaskErrorHandler = for<'r, 'a> fn(&mut Context<'r, 'a>, TaskId, u8);

/// Called when a periodic task missed one or more of its slots, before the
/// delayed execution. The count is never zero.
pub type SyncErrorHandler = for<'r, 'a> fn(&mut Context<'r, 'a>, TaskId, u32);

fn ignore_task_error(_: &mut Context<'_, '_>, _: TaskId, _: u8) {}

fn ignore_sync_error(_: &mut Context<'_, '_>, _: TaskId, _: u32) {}

/// Runs after a pass that executed nothing, with the tick that pass was
/// scheduled against. A hook that sleeps must not do so once the clock has
/// moved past that tick, see [`Clock::sleep_unless_ticked`].
pub type IdleHook = fn(&Clock, Tick);

/// Settings fixed at [`Runloop::init`]
#[derive(Clone, Copy)]
pub struct RunloopConfig {
    pub period: TickPeriod,
    pub on_task_error: TaskErrorHandler,
    pub on_sync_error: SyncErrorHandler,
    /// e.g. to sleep until the next interrupt
    pub idle: Option<IdleHook>,
}

impl Default for RunloopConfig {
    fn default() -> Self {
        Self {
            period: TickPeriod::default(),
            on_task_error: ignore_task_error,
            on_sync_error: ignore_sync_error,
            idle: None,
        }
    }
}

/// Anything tasks can be scheduled on: the runloop itself, or the
/// [`Context`] handed to a running task.
pub trait Spawn<'a> {
    fn add_task(
        &mut self,
        action: Action<'a>,
        executions: u16,
        period_ms: u32,
        delay_ms: u32,
    ) -> Result<TaskId>;

    fn remove_task(&mut self, id: TaskId);
}

fn schedule<'a>(
    tasks: &mut TaskTable<'a>,
    clock: &Clock,
    period: TickPeriod,
    action: Action<'a>,
    executions: u16,
    period_ms: u32,
    delay_ms: u32,
) -> Result<TaskId> {
    let period_ticks = period.ms_to_ticks(period_ms)?;
    let delay_ticks = period.ms_to_ticks(delay_ms)?;
    tasks.insert(action, executions, period_ticks, delay_ticks, clock.now())
}

/// Handle given to running tasks and to the error handlers
pub struct Context<'r, 'a> {
    clock: &'a Clock,
    period: TickPeriod,
    tasks: &'r mut TaskTable<'a>,
    current: TaskId,
    stop: &'r mut bool,
}

impl<'r, 'a> Context<'r, 'a> {
    /// Task being executed, or the task an error report is about
    pub fn task_id(&self) -> TaskId {
        self.current
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn uptime(&self) -> Uptime {
        self.clock.uptime(self.period)
    }

    pub fn tick_period(&self) -> TickPeriod {
        self.period
    }

    pub fn add_task(
        &mut self,
        action: Action<'a>,
        executions: u16,
        period_ms: u32,
        delay_ms: u32,
    ) -> Result<TaskId> {
        schedule(
            self.tasks,
            self.clock,
            self.period,
            action,
            executions,
            period_ms,
            delay_ms,
        )
    }

    pub fn remove_task(&mut self, id: TaskId) {
        self.tasks.remove(id);
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains(id)
    }

    pub fn tasks(&self) -> Iter<'_, 'a> {
        self.tasks.iter()
    }

    /// Ask [`Runloop::run_until_stopped`] to return once the current pass
    /// completes
    pub fn request_stop(&mut self) {
        *self.stop = true;
    }
}

impl<'r, 'a> Spawn<'a> for Context<'r, 'a> {
    fn add_task(
        &mut self,
        action: Action<'a>,
        executions: u16,
        period_ms: u32,
        delay_ms: u32,
    ) -> Result<TaskId> {
        Context::add_task(self, action, executions, period_ms, delay_ms)
    }

    fn remove_task(&mut self, id: TaskId) {
        Context::remove_task(self, id)
    }
}

/// The cooperative executive
pub struct Runloop<'a> {
    clock: &'a Clock,
    config: RunloopConfig,
    tasks: TaskTable<'a>,
    stop_requested: bool,
}

impl<'a> Runloop<'a> {
    /// Configure the tick source and start from a zeroed clock and an empty
    /// task table.
    ///
    /// `on_tick` is what the tick interrupt calls; it is expected to be a
    /// function that calls [`Clock::tick`] on `clock`.
    pub fn init<S: TickSource>(
        clock: &'a Clock,
        tick_source: &mut S,
        on_tick: fn(),
        config: RunloopConfig,
    ) -> Result<Self> {
        tick_source.configure(config.period)?;
        clock.reset();
        tick_source.set_tick_callback(on_tick);

        Ok(Self {
            clock,
            config,
            tasks: TaskTable::new(),
            stop_requested: false,
        })
    }

    /// Schedule `action` to run `executions` times, `period_ms` apart,
    /// starting `delay_ms` from now.
    ///
    /// Times must be whole multiples of the tick period. An execution count
    /// of one is a one-shot; [`FOREVER`] never expires.
    pub fn add_task(
        &mut self,
        action: Action<'a>,
        executions: u16,
        period_ms: u32,
        delay_ms: u32,
    ) -> Result<TaskId> {
        schedule(
            &mut self.tasks,
            self.clock,
            self.config.period,
            action,
            executions,
            period_ms,
            delay_ms,
        )
    }

    pub fn remove_task(&mut self, id: TaskId) {
        self.tasks.remove(id);
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains(id)
    }

    pub fn tasks(&self) -> Iter<'_, 'a> {
        self.tasks.iter()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn uptime(&self) -> Uptime {
        self.clock.uptime(self.config.period)
    }

    pub fn tick_period(&self) -> TickPeriod {
        self.config.period
    }

    /// Scan the task table once and run everything that is due. Returns the
    /// number of task invocations.
    pub fn run_pass(&mut self) -> usize {
        let tick = self.clock.now();
        let clock = self.clock;
        let config = self.config;
        let stop = &mut self.stop_requested;
        let mut executed = 0;

        self.tasks.for_each_due(tick, |tasks, id| {
            if dispatch(tasks, clock, &config, stop, id, tick) {
                executed += 1;
            }
        });

        if executed == 0 {
            if let Some(idle) = self.config.idle {
                idle(self.clock, tick);
            }
        }
        executed
    }

    /// Run passes forever
    pub fn run(&mut self) -> ! {
        loop {
            self.run_pass();
        }
    }

    /// Run passes until a task or handler calls [`Context::request_stop`].
    /// Tasks stay scheduled; calling this again resumes them.
    pub fn run_until_stopped(&mut self) {
        self.stop_requested = false;
        while !self.stop_requested {
            self.run_pass();
        }
        self.stop_requested = false;
    }
}

impl<'a> Spawn<'a> for Runloop<'a> {
    fn add_task(
        &mut self,
        action: Action<'a>,
        executions: u16,
        period_ms: u32,
        delay_ms: u32,
    ) -> Result<TaskId> {
        Runloop::add_task(self, action, executions, period_ms, delay_ms)
    }

    fn remove_task(&mut self, id: TaskId) {
        Runloop::remove_task(self, id)
    }
}

/// Fluent alternative to [`Spawn::add_task`]. Defaults to a one-shot task
/// due immediately.
pub struct TaskBuilder<'a> {
    action: Action<'a>,
    executions: u16,
    period_ms: u32,
    delay_ms: u32,
}

impl<'a> TaskBuilder<'a> {
    pub fn function(f: TaskFn) -> Self {
        Self::new(Action::Fn(f))
    }

    pub fn task(task: &'a mut dyn Task) -> Self {
        Self::new(Action::Task(task))
    }

    fn new(action: Action<'a>) -> Self {
        Self {
            action,
            executions: 1,
            period_ms: 0,
            delay_ms: 0,
        }
    }

    pub fn executions(mut self, executions: u16) -> Self {
        self.executions = executions;
        self
    }

    pub fn forever(self) -> Self {
        self.executions(FOREVER)
    }

    pub fn period(mut self, period_ms: u32) -> Self {
        self.period_ms = period_ms;
        self
    }

    pub fn delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn spawn<S: Spawn<'a>>(self, scheduler: &mut S) -> Result<TaskId> {
        scheduler.add_task(self.action, self.executions, self.period_ms, self.delay_ms)
    }
}

/// Run one due task and apply drift, status and completion policy.
/// Returns whether the action was invoked.
fn dispatch<'a>(
    tasks: &mut TaskTable<'a>,
    clock: &'a Clock,
    config: &RunloopConfig,
    stop: &mut bool,
    id: TaskId,
    tick: Tick,
) -> bool {
    let (generation, period, missed) = match tasks.slot_mut(id) {
        Some(slot) => {
            let overdue = ticks_since(tick, slot.next_due) as u32;
            let missed = if slot.period > 0 { overdue / slot.period } else { 0 };
            if missed > 0 {
                // Skip to the first slot still in the future
                slot.next_due = slot
                    .next_due
                    .wrapping_add(missed.wrapping_add(1).wrapping_mul(slot.period));
            }
            (slot.generation, slot.period, missed)
        }
        None => return false,
    };

    let mut ctx = Context {
        clock,
        period: config.period,
        tasks,
        current: id,
        stop,
    };

    if missed > 0 {
        (config.on_sync_error)(&mut ctx, id, missed);
    }

    let Some(mut action) = ctx
        .tasks
        .current_mut(id, generation)
        .and_then(|slot| slot.action.take())
    else {
        // Removed by the sync error handler
        return false;
    };

    let status = action.run(&mut ctx);

    if let TaskStatus::Error(code) = status {
        (config.on_task_error)(&mut ctx, id, code);
    }

    let tasks = ctx.tasks;
    let Some(slot) = tasks.current_mut(id, generation) else {
        // The task removed itself; its slot may already belong to a new task
        return true;
    };
    slot.action = Some(action);

    if slot.remaining != FOREVER {
        slot.remaining -= 1;
    }

    match status {
        TaskStatus::Ok if slot.remaining == 0 => tasks.remove(id),
        TaskStatus::Ok => {
            if period > 0 && missed == 0 {
                slot.next_due = slot.next_due.wrapping_add(period);
            }
        }
        TaskStatus::Abort | TaskStatus::Error(_) => tasks.remove(id),
    }
    true
}
