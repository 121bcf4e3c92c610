//! End-to-end runloop behaviour with a hand-cranked clock.
//!
//! Each test drives the clock itself: `clock.tick()` stands in for the timer
//! interrupt and `run_pass()` for one turn of the foreground loop.

use std::cell::{Cell, RefCell};

use avr_runloop::config::MAX_TASKS;
use avr_runloop::logger::Throttle;
use avr_runloop::rtos::{
    Action, Clock, Context, Runloop, RunloopConfig, TaskBuilder, TaskId, TaskStatus, Tick,
    TickPeriod, TickSource, Uptime, FOREVER,
};
use avr_runloop::{Error, Result};

struct ManualTimer;

impl TickSource for ManualTimer {
    fn configure(&mut self, _: TickPeriod) -> Result<()> {
        Ok(())
    }

    fn set_tick_callback(&mut self, _: fn()) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Ran(TaskId, Tick),
    Failed(TaskId, u8),
    Late(TaskId, u32),
}

thread_local! {
    static EVENTS: RefCell<Vec<Event>> = RefCell::new(Vec::new());
}

fn record(event: Event) {
    EVENTS.with(|events| events.borrow_mut().push(event));
}

fn events() -> Vec<Event> {
    EVENTS.with(|events| events.borrow().clone())
}

fn on_task_error(_: &mut Context<'_, '_>, id: TaskId, code: u8) {
    record(Event::Failed(id, code));
}

fn on_sync_error(_: &mut Context<'_, '_>, id: TaskId, missed: u32) {
    record(Event::Late(id, missed));
}

fn recording() -> RunloopConfig {
    RunloopConfig {
        on_task_error,
        on_sync_error,
        ..RunloopConfig::default()
    }
}

fn start(clock: &Clock, config: RunloopConfig) -> Runloop<'_> {
    EVENTS.with(|events| events.borrow_mut().clear());
    match Runloop::init(clock, &mut ManualTimer, || {}, config) {
        Ok(runloop) => runloop,
        Err(e) => panic!("init failed: {:?}", e),
    }
}

/// One pass per tick for `ticks` ticks, starting with the current tick
fn run_for(clock: &Clock, runloop: &mut Runloop<'_>, ticks: u32) {
    for _ in 0..ticks {
        runloop.run_pass();
        clock.tick();
    }
}

fn mark(ctx: &mut Context<'_, '_>) -> TaskStatus {
    record(Event::Ran(ctx.task_id(), ctx.now()));
    TaskStatus::Ok
}

#[test]
fn one_shot_runs_once_and_frees_its_slot() {
    let clock = Clock::new();
    let mut runloop = start(&clock, recording());

    let id = runloop.add_task(Action::Fn(mark), 1, 0, 5).unwrap();
    run_for(&clock, &mut runloop, 20);

    assert_eq!(events(), vec![Event::Ran(id, 5)]);
    assert!(!runloop.contains(id));
    assert_eq!(runloop.task_count(), 0);
    assert_eq!(runloop.add_task(Action::Fn(mark), 1, 0, 0), Ok(id));
}

#[test]
fn periodic_task_runs_its_count_one_period_apart() {
    let clock = Clock::new();
    let mut runloop = start(&clock, recording());

    let id = runloop.add_task(Action::Fn(mark), 4, 7, 3).unwrap();
    run_for(&clock, &mut runloop, 60);

    assert_eq!(
        events(),
        vec![
            Event::Ran(id, 3),
            Event::Ran(id, 10),
            Event::Ran(id, 17),
            Event::Ran(id, 24)
        ]
    );
    assert!(!runloop.contains(id));
}

#[test]
fn five_runs_of_ten_milliseconds_within_sixty_ticks() {
    let runs = Cell::new(0u32);
    let mut counter = |_: &mut Context<'_, '_>| {
        runs.set(runs.get() + 1);
        TaskStatus::Ok
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    let id = runloop
        .add_task(Action::Task(&mut counter), 5, 10, 0)
        .unwrap();
    run_for(&clock, &mut runloop, 60);

    assert_eq!(runs.get(), 5);
    assert!(!runloop.contains(id));
    assert!(events().is_empty());
}

#[test]
fn repeated_task_without_period_is_rejected() {
    let clock = Clock::new();
    let mut runloop = start(&clock, recording());

    assert_eq!(
        runloop.add_task(Action::Fn(mark), 3, 0, 0),
        Err(Error::BadSchedule)
    );
    assert_eq!(
        runloop.add_task(Action::Fn(mark), FOREVER, 0, 0),
        Err(Error::BadSchedule)
    );
    assert_eq!(
        runloop.add_task(Action::Fn(mark), 0, 10, 0),
        Err(Error::BadSchedule)
    );
    assert_eq!(runloop.task_count(), 0);
}

#[test]
fn tasks_due_together_run_in_ascending_id_order() {
    let clock = Clock::new();
    let mut runloop = start(&clock, recording());

    let first = runloop.add_task(Action::Fn(mark), 1, 0, 50).unwrap();
    let second = runloop.add_task(Action::Fn(mark), 1, 0, 10).unwrap();
    let third = runloop.add_task(Action::Fn(mark), 1, 0, 10).unwrap();
    runloop.remove_task(first);
    // Reuses the lowest slot, so it is added last but has the lowest id
    let reused = runloop.add_task(Action::Fn(mark), 1, 0, 10).unwrap();
    assert_eq!(reused, first);

    run_for(&clock, &mut runloop, 11);

    assert_eq!(
        events(),
        vec![
            Event::Ran(reused, 10),
            Event::Ran(second, 10),
            Event::Ran(third, 10)
        ]
    );
}

#[test]
fn late_task_reports_drift_once_then_skips_missed_slots() {
    let clock = Clock::new();
    let mut runloop = start(&clock, recording());

    let id = runloop.add_task(Action::Fn(mark), FOREVER, 10, 0).unwrap();
    runloop.run_pass();

    // The foreground was busy elsewhere for 35 ticks
    for _ in 0..35 {
        clock.tick();
    }
    runloop.run_pass();
    runloop.run_pass();
    run_for(&clock, &mut runloop, 6);

    assert_eq!(
        events(),
        vec![
            Event::Ran(id, 0),
            Event::Late(id, 2),
            Event::Ran(id, 35),
            Event::Ran(id, 40)
        ]
    );
}

#[test]
fn abort_removes_quietly() {
    let runs = Cell::new(0u32);
    let mut quitter = |_: &mut Context<'_, '_>| {
        runs.set(runs.get() + 1);
        if runs.get() == 2 {
            TaskStatus::Abort
        } else {
            TaskStatus::Ok
        }
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    let id = runloop
        .add_task(Action::Task(&mut quitter), 10, 5, 0)
        .unwrap();
    run_for(&clock, &mut runloop, 100);

    assert_eq!(runs.get(), 2);
    assert!(!runloop.contains(id));
    assert!(events().is_empty());
}

#[test]
fn failing_task_is_reported_and_removed_while_others_go_on() {
    let failing_runs = Cell::new(0u32);
    let mut failing = |_: &mut Context<'_, '_>| {
        failing_runs.set(failing_runs.get() + 1);
        if failing_runs.get() == 3 {
            TaskStatus::Error(7)
        } else {
            TaskStatus::Ok
        }
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    let bad = runloop
        .add_task(Action::Task(&mut failing), FOREVER, 1, 0)
        .unwrap();
    let good = runloop.add_task(Action::Fn(mark), 3, 4, 4).unwrap();
    run_for(&clock, &mut runloop, 20);

    assert_eq!(failing_runs.get(), 3);
    assert!(!runloop.contains(bad));
    assert_eq!(
        events(),
        vec![
            Event::Failed(bad, 7),
            Event::Ran(good, 4),
            Event::Ran(good, 8),
            Event::Ran(good, 12)
        ]
    );
}

#[test]
fn tasks_can_schedule_tasks() {
    let mut spawner = |ctx: &mut Context<'_, '_>| match ctx.add_task(Action::Fn(mark), 1, 0, 2) {
        Ok(_) => TaskStatus::Ok,
        Err(_) => TaskStatus::Error(1),
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    let parent = runloop
        .add_task(Action::Task(&mut spawner), 1, 0, 3)
        .unwrap();
    run_for(&clock, &mut runloop, 10);

    // The parent held slot 0 while running, so the child got the next one
    let child = TaskId::from_index(1).unwrap();
    assert_eq!(parent, TaskId::from_index(0).unwrap());
    assert_eq!(events(), vec![Event::Ran(child, 5)]);
    assert_eq!(runloop.task_count(), 0);
}

#[test]
fn error_handler_can_schedule_a_replacement() {
    fn fail(_: &mut Context<'_, '_>) -> TaskStatus {
        TaskStatus::Error(9)
    }

    fn restart(ctx: &mut Context<'_, '_>, id: TaskId, code: u8) {
        record(Event::Failed(id, code));
        // The failed task still occupies its slot here
        let replacement = ctx.add_task(Action::Fn(mark), 1, 0, 1);
        assert_eq!(replacement.ok(), TaskId::from_index(1));
    }

    let clock = Clock::new();
    let config = RunloopConfig {
        on_task_error: restart,
        ..recording()
    };
    let mut runloop = start(&clock, config);
    let failed = runloop.add_task(Action::Fn(fail), 1, 0, 0).unwrap();
    run_for(&clock, &mut runloop, 5);

    let replacement = TaskId::from_index(1).unwrap();
    assert_eq!(
        events(),
        vec![Event::Failed(failed, 9), Event::Ran(replacement, 1)]
    );
}

#[test]
fn self_removal_leaves_the_reused_slot_alone() {
    let mut phoenix = |ctx: &mut Context<'_, '_>| {
        let me = ctx.task_id();
        ctx.remove_task(me);
        match ctx.add_task(Action::Fn(mark), 1, 0, 0) {
            Ok(successor) if successor == me => TaskStatus::Error(2),
            Ok(_) => TaskStatus::Error(3),
            Err(_) => TaskStatus::Error(4),
        }
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    let id = runloop
        .add_task(Action::Task(&mut phoenix), FOREVER, 1, 0)
        .unwrap();

    runloop.run_pass();
    // Reported against the id, but the successor in that slot survives
    assert_eq!(events(), vec![Event::Failed(id, 2)]);
    assert!(runloop.contains(id));

    runloop.run_pass();
    run_for(&clock, &mut runloop, 3);
    assert_eq!(events(), vec![Event::Failed(id, 2), Event::Ran(id, 0)]);
    assert!(!runloop.contains(id));
}

#[test]
fn task_removed_earlier_in_the_pass_does_not_run() {
    let victim = TaskId::from_index(1).unwrap();
    let mut killer = |ctx: &mut Context<'_, '_>| {
        ctx.remove_task(victim);
        TaskStatus::Ok
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    runloop
        .add_task(Action::Task(&mut killer), 1, 0, 0)
        .unwrap();
    assert_eq!(runloop.add_task(Action::Fn(mark), 1, 0, 0), Ok(victim));

    assert_eq!(runloop.run_pass(), 1);
    assert!(events().is_empty());
    assert_eq!(runloop.task_count(), 0);
}

#[test]
fn table_full_and_ids_unique_while_live() {
    let clock = Clock::new();
    let mut runloop = start(&clock, recording());

    let mut ids = Vec::new();
    for _ in 0..MAX_TASKS {
        ids.push(runloop.add_task(Action::Fn(mark), 1, 0, 100).unwrap());
    }
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), MAX_TASKS);

    assert_eq!(
        runloop.add_task(Action::Fn(mark), 1, 0, 0),
        Err(Error::TableFull)
    );

    runloop.remove_task(ids[3]);
    runloop.remove_task(ids[3]);
    assert_eq!(runloop.add_task(Action::Fn(mark), 1, 0, 0), Ok(ids[3]));
}

#[test]
fn forever_tasks_never_expire() {
    let runs = Cell::new(0u32);
    let mut heartbeat = |_: &mut Context<'_, '_>| {
        runs.set(runs.get() + 1);
        TaskStatus::Ok
    };

    let clock = Clock::new();
    let mut runloop = start(&clock, recording());
    let id = TaskBuilder::task(&mut heartbeat)
        .forever()
        .period(10)
        .spawn(&mut runloop)
        .unwrap();
    run_for(&clock, &mut runloop, 1000);

    assert_eq!(runs.get(), 100);
    assert!(runloop.contains(id));
    let info = runloop.tasks().next().unwrap();
    assert_eq!(info.remaining, FOREVER);
}

#[test]
fn stop_request_returns_control_with_tasks_intact() {
    // Stands in for the timer interrupt waking the idle CPU
    fn tick_while_idle(clock: &Clock, _: Tick) {
        clock.tick();
    }

    let runs = Cell::new(0u32);
    let mut stopper = |ctx: &mut Context<'_, '_>| {
        runs.set(runs.get() + 1);
        if runs.get() % 3 == 0 {
            ctx.request_stop();
        }
        TaskStatus::Ok
    };

    let config = RunloopConfig {
        idle: Some(tick_while_idle),
        ..recording()
    };
    let clock = Clock::new();
    let mut runloop = start(&clock, config);
    let id = runloop
        .add_task(Action::Task(&mut stopper), FOREVER, 2, 0)
        .unwrap();

    runloop.run_until_stopped();
    assert_eq!(runs.get(), 3);
    assert_eq!(runloop.now(), 4);
    assert!(runloop.contains(id));

    runloop.run_until_stopped();
    assert_eq!(runs.get(), 6);
    assert!(events().is_empty());
}

#[test]
fn tick_landing_before_idle_sleep_is_not_slept_through() {
    // The tick arrives after the pass read the clock but before the CPU
    // halts; a halted CPU would only wake on the tick after it
    fn idle_racing_the_tick(clock: &Clock, seen: Tick) {
        clock.tick();
        clock.sleep_unless_ticked(seen, || clock.tick());
    }

    let clock = Clock::new();
    let config = RunloopConfig {
        idle: Some(idle_racing_the_tick),
        ..recording()
    };
    let mut runloop = start(&clock, config);
    let id = runloop.add_task(Action::Fn(mark), FOREVER, 1, 0).unwrap();

    for _ in 0..100 {
        runloop.run_pass();
    }

    let expected: Vec<Event> = (0..50).map(|tick| Event::Ran(id, tick)).collect();
    assert_eq!(events(), expected);
}

#[test]
fn throttled_drift_reports_die_out_after_one_stall() {
    static CLOCK: Clock = Clock::new();
    thread_local! {
        static REPORTS: Cell<Throttle> = Cell::new(Throttle::new(100));
    }

    // Logging a report blocks on the console for 16 ticks
    fn report_on_slow_console(ctx: &mut Context<'_, '_>, id: TaskId, missed: u32) {
        record(Event::Late(id, missed));
        let admitted = REPORTS.with(|reports| {
            let mut throttle = reports.get();
            let admitted = throttle.admit(ctx.now());
            reports.set(throttle);
            admitted
        });
        if admitted.is_some() {
            for _ in 0..16 {
                CLOCK.tick();
            }
        }
    }

    let config = RunloopConfig {
        on_sync_error: report_on_slow_console,
        ..recording()
    };
    let mut runloop = start(&CLOCK, config);
    let id = runloop.add_task(Action::Fn(mark), FOREVER, 1, 0).unwrap();

    for pass in 0..1000 {
        if pass == 10 {
            for _ in 0..20 {
                CLOCK.tick();
            }
        }
        runloop.run_pass();
        CLOCK.tick();
    }

    let late: Vec<Event> = events()
        .into_iter()
        .filter(|event| matches!(event, Event::Late(..)))
        .collect();
    // The stall itself, then the pass delayed by writing its report
    assert_eq!(late, vec![Event::Late(id, 20), Event::Late(id, 16)]);
    let last_run = events().into_iter().rev().find(|event| matches!(event, Event::Ran(..)));
    assert_eq!(last_run, Some(Event::Ran(id, 1035)));
}

#[test]
fn uptime_tracks_ticks_at_the_configured_period() {
    let clock = Clock::new();
    let config = RunloopConfig {
        period: TickPeriod::from_ms(5).unwrap(),
        ..recording()
    };
    let runloop = start(&clock, config);

    for _ in 0..300 {
        clock.tick();
    }
    assert_eq!(runloop.uptime(), Uptime::from_millis(1500));
    assert_eq!(runloop.uptime().to_ticks(runloop.tick_period()), 300);

    let period = TickPeriod::from_ms(7).unwrap();
    for ticks in [0, 1, 123_456_789, u32::MAX] {
        assert_eq!(period.uptime(ticks).to_ticks(period), ticks);
    }
}

#[test]
fn init_failure_is_propagated() {
    struct BrokenTimer;

    impl TickSource for BrokenTimer {
        fn configure(&mut self, _: TickPeriod) -> Result<()> {
            Err(Error::TickRate)
        }

        fn set_tick_callback(&mut self, _: fn()) {}
    }

    let clock = Clock::new();
    let result = Runloop::init(&clock, &mut BrokenTimer, || {}, recording());
    assert!(matches!(result, Err(Error::TickRate)));
}
