//! Tick-driven cooperative runloop

pub mod clock;
pub mod scheduler;
pub mod task;

pub use clock::{ticks_since, Clock, Tick, TickPeriod, Uptime};
pub use scheduler::{
    Context, IdleHook, Runloop, RunloopConfig, Spawn, SyncErrorHandler, TaskBuilder,
    TaskErrorHandler, TickSource,
};
pub use task::{Action, Iter, Task, TaskFn, TaskId, TaskInfo, TaskStatus, TaskTable, FOREVER};
