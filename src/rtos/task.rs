//! Task descriptors and the fixed-capacity task table

use core::fmt;
use ufmt::{uDisplay, uWrite, uwrite, Formatter};

use super::clock::{ticks_since, Tick, MAX_SPAN};
use super::scheduler::Context;
use crate::config::MAX_TASKS;
use crate::error::{Error, Result};

/// Execution count for a periodic task that never completes on its own
pub const FOREVER: u16 = u16::MAX;

/// Plain function task without state of its own
pub type TaskFn = for<'r, 'a> fn(&mut Context<'r, 'a>) -> TaskStatus;

/// Outcome of one task invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Invocation finished normally
    Ok,
    /// Remove the task now, whatever its remaining count
    Abort,
    /// Invocation failed; reported to the task error handler, task removed
    Error(u8),
}

/// Stateful unit of work.
///
/// Implemented for every `FnMut(&mut Context) -> TaskStatus`, so closures
/// capturing their state by reference work directly.
pub trait Task {
    fn run(&mut self, ctx: &mut Context<'_, '_>) -> TaskStatus;
}

impl<F> Task for F
where
    F: FnMut(&mut Context<'_, '_>) -> TaskStatus,
{
    fn run(&mut self, ctx: &mut Context<'_, '_>) -> TaskStatus {
        self(ctx)
    }
}

/// What a scheduled task executes
pub enum Action<'a> {
    Fn(TaskFn),
    Task(&'a mut dyn Task),
}

impl<'a> Action<'a> {
    pub(crate) fn run(&mut self, ctx: &mut Context<'_, '_>) -> TaskStatus {
        match self {
            Self::Fn(f) => f(ctx),
            Self::Task(task) => task.run(ctx),
        }
    }
}

impl From<TaskFn> for Action<'_> {
    fn from(f: TaskFn) -> Self {
        Self::Fn(f)
    }
}

impl<'a> From<&'a mut dyn Task> for Action<'a> {
    fn from(task: &'a mut dyn Task) -> Self {
        Self::Task(task)
    }
}

/// Identifier of a live task: its slot in the task table.
///
/// Unique among live tasks; may be handed out again once the task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u8);

impl TaskId {
    pub fn from_index(index: u8) -> Option<Self> {
        if usize::from(index) < MAX_TASKS {
            Some(Self(index))
        } else {
            None
        }
    }

    pub const fn index(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl uDisplay for TaskId {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        uwrite!(f, "{}", self.0)
    }
}

/// Snapshot of one live task, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub remaining: u16,
    pub period: Tick,
    pub next_due: Tick,
}

pub(crate) struct Slot<'a> {
    scheduled: bool,
    pub(crate) generation: u8,
    /// Taken out while the task is executing
    pub(crate) action: Option<Action<'a>>,
    pub(crate) remaining: u16,
    pub(crate) period: Tick,
    pub(crate) next_due: Tick,
}

impl Slot<'_> {
    fn empty() -> Self {
        Self {
            scheduled: false,
            generation: 0,
            action: None,
            remaining: 0,
            period: 0,
            next_due: 0,
        }
    }

    fn release(&mut self) {
        self.scheduled = false;
        self.action = None;
    }
}

/// Bounded storage for task descriptors
pub struct TaskTable<'a> {
    slots: [Slot<'a>; MAX_TASKS],
    live: usize,
}

impl<'a> TaskTable<'a> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::empty()),
            live: 0,
        }
    }

    /// Store a new task due `delay` ticks after `now`.
    ///
    /// `executions == 1` is a one-shot; anything above needs a non-zero
    /// period. The lowest free slot is used.
    pub fn insert(
        &mut self,
        action: Action<'a>,
        executions: u16,
        period: Tick,
        delay: Tick,
        now: Tick,
    ) -> Result<TaskId> {
        if executions == 0 || (executions > 1 && period == 0) {
            return Err(Error::BadSchedule);
        }
        if period > MAX_SPAN || delay > MAX_SPAN {
            return Err(Error::BadSchedule);
        }

        let index = self
            .slots
            .iter()
            .position(|slot| !slot.scheduled)
            .ok_or(Error::TableFull)?;

        let slot = &mut self.slots[index];
        slot.scheduled = true;
        slot.generation = slot.generation.wrapping_add(1);
        slot.action = Some(action);
        slot.remaining = executions;
        slot.period = period;
        slot.next_due = now.wrapping_add(delay);
        self.live += 1;

        Ok(TaskId(index as u8))
    }

    /// Free the task's slot. Removing a task that is already gone is a no-op.
    pub fn remove(&mut self, id: TaskId) {
        if let Some(slot) = self.slots.get_mut(usize::from(id.0)) {
            if slot.scheduled {
                slot.release();
                self.live -= 1;
            }
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.slots
            .get(usize::from(id.0))
            .map_or(false, |slot| slot.scheduled)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        MAX_TASKS
    }

    pub fn info(&self, id: TaskId) -> Option<TaskInfo> {
        let slot = self.slots.get(usize::from(id.0))?;
        if !slot.scheduled {
            return None;
        }
        Some(TaskInfo {
            id,
            remaining: slot.remaining,
            period: slot.period,
            next_due: slot.next_due,
        })
    }

    /// Live tasks in ascending id order
    pub fn iter(&self) -> Iter<'_, 'a> {
        Iter {
            table: self,
            next: 0,
        }
    }

    /// Visit every task due at `tick`, in ascending id order.
    ///
    /// Due-ness is tested when a slot is reached, so `f` may insert and
    /// remove tasks. Tasks whose action is currently executing are skipped.
    pub fn for_each_due<F>(&mut self, tick: Tick, mut f: F)
    where
        F: FnMut(&mut Self, TaskId),
    {
        for index in 0..MAX_TASKS {
            let slot = &self.slots[index];
            if slot.scheduled && slot.action.is_some() && ticks_since(tick, slot.next_due) >= 0 {
                f(self, TaskId(index as u8));
            }
        }
    }

    pub(crate) fn slot_mut(&mut self, id: TaskId) -> Option<&mut Slot<'a>> {
        self.slots
            .get_mut(usize::from(id.0))
            .filter(|slot| slot.scheduled)
    }

    pub(crate) fn current_mut(&mut self, id: TaskId, generation: u8) -> Option<&mut Slot<'a>> {
        self.slot_mut(id).filter(|slot| slot.generation == generation)
    }
}

/// Iterator over the live tasks of a [`TaskTable`]
pub struct Iter<'t, 'a> {
    table: &'t TaskTable<'a>,
    next: u8,
}

impl Iterator for Iter<'_, '_> {
    type Item = TaskInfo;

    fn next(&mut self) -> Option<TaskInfo> {
        while usize::from(self.next) < MAX_TASKS {
            let id = TaskId(self.next);
            self.next += 1;
            if let Some(info) = self.table.info(id) {
                return Some(info);
            }
        }
        None
    }
}

impl Default for TaskTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Context<'_, '_>) -> TaskStatus {
        TaskStatus::Ok
    }

    fn action() -> Action<'static> {
        Action::Fn(noop)
    }

    #[test]
    fn insert_assigns_lowest_free_slot() {
        let mut table = TaskTable::new();
        let a = table.insert(action(), 1, 0, 0, 0).unwrap();
        let b = table.insert(action(), 1, 0, 0, 0).unwrap();
        let c = table.insert(action(), 1, 0, 0, 0).unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));

        table.remove(b);
        let d = table.insert(action(), 1, 0, 0, 0).unwrap();
        assert_eq!(d, b);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn live_ids_are_never_aliased() {
        let mut table = TaskTable::new();
        let mut ids = heapless::Vec::<TaskId, MAX_TASKS>::new();
        for _ in 0..MAX_TASKS {
            let id = table.insert(action(), 1, 0, 0, 0).unwrap();
            assert!(!ids.contains(&id));
            ids.push(id).unwrap();
        }
    }

    #[test]
    fn rejects_malformed_schedules() {
        let mut table = TaskTable::new();
        assert_eq!(table.insert(action(), 0, 5, 0, 0), Err(Error::BadSchedule));
        assert_eq!(table.insert(action(), 3, 0, 0, 0), Err(Error::BadSchedule));
        assert_eq!(table.insert(action(), FOREVER, 0, 0, 0), Err(Error::BadSchedule));
        assert_eq!(
            table.insert(action(), 2, MAX_SPAN + 1, 0, 0),
            Err(Error::BadSchedule)
        );
        assert!(table.is_empty());
    }

    #[test]
    fn full_table_is_reported() {
        let mut table = TaskTable::new();
        for _ in 0..MAX_TASKS {
            table.insert(action(), 1, 0, 0, 0).unwrap();
        }
        assert_eq!(table.insert(action(), 1, 0, 0, 0), Err(Error::TableFull));
        assert_eq!(table.len(), table.capacity());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut table = TaskTable::new();
        let id = table.insert(action(), 1, 0, 0, 0).unwrap();
        table.remove(id);
        table.remove(id);
        assert!(!table.contains(id));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn stale_generation_does_not_match_new_occupant() {
        let mut table = TaskTable::new();
        let id = table.insert(action(), 1, 0, 0, 0).unwrap();
        let generation = table.slot_mut(id).unwrap().generation;
        assert!(table.current_mut(id, generation).is_some());

        table.remove(id);
        let reused = table.insert(action(), 1, 0, 0, 0).unwrap();
        assert_eq!(reused, id);
        assert!(table.current_mut(id, generation).is_none());
        assert!(table.contains(id));
    }

    #[test]
    fn for_each_due_visits_in_id_order_and_respects_wrap() {
        let mut table = TaskTable::new();
        let now = u32::MAX - 1;
        let late = table.insert(action(), 1, 0, 5, now).unwrap();
        let early = table.insert(action(), 1, 0, 0, now).unwrap();
        let later = table.insert(action(), 1, 0, 2, now).unwrap();

        let mut seen = heapless::Vec::<TaskId, MAX_TASKS>::new();
        // `now + 2` has wrapped past zero
        table.for_each_due(now.wrapping_add(2), |_, id| seen.push(id).unwrap());
        assert_eq!(seen.as_slice(), &[early, later]);
        assert!(table.contains(late));
    }

    #[test]
    fn iter_reports_live_tasks() {
        let mut table = TaskTable::new();
        let a = table.insert(action(), 4, 10, 3, 100).unwrap();
        let b = table.insert(action(), 1, 0, 0, 100).unwrap();
        table.remove(b);

        let infos: heapless::Vec<TaskInfo, MAX_TASKS> = table.iter().collect();
        assert_eq!(
            infos.as_slice(),
            &[TaskInfo {
                id: a,
                remaining: 4,
                period: 10,
                next_due: 103
            }]
        );
    }

    #[test]
    fn task_id_bounds() {
        assert!(TaskId::from_index(0).is_some());
        assert!(TaskId::from_index(MAX_TASKS as u8).is_none());
    }
}
