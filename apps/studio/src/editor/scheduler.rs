//! Debounce bookkeeping for deferred surface work.
//!
//! The surface never sleeps itself. It records a deadline per task kind, and
//! whoever drives it (the session actor, or a test) asks for the next
//! deadline and hands back the current time once it passes.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Sanitize the live fragment and recompute pagination.
    Reflow,
    /// Append the current content to history.
    Snapshot,
    /// Re-measure after an undo/redo replacement and re-enable recording.
    Settle,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<(Task, Instant)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` at `now + delay`, replacing any pending deadline for it.
    pub fn schedule(&mut self, task: Task, now: Instant, delay: Duration) {
        self.cancel(task);
        self.pending.push((task, now + delay));
    }

    pub fn cancel(&mut self, task: Task) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _)| *pending != task);
        self.pending.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_pending(&self, task: Task) -> bool {
        self.pending.iter().any(|(pending, _)| *pending == task)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at)| *at).min()
    }

    /// Removes and returns every task due at `now`, earliest deadline first.
    pub fn take_due(&mut self, now: Instant) -> Vec<Task> {
        let mut due: Vec<(Task, Instant)> = Vec::new();
        self.pending.retain(|&(task, at)| {
            if at <= now {
                due.push((task, at));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(task, _)| task).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Task::Reflow, start, ms(300));
        scheduler.schedule(Task::Reflow, start + ms(200), ms(300));

        assert_eq!(scheduler.next_deadline(), Some(start + ms(500)));
        assert!(scheduler.take_due(start + ms(300)).is_empty());
        assert_eq!(scheduler.take_due(start + ms(500)), vec![Task::Reflow]);
        assert!(!scheduler.is_pending(Task::Reflow));
    }

    #[test]
    fn test_take_due_orders_by_deadline() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Task::Snapshot, start, ms(500));
        scheduler.schedule(Task::Reflow, start, ms(300));
        scheduler.schedule(Task::Settle, start, ms(900));

        assert_eq!(
            scheduler.take_due(start + ms(600)),
            vec![Task::Reflow, Task::Snapshot]
        );
        assert!(scheduler.is_pending(Task::Settle));
    }

    #[test]
    fn test_cancel_all_clears_everything() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Task::Reflow, start, ms(300));
        scheduler.schedule(Task::Snapshot, start, ms(500));
        assert!(scheduler.cancel(Task::Reflow));
        assert!(!scheduler.cancel(Task::Reflow));

        scheduler.cancel_all();
        assert_eq!(scheduler.next_deadline(), None);
        assert!(scheduler.take_due(start + ms(10_000)).is_empty());
    }
}
