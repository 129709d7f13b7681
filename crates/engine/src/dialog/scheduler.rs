use std::fmt;
use std::time::Duration;

use super::config::StateId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduledTaskId(u64);

impl fmt::Display for ScheduledTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DueNavigation {
    pub id: ScheduledTaskId,
    pub target: StateId,
    pub origin: Option<StateId>,
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    id: ScheduledTaskId,
    remaining: Duration,
    target: StateId,
    origin: Option<StateId>,
}

/// Deferred navigations advanced by the host's tick.
///
/// Tasks with an origin belong to the state that scheduled them and are
/// dropped by [`NavigationScheduler::cancel_foreign`] once that state is no
/// longer current.
#[derive(Debug, Default)]
pub(crate) struct NavigationScheduler {
    next_id: u64,
    tasks: Vec<ScheduledTask>,
}

impl NavigationScheduler {
    pub(crate) fn schedule(
        &mut self,
        delay: Duration,
        target: StateId,
        origin: Option<StateId>,
    ) -> ScheduledTaskId {
        self.next_id += 1;
        let id = ScheduledTaskId(self.next_id);
        self.tasks.push(ScheduledTask {
            id,
            remaining: delay,
            target,
            origin,
        });
        id
    }

    pub(crate) fn cancel(&mut self, id: ScheduledTaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    /// Cancels origin-bound tasks whose origin differs from `current`.
    pub(crate) fn cancel_foreign(&mut self, current: Option<&StateId>) -> usize {
        let before = self.tasks.len();
        self.tasks
            .retain(|task| task.origin.is_none() || task.origin.as_ref() == current);
        before - self.tasks.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Advances every task by `dt` and removes the ones that came due, in schedule order.
    pub(crate) fn advance(&mut self, dt: Duration) -> Vec<DueNavigation> {
        let mut due = Vec::new();
        self.tasks.retain_mut(|task| {
            task.remaining = task.remaining.saturating_sub(dt);
            if task.remaining.is_zero() {
                due.push(DueNavigation {
                    id: task.id,
                    target: task.target.clone(),
                    origin: task.origin.clone(),
                });
                false
            } else {
                true
            }
        });
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_fire_once_their_delay_has_elapsed() {
        let mut scheduler = NavigationScheduler::default();
        scheduler.schedule(
            Duration::from_millis(300),
            StateId::from("main-menu"),
            Some(StateId::from("splash")),
        );
        assert!(scheduler.advance(Duration::from_millis(200)).is_empty());
        let due = scheduler.advance(Duration::from_millis(100));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].target.as_str(), "main-menu");
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn cancel_foreign_keeps_unbound_and_current_tasks() {
        let mut scheduler = NavigationScheduler::default();
        let splash = StateId::from("splash");
        scheduler.schedule(Duration::from_secs(1), StateId::from("a"), Some(splash.clone()));
        scheduler.schedule(Duration::from_secs(1), StateId::from("b"), None);
        scheduler.schedule(
            Duration::from_secs(1),
            StateId::from("c"),
            Some(StateId::from("intro")),
        );
        assert_eq!(scheduler.cancel_foreign(Some(&splash)), 1);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.cancel_foreign(None), 1);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn explicit_cancel_reports_whether_anything_was_removed() {
        let mut scheduler = NavigationScheduler::default();
        let id = scheduler.schedule(Duration::ZERO, StateId::from("a"), None);
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.advance(Duration::from_millis(16)).is_empty());
    }
}
