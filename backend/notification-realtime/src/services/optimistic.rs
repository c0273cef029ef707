/// Notification list state and optimistic command objects
///
/// Every user mutation is applied locally first and yields an
/// [`OptimisticCommand`] holding the compensating action. If the remote call
/// fails, the command is handed back to [`NotificationState::compensate`].
///
/// Two epochs guard against stale compensation:
/// - `epoch` moves whenever the list is replaced wholesale (fetch, logout)
/// - `count_epoch` additionally moves when the server pushes an unread count
///
/// A compensation recorded under an older epoch is discarded because
/// authoritative data has already overwritten the optimistic value.
use crate::models::{Notification, NotificationPage};
use std::collections::HashSet;

/// Mutation requested by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMutation {
    MarkRead { id: String },
    MarkAllRead,
    Remove { id: String },
    ClearAll,
}

impl StoreMutation {
    pub fn operation(&self) -> &'static str {
        match self {
            StoreMutation::MarkRead { .. } => "mark_read",
            StoreMutation::MarkAllRead => "mark_all_read",
            StoreMutation::Remove { .. } => "delete",
            StoreMutation::ClearAll => "clear_all",
        }
    }
}

/// How to undo a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Nothing changed locally
    Noop,
    /// Flip `read` back to false and give back what was taken from the counter
    RestoreRead { id: String, decremented: u64 },
    /// Blast radius too wide to patch; refetch from the server
    Resync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticCommand {
    pub mutation: StoreMutation,
    pub compensation: Compensation,
    epoch: u64,
    count_epoch: u64,
}

/// What happened when a compensation was handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationOutcome {
    Reverted,
    ResyncRequired,
    /// State was superseded since the mutation; nothing to undo
    Stale,
    Noop,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    /// Newest first, unique ids
    items: Vec<Notification>,
    unread_count: u64,
    epoch: u64,
    count_epoch: u64,
    /// Bumped only by `reset`; a fetch started under an older value is discarded
    generation: u64,
}

impl NotificationState {
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace everything with a fetched page. The server's unread count wins.
    pub fn replace(&mut self, page: NotificationPage) {
        let mut seen = HashSet::new();
        let mut items: Vec<Notification> = page
            .items
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        self.items = items;
        self.unread_count = page.unread_count;
        self.bump_epochs();
    }

    /// Insert at the head unless the id is already present
    pub fn insert_if_absent(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        if !notification.read {
            self.unread_count += 1;
        }
        self.items.insert(0, notification);
        true
    }

    /// Overwrite the counter with a server-reported value
    pub fn set_unread_count(&mut self, count: u64) {
        self.unread_count = count;
        self.count_epoch += 1;
    }

    /// Drop everything; pending compensations become stale
    pub fn reset(&mut self) {
        self.items.clear();
        self.unread_count = 0;
        self.generation += 1;
        self.bump_epochs();
    }

    fn bump_epochs(&mut self) {
        self.epoch += 1;
        self.count_epoch += 1;
    }

    fn decrement_unread(&mut self) -> u64 {
        if self.unread_count > 0 {
            self.unread_count -= 1;
            1
        } else {
            0
        }
    }

    /// Apply a mutation locally and return the command needed to undo it
    pub fn apply(&mut self, mutation: StoreMutation) -> OptimisticCommand {
        let compensation = match &mutation {
            StoreMutation::MarkRead { id } => {
                match self.items.iter_mut().find(|n| &n.id == id) {
                    Some(n) if !n.read => {
                        n.read = true;
                        let decremented = self.decrement_unread();
                        Compensation::RestoreRead {
                            id: id.clone(),
                            decremented,
                        }
                    }
                    _ => Compensation::Noop,
                }
            }
            StoreMutation::MarkAllRead => {
                for n in self.items.iter_mut() {
                    n.read = true;
                }
                self.unread_count = 0;
                Compensation::Resync
            }
            StoreMutation::Remove { id } => {
                if let Some(pos) = self.items.iter().position(|n| &n.id == id) {
                    let removed = self.items.remove(pos);
                    if !removed.read {
                        self.decrement_unread();
                    }
                }
                Compensation::Resync
            }
            StoreMutation::ClearAll => {
                self.items.clear();
                self.unread_count = 0;
                Compensation::Resync
            }
        };

        OptimisticCommand {
            mutation,
            compensation,
            epoch: self.epoch,
            count_epoch: self.count_epoch,
        }
    }

    /// Undo a command whose remote call failed
    pub fn compensate(&mut self, command: &OptimisticCommand) -> CompensationOutcome {
        if command.epoch != self.epoch {
            return CompensationOutcome::Stale;
        }

        match &command.compensation {
            Compensation::Noop => CompensationOutcome::Noop,
            Compensation::Resync => CompensationOutcome::ResyncRequired,
            Compensation::RestoreRead { id, decremented } => {
                // Removed since the mutation; its unread slot went with it
                let Some(n) = self.items.iter_mut().find(|n| &n.id == id) else {
                    return CompensationOutcome::Noop;
                };
                n.read = false;
                if command.count_epoch == self.count_epoch {
                    self.unread_count += decremented;
                }
                CompensationOutcome::Reverted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn notification(id: &str, read: bool, age_minutes: i64) -> Notification {
        Notification {
            id: id.to_string(),
            notification_type: NotificationType::SystemMessage,
            title: format!("title {id}"),
            content: String::new(),
            read,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            metadata: HashMap::new(),
        }
    }

    fn loaded(items: Vec<Notification>, unread_count: u64) -> NotificationState {
        let mut state = NotificationState::default();
        state.replace(NotificationPage { items, unread_count });
        state
    }

    #[test]
    fn test_replace_orders_newest_first_and_dedupes() {
        let state = loaded(
            vec![
                notification("old", false, 30),
                notification("new", false, 1),
                notification("old", false, 30),
            ],
            2,
        );
        let ids: Vec<_> = state.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let mut state = loaded(vec![notification("a", false, 5)], 1);

        assert!(!state.insert_if_absent(notification("a", false, 0)));
        assert_eq!(state.len(), 1);
        assert_eq!(state.unread_count(), 1);

        assert!(state.insert_if_absent(notification("b", false, 0)));
        assert_eq!(state.items()[0].id, "b");
        assert_eq!(state.unread_count(), 2);

        assert!(state.insert_if_absent(notification("c", true, 0)));
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn test_mark_read_then_revert_restores_exact_state() {
        let mut state = loaded(
            vec![notification("a", false, 1), notification("b", false, 2)],
            2,
        );

        let command = state.apply(StoreMutation::MarkRead { id: "a".into() });
        assert!(state.get("a").unwrap().read);
        assert_eq!(state.unread_count(), 1);

        assert_eq!(state.compensate(&command), CompensationOutcome::Reverted);
        assert!(!state.get("a").unwrap().read);
        assert_eq!(state.unread_count(), 2);
    }

    #[test]
    fn test_mark_read_on_read_item_is_noop() {
        let mut state = loaded(vec![notification("a", true, 1)], 0);
        let command = state.apply(StoreMutation::MarkRead { id: "a".into() });
        assert_eq!(command.compensation, Compensation::Noop);
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.compensate(&command), CompensationOutcome::Noop);
    }

    #[test]
    fn test_counter_never_underflows() {
        // Server says zero unread even though the list holds unread items
        let mut state = loaded(
            vec![notification("a", false, 1), notification("b", false, 2)],
            0,
        );

        let first = state.apply(StoreMutation::MarkRead { id: "a".into() });
        state.apply(StoreMutation::Remove { id: "b".into() });
        assert_eq!(state.unread_count(), 0);

        // Nothing was taken from the counter, so nothing is given back
        state.compensate(&first);
        assert_eq!(state.unread_count(), 0);
    }

    #[test]
    fn test_mark_read_rollback_after_delete_leaves_counter_alone() {
        let mut state = loaded(
            vec![notification("a", false, 1), notification("b", false, 2)],
            2,
        );

        let mark = state.apply(StoreMutation::MarkRead { id: "a".into() });
        assert_eq!(state.unread_count(), 1);

        // Delete lands while mark-read is still in flight, then mark-read fails
        state.apply(StoreMutation::Remove { id: "a".into() });
        assert_eq!(state.unread_count(), 1);

        assert_eq!(state.compensate(&mark), CompensationOutcome::Noop);
        assert_eq!(state.len(), 1);
        assert_eq!(state.unread_count(), 1);
        assert_eq!(
            state.items().iter().filter(|n| !n.read).count() as u64,
            state.unread_count()
        );
    }

    #[test]
    fn test_mark_all_read_requests_resync() {
        let mut state = loaded(
            vec![notification("a", false, 1), notification("b", false, 2)],
            2,
        );
        let command = state.apply(StoreMutation::MarkAllRead);
        assert!(state.items().iter().all(|n| n.read));
        assert_eq!(state.unread_count(), 0);
        assert_eq!(state.compensate(&command), CompensationOutcome::ResyncRequired);
    }

    #[test]
    fn test_remove_unread_decrements() {
        let mut state = loaded(
            vec![notification("a", false, 1), notification("b", true, 2)],
            1,
        );
        state.apply(StoreMutation::Remove { id: "b".into() });
        assert_eq!(state.unread_count(), 1);
        state.apply(StoreMutation::Remove { id: "a".into() });
        assert_eq!(state.unread_count(), 0);
        assert!(state.is_empty());
    }

    #[test]
    fn test_compensation_after_reload_is_stale() {
        let mut state = loaded(vec![notification("a", false, 1)], 1);
        let command = state.apply(StoreMutation::MarkRead { id: "a".into() });

        state.replace(NotificationPage {
            items: vec![notification("a", true, 1)],
            unread_count: 0,
        });

        assert_eq!(state.compensate(&command), CompensationOutcome::Stale);
        assert!(state.get("a").unwrap().read);
        assert_eq!(state.unread_count(), 0);
    }

    #[test]
    fn test_pushed_count_wins_over_rollback() {
        let mut state = loaded(vec![notification("a", false, 1)], 1);
        let command = state.apply(StoreMutation::MarkRead { id: "a".into() });

        state.set_unread_count(7);

        assert_eq!(state.compensate(&command), CompensationOutcome::Reverted);
        assert!(!state.get("a").unwrap().read);
        assert_eq!(state.unread_count(), 7);
    }

    #[test]
    fn test_reset_makes_pending_commands_stale() {
        let mut state = loaded(vec![notification("a", false, 1)], 1);
        let command = state.apply(StoreMutation::ClearAll);
        state.reset();
        assert_eq!(state.compensate(&command), CompensationOutcome::Stale);
    }
}
