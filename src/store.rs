//! The slot → window assignment table.
//!
//! [`AssignmentStore`] is the single source of truth for "which window lives
//! on which desktop".  It is shared between the hotkey path, the
//! persistent-app scan and explicit remove/clear requests, so every
//! operation takes an internal lock for its whole duration and nothing
//! borrowed from the table escapes a call.
//!
//! Consumers that need to refresh when the table changes can either
//! [`subscribe`](AssignmentStore::subscribe) to a channel or poll
//! [`version`](AssignmentStore::version).

use crate::command::{DesktopSlot, WindowHandle};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex, MutexGuard};

/// A window pinned to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowAssignment {
    pub slot: DesktopSlot,
    /// Back-reference only; the window may have closed since.
    pub handle: WindowHandle,
    /// Title at the time of assignment.
    pub title: String,
    pub process_name: String,
    pub assigned_at: DateTime<Utc>,
}

impl WindowAssignment {
    /// Build an assignment stamped with the current time.
    pub fn new(
        slot: DesktopSlot,
        handle: WindowHandle,
        title: impl Into<String>,
        process_name: impl Into<String>,
    ) -> Self {
        Self {
            slot,
            handle,
            title: title.into(),
            process_name: process_name.into(),
            assigned_at: Utc::now(),
        }
    }

    /// Display name of the slot's desktop.
    pub fn desktop_name(&self) -> String {
        format!("Desktop {}", self.slot)
    }
}

impl fmt::Display for WindowAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.desktop_name(), self.title, self.process_name)
    }
}

/// Notification that the table changed.  Carries the new version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentChanged {
    pub version: u64,
}

/// Concurrent slot → [`WindowAssignment`] table.
#[derive(Debug, Default)]
pub struct AssignmentStore {
    table: Mutex<BTreeMap<DesktopSlot, WindowAssignment>>,
    version: AtomicU64,
    subscribers: Mutex<Vec<mpsc::Sender<AssignmentChanged>>>,
}

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this module leaves the map consistent, so a
/// poisoned lock still guards valid data.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive an [`AssignmentChanged`] for every notifying mutation from
    /// now on.  Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::Receiver<AssignmentChanged> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Number of notifying mutations so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Insert or replace the entry for `slot`.  Always notifies.
    ///
    /// The stored assignment's slot is forced to `slot`.  Returns the entry
    /// that was replaced, if any.
    pub fn upsert(&self, slot: DesktopSlot, mut assignment: WindowAssignment) -> Option<WindowAssignment> {
        assignment.slot = slot;
        let (previous, version) = {
            let mut table = lock(&self.table);
            let previous = table.insert(slot, assignment);
            (previous, self.bump())
        };
        self.notify(version);
        previous
    }

    /// Delete the entry for `slot`.  Notifies only if something was removed.
    pub fn remove(&self, slot: DesktopSlot) -> Option<WindowAssignment> {
        let (removed, version) = {
            let mut table = lock(&self.table);
            match table.remove(&slot) {
                Some(removed) => (Some(removed), Some(self.bump())),
                None => (None, None),
            }
        };
        if let Some(version) = version {
            self.notify(version);
        }
        removed
    }

    /// Empty the table.  Always notifies, even if it was already empty.
    pub fn clear(&self) {
        let version = {
            let mut table = lock(&self.table);
            table.clear();
            self.bump()
        };
        self.notify(version);
    }

    /// The entry for `slot`, if any.
    pub fn get(&self, slot: DesktopSlot) -> Option<WindowAssignment> {
        lock(&self.table).get(&slot).cloned()
    }

    /// Every entry, ordered by slot ascending.
    pub fn get_all(&self) -> Vec<WindowAssignment> {
        lock(&self.table).values().cloned().collect()
    }

    /// Whether any slot holds `handle`.
    pub fn contains_window(&self, handle: WindowHandle) -> bool {
        lock(&self.table).values().any(|a| a.handle == handle)
    }

    pub fn len(&self) -> usize {
        lock(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.table).is_empty()
    }

    /// Must be called with the table lock held so versions follow write order.
    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, version: u64) {
        let event = AssignmentChanged { version };
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event).is_ok());
        debug!("assignments changed (v{}, {} subscriber(s))", version, subscribers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn slot(n: u8) -> DesktopSlot {
        DesktopSlot::new(n).unwrap()
    }

    fn assignment(n: u8, handle: u64, title: &str) -> WindowAssignment {
        WindowAssignment::new(slot(n), WindowHandle(handle), title, "proc")
    }

    #[test]
    fn upsert_replaces_existing_slot() {
        let store = AssignmentStore::new();
        assert!(store.upsert(slot(3), assignment(3, 1, "first")).is_none());
        let replaced = store.upsert(slot(3), assignment(3, 2, "second"));

        assert_eq!(replaced.unwrap().title, "first");
        assert_eq!(store.len(), 1);
        let got = store.get(slot(3)).unwrap();
        assert_eq!(got.handle, WindowHandle(2));
        assert_eq!(got.title, "second");
    }

    #[test]
    fn get_all_is_sorted_by_slot() {
        let store = AssignmentStore::new();
        for n in [7, 2, 9, 1] {
            store.upsert(slot(n), assignment(n, u64::from(n), "w"));
        }
        let slots: Vec<u8> = store.get_all().iter().map(|a| a.slot.get()).collect();
        assert_eq!(slots, vec![1, 2, 7, 9]);
    }

    #[test]
    fn upsert_forces_the_key_slot() {
        let store = AssignmentStore::new();
        store.upsert(slot(4), assignment(1, 10, "w"));
        assert_eq!(store.get(slot(4)).unwrap().slot, slot(4));
        assert!(store.get(slot(1)).is_none());
    }

    #[test]
    fn notification_counts_follow_the_contract() {
        let store = AssignmentStore::new();
        let rx = store.subscribe();

        store.upsert(slot(1), assignment(1, 1, "a"));
        store.upsert(slot(1), assignment(1, 2, "b"));
        assert_eq!(rx.try_iter().count(), 2);

        assert!(store.remove(slot(5)).is_none());
        assert_eq!(rx.try_iter().count(), 0);

        assert!(store.remove(slot(1)).is_some());
        assert_eq!(rx.try_iter().count(), 1);

        store.clear();
        store.clear();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].version, store.version());
        assert!(store.is_empty());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let store = AssignmentStore::new();
        drop(store.subscribe());
        let rx = store.subscribe();
        store.clear();
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(lock(&store.subscribers).len(), 1);
    }

    #[test]
    fn contains_window_matches_handles() {
        let store = AssignmentStore::new();
        store.upsert(slot(2), assignment(2, 0xabc, "w"));
        assert!(store.contains_window(WindowHandle(0xabc)));
        assert!(!store.contains_window(WindowHandle(0xdef)));
    }

    #[test]
    fn concurrent_writers_keep_one_entry_per_slot() {
        let store = Arc::new(AssignmentStore::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        let n = ((t + i) % 9 + 1) as u8;
                        store.upsert(slot(n), assignment(n, t * 1000 + i, "w"));
                        if i % 50 == 0 {
                            store.remove(slot(n));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let all = store.get_all();
        assert!(all.len() <= 9);
        for a in &all {
            assert_eq!(store.get(a.slot).unwrap(), *a);
        }
    }

    #[test]
    fn display_includes_desktop_title_and_process() {
        let a = WindowAssignment::new(slot(3), WindowHandle(1), "Notepad", "notepad.exe");
        assert_eq!(a.to_string(), "Desktop 3: Notepad (notepad.exe)");
    }
}
