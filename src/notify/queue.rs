// src/notify/queue.rs
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{DisplaySurface, Notification};
use crate::session::TabId;

/// Per-tab backlog cap; the oldest commands are dropped first.
const MAX_QUEUED_PER_TAB: usize = 32;

/// Undrained tabs kept at once. Past this, the tab delivered to least
/// recently loses its backlog (closed tabs never drain).
pub const MAX_QUEUED_TABS: usize = 256;

/// Per-tab outbox drained by the host over HTTP.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    inner: Mutex<Outboxes>,
}

#[derive(Debug, Default)]
struct Outboxes {
    tabs: HashMap<TabId, Outbox>,
    stamp: u64,
}

#[derive(Debug, Default)]
struct Outbox {
    last_delivery: u64,
    queue: VecDeque<Notification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued command for `tab`, oldest first.
    pub fn drain(&self, tab: TabId) -> Vec<Notification> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .tabs
            .remove(&tab)
            .map(|o| o.queue.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, tab: TabId) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tabs.get(&tab).map(|o| o.queue.len()).unwrap_or(0)
    }

    /// Tabs holding undrained commands.
    pub fn tab_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).tabs.len()
    }
}

impl DisplaySurface for NotificationQueue {
    fn deliver(&self, tab: TabId, notification: Notification) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stamp += 1;
        let stamp = inner.stamp;
        if !inner.tabs.contains_key(&tab) && inner.tabs.len() >= MAX_QUEUED_TABS {
            let stale = inner
                .tabs
                .iter()
                .min_by_key(|(_, o)| o.last_delivery)
                .map(|(t, _)| *t);
            if let Some(stale) = stale {
                inner.tabs.remove(&stale);
            }
        }
        let outbox = inner.tabs.entry(tab).or_default();
        outbox.last_delivery = stamp;
        if outbox.queue.len() >= MAX_QUEUED_PER_TAB {
            outbox.queue.pop_front();
        }
        outbox.queue.push_back(notification);
        Ok(())
    }
}

/// Keeps every delivered command; tabs in `closed` reject delivery.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    delivered: Mutex<Vec<(TabId, Notification)>>,
    closed: Mutex<HashSet<TabId>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a closed tab.
    pub fn close_tab(&self, tab: TabId) {
        self.closed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tab);
    }

    pub fn delivered(&self) -> Vec<(TabId, Notification)> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn for_tab(&self, tab: TabId) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|(t, _)| *t == tab)
            .map(|(_, n)| n)
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.delivered().iter().map(|(_, n)| n.kind()).collect()
    }

    pub fn clear(&self) {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl DisplaySurface for RecordingSurface {
    fn deliver(&self, tab: TabId, notification: Notification) -> anyhow::Result<()> {
        if self
            .closed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&tab)
        {
            anyhow::bail!("tab {tab} is closed");
        }
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((tab, notification));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_per_tab_in_order() {
        let q = NotificationQueue::new();
        q.deliver(1, Notification::Dismiss).unwrap();
        q.deliver(2, Notification::Redirect { url: "u".into() }).unwrap();
        q.deliver(1, Notification::Redirect { url: "v".into() }).unwrap();

        let one = q.drain(1);
        assert_eq!(one.len(), 2);
        assert_eq!(one[0], Notification::Dismiss);
        assert!(q.drain(1).is_empty());
        assert_eq!(q.len(2), 1);
    }

    #[test]
    fn queue_is_bounded() {
        let q = NotificationQueue::new();
        for i in 0..(MAX_QUEUED_PER_TAB + 5) {
            q.deliver(1, Notification::Redirect { url: i.to_string() }).unwrap();
        }
        let all = q.drain(1);
        assert_eq!(all.len(), MAX_QUEUED_PER_TAB);
        assert_eq!(all[0], Notification::Redirect { url: "5".into() });
    }

    #[test]
    fn queue_drops_least_recently_delivered_tab_past_cap() {
        let q = NotificationQueue::new();
        for tab in 0..MAX_QUEUED_TABS as TabId {
            q.deliver(tab, Notification::Dismiss).unwrap();
        }
        // Tab 0 is fresh again, so tab 1 is the stalest.
        q.deliver(0, Notification::Dismiss).unwrap();
        q.deliver(10_000, Notification::Dismiss).unwrap();

        assert_eq!(q.tab_count(), MAX_QUEUED_TABS);
        assert_eq!(q.len(1), 0);
        assert_eq!(q.len(0), 2);
        assert_eq!(q.len(10_000), 1);
    }

    #[test]
    fn closed_tab_rejects() {
        let r = RecordingSurface::new();
        r.close_tab(4);
        assert!(r.deliver(4, Notification::Dismiss).is_err());
        assert!(r.deliver(5, Notification::Dismiss).is_ok());
        assert_eq!(r.kinds(), vec!["dismiss"]);
    }
}
