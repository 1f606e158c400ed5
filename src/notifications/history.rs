//! Bounded, most-recent-first notification history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::NotificationRecord;

/// Server-side cap on page size, regardless of the requested limit.
pub const MAX_PAGE_LIMIT: usize = 100;

/// One page of history.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<NotificationRecord>,
    /// Current stored length (post-eviction), not the lifetime total.
    pub total: usize,
    pub has_more: bool,
}

/// Fixed-capacity ring of processed notifications, newest first.
///
/// Only the listener task appends; pagination readers take a snapshot
/// under the lock, so an in-progress append or eviction is never
/// observed halfway. Eviction is purely positional: oldest entries drop
/// first, timestamps are never compared.
#[derive(Debug)]
pub struct NotificationHistory {
    entries: RwLock<VecDeque<NotificationRecord>>,
    capacity: usize,
    /// Lifetime count of appends, independent of eviction.
    lifetime: AtomicU64,
}

impl NotificationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            lifetime: AtomicU64::new(0),
        }
    }

    /// Insert at the head, evicting from the tail while over capacity.
    pub fn append(&self, record: NotificationRecord) {
        let mut entries = self.entries.write();
        entries.push_front(record);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
        drop(entries);

        self.lifetime.fetch_add(1, Ordering::Relaxed);
    }

    /// Read up to `limit` entries starting at `offset`, newest first.
    pub fn page(&self, offset: usize, limit: usize) -> Page {
        let limit = limit.min(MAX_PAGE_LIMIT);
        let entries = self.entries.read();
        let total = entries.len();

        Page {
            items: entries.iter().skip(offset).take(limit).cloned().collect(),
            total,
            has_more: offset.saturating_add(limit) < total,
        }
    }

    /// Current stored length (≤ capacity).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Total notifications ever appended.
    pub fn lifetime_total(&self) -> u64 {
        self.lifetime.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn notification(n: usize) -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            notification_type: "welcome".into(),
            event_id: Uuid::new_v4(),
            recipient_name: format!("user-{n}"),
            recipient_email: format!("user-{n}@example.com"),
            status: "sent".into(),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_append_is_most_recent_first() {
        let history = NotificationHistory::new(10);
        history.append(notification(1));
        history.append(notification(2));

        let page = history.page(0, 10);
        assert_eq!(page.items[0].recipient_name, "user-2");
        assert_eq!(page.items[1].recipient_name, "user-1");
    }

    #[test]
    fn test_capacity_bound_evicts_oldest() {
        let capacity = 100;
        let extra = 7;
        let history = NotificationHistory::new(capacity);

        for n in 0..capacity + extra {
            history.append(notification(n));
        }

        assert_eq!(history.len(), capacity);
        assert_eq!(history.lifetime_total(), (capacity + extra) as u64);

        // The `extra` oldest entries are gone; the tail is the oldest survivor
        let page = history.page(0, MAX_PAGE_LIMIT);
        assert_eq!(page.items.last().unwrap().recipient_name, format!("user-{extra}"));
        assert_eq!(
            page.items.first().unwrap().recipient_name,
            format!("user-{}", capacity + extra - 1)
        );
    }

    #[test]
    fn test_pagination_contract() {
        let history = NotificationHistory::new(100);
        for n in 0..25 {
            history.append(notification(n));
        }

        let page = history.page(20, 20);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total, 25);
        assert!(!page.has_more);

        let page = history.page(0, 10);
        assert_eq!(page.items.len(), 10);
        assert!(page.has_more);
    }

    #[test]
    fn test_limit_is_capped() {
        let history = NotificationHistory::new(200);
        for n in 0..150 {
            history.append(notification(n));
        }

        let page = history.page(0, 500);
        assert_eq!(page.items.len(), MAX_PAGE_LIMIT);
        assert!(page.has_more);
    }

    #[test]
    fn test_huge_offset_does_not_overflow() {
        let history = NotificationHistory::new(10);
        history.append(notification(1));

        // offset comes straight from the query string; usize::MAX must
        // yield an empty page, not overflow the has_more arithmetic
        let page = history.page(usize::MAX, 20);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert!(!page.has_more);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let history = NotificationHistory::new(100);
        history.append(notification(1));

        let page = history.page(10, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert!(!page.has_more);
    }
}
