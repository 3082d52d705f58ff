//! Recently finalized task ids.
//!
//! Bounded by capacity (oldest evicted first) and by a time window. The lock
//! is held only for the map operation itself.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use {
    switchyard_config::DedupeConfig,
    switchyard_protocol::TaskId,
    tokio::time::Instant,
};

#[derive(Debug, Default)]
struct Window {
    claimed: HashMap<TaskId, Instant>,
    /// Claim order. May hold stale entries for released ids; those are
    /// skipped when they reach the front.
    order: VecDeque<(TaskId, Instant)>,
}

impl Window {
    fn is_live(&self, id: &TaskId, now: Instant, ttl: Duration) -> bool {
        self.claimed
            .get(id)
            .is_some_and(|at| now.duration_since(*at) < ttl)
    }

    fn expire(&mut self, now: Instant, ttl: Duration) {
        while let Some((id, at)) = self.order.front() {
            let stale = self.claimed.get(id) != Some(at);
            if !stale && now.duration_since(*at) < ttl {
                break;
            }
            if !stale {
                self.claimed.remove(id);
            }
            self.order.pop_front();
        }
    }

    fn evict_oldest(&mut self) {
        while let Some((id, at)) = self.order.pop_front() {
            if self.claimed.get(&id) == Some(&at) {
                self.claimed.remove(&id);
                return;
            }
        }
    }
}

#[derive(Debug)]
pub struct RecentTasks {
    window: Mutex<Window>,
    capacity: usize,
    ttl: Duration,
}

impl RecentTasks {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &DedupeConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `id` as finalized. Returns `false` if it already was within
    /// the window, in which case the caller must not publish again.
    pub fn claim(&self, id: &TaskId) -> bool {
        let now = Instant::now();
        let mut window = self.lock();
        window.expire(now, self.ttl);
        if window.is_live(id, now, self.ttl) {
            return false;
        }
        window.claimed.insert(id.clone(), now);
        window.order.push_back((id.clone(), now));
        while window.claimed.len() > self.capacity {
            window.evict_oldest();
        }
        true
    }

    /// Undo a claim whose side effects did not happen.
    pub fn release(&self, id: &TaskId) {
        self.lock().claimed.remove(id);
    }

    /// Claim `id` for the lifetime of the returned guard. The claim is
    /// released when the guard drops, including when the owning future is
    /// cancelled, unless [`Claim::keep`] was called first.
    pub fn claim_scoped(&self, id: &TaskId) -> Option<Claim<'_>> {
        self.claim(id).then(|| Claim {
            recent: self,
            id: id.clone(),
            kept: false,
        })
    }

    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        let now = Instant::now();
        self.lock().is_live(id, now, self.ttl)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut window = self.lock();
        window.expire(now, self.ttl);
        window.claimed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A claim that has not been committed yet.
#[must_use = "dropping a claim releases it"]
pub struct Claim<'a> {
    recent: &'a RecentTasks,
    id: TaskId,
    kept: bool,
}

impl Claim<'_> {
    /// Commit the claim; it then lives until evicted or expired.
    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.recent.release(&self.id);
        }
    }
}

impl Default for RecentTasks {
    fn default() -> Self {
        Self::from_config(&DedupeConfig::default())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    #[test]
    fn second_claim_is_refused() {
        let recent = RecentTasks::new(10, Duration::from_secs(60));
        assert!(recent.claim(&id("T1")));
        assert!(!recent.claim(&id("T1")));
        assert!(recent.contains(&id("T1")));
    }

    #[test]
    fn release_allows_reclaim() {
        let recent = RecentTasks::new(10, Duration::from_secs(60));
        assert!(recent.claim(&id("T1")));
        recent.release(&id("T1"));
        assert!(!recent.contains(&id("T1")));
        assert!(recent.claim(&id("T1")));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn scoped_claim_is_released_unless_kept() {
        let recent = RecentTasks::new(10, Duration::from_secs(60));
        let claim = recent.claim_scoped(&id("T1")).unwrap();
        assert!(recent.claim_scoped(&id("T1")).is_none());
        drop(claim);
        assert!(!recent.contains(&id("T1")));

        recent.claim_scoped(&id("T1")).unwrap().keep();
        assert!(recent.contains(&id("T1")));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let recent = RecentTasks::new(2, Duration::from_secs(60));
        recent.claim(&id("a"));
        recent.claim(&id("b"));
        recent.claim(&id("c"));
        assert!(!recent.contains(&id("a")));
        assert!(recent.contains(&id("b")));
        assert!(recent.contains(&id("c")));
        assert_eq!(recent.len(), 2);
    }

    #[rstest]
    #[case(1, &["a", "b"], &["b"])]
    #[case(3, &["a", "b", "a", "c"], &["a", "b", "c"])]
    #[case(2, &["a", "b", "c", "d"], &["c", "d"])]
    fn live_set_after_claims(#[case] capacity: usize, #[case] claims: &[&str], #[case] live: &[&str]) {
        let recent = RecentTasks::new(capacity, Duration::from_secs(60));
        for claim in claims {
            recent.claim(&id(claim));
        }
        for expected in live {
            assert!(recent.contains(&id(expected)), "{expected} should be live");
        }
        assert_eq!(recent.len(), live.len());
    }

    #[test]
    fn stale_order_entries_do_not_evict_live_claims() {
        let recent = RecentTasks::new(2, Duration::from_secs(60));
        recent.claim(&id("a"));
        recent.release(&id("a"));
        recent.claim(&id("b"));
        recent.claim(&id("c"));
        assert!(recent.contains(&id("b")));
        assert!(recent.contains(&id("c")));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let recent = RecentTasks::new(10, Duration::from_secs(5));
        recent.claim(&id("T1"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!recent.contains(&id("T1")));
        assert!(recent.is_empty());
        assert!(recent.claim(&id("T1")));
    }
}
