//! Cancellable per-sensor delay timers and the periodic tick

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A timer that has been armed but has not fired yet
struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// At most one delayed action per sensor.
///
/// A timer fires only if it can still remove its own map entry once the
/// delay has elapsed. `cancel` removes the entry before aborting the task,
/// so whichever side removes the entry first wins: a cancelled timer never
/// runs its action, and an action that already claimed its entry runs to
/// completion.
pub struct DelayScheduler {
    /// Pending timers (keyed by sensor ID)
    timers: Arc<DashMap<String, PendingTimer>>,
    next_generation: AtomicU64,
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayScheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Run `on_elapsed` after `delay_secs` unless cancelled first.
    ///
    /// Replaces any timer already pending for the sensor. A zero delay arms
    /// nothing and returns `false`.
    pub fn arm<F, Fut>(&self, sensor_id: &str, delay_secs: u64, on_elapsed: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if delay_secs == 0 {
            return false;
        }

        self.cancel(sensor_id);

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let key = sensor_id.to_string();
        let timers = Arc::clone(&self.timers);

        // Holding the entry keeps the new task from claiming it before the
        // handle is stored.
        let entry = self.timers.entry(key.clone());
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;

            if timers
                .remove_if(&key, |_, timer| timer.generation == generation)
                .is_none()
            {
                return;
            }

            tracing::debug!("Delay timer elapsed for {}", key);
            on_elapsed().await;
        });

        let timer = PendingTimer { generation, handle };
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(timer);
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(timer);
            }
        }

        tracing::debug!("Armed {}s delay timer for {}", delay_secs, sensor_id);
        true
    }

    /// Cancel the pending timer for a sensor, if any
    pub fn cancel(&self, sensor_id: &str) -> bool {
        match self.timers.remove(sensor_id) {
            Some((_, timer)) => {
                timer.handle.abort();
                tracing::debug!("Cancelled delay timer for {}", sensor_id);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|_, timer| {
            timer.handle.abort();
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            tracing::debug!("Cancelled {} delay timers", cancelled);
        }
        cancelled
    }

    #[must_use]
    pub fn is_pending(&self, sensor_id: &str) -> bool {
        self.timers.contains_key(sensor_id)
    }

    /// Sensors with a pending timer, sorted
    #[must_use]
    pub fn pending_sensors(&self) -> Vec<String> {
        let mut sensors: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        sensors.sort();
        sensors
    }

    /// Get the number of pending timers
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for DelayScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Spawn a task calling `on_tick` every `period`, starting one period from now
pub fn spawn_periodic<F, Fut>(period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            interval.tick().await;
            on_tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(count: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_and_clears_entry() {
        let scheduler = DelayScheduler::new();
        let fired = counter();

        assert!(scheduler.arm("binary_sensor.hall", 5, bump(&fired)));
        assert!(scheduler.is_pending("binary_sensor.hall"));

        advance(4).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        advance(2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending("binary_sensor.hall"));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = DelayScheduler::new();
        let fired = counter();

        scheduler.arm("binary_sensor.hall", 5, bump(&fired));
        scheduler.arm("binary_sensor.hall", 5, bump(&fired));
        assert_eq!(scheduler.pending_count(), 1);

        advance(10).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_noop() {
        let scheduler = DelayScheduler::new();
        let fired = counter();

        assert!(!scheduler.arm("binary_sensor.hall", 0, bump(&fired)));
        assert!(!scheduler.is_pending("binary_sensor.hall"));

        advance(1).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_elapse() {
        let scheduler = DelayScheduler::new();
        let fired = counter();

        scheduler.arm("binary_sensor.hall", 5, bump(&fired));
        advance(3).await;
        assert!(scheduler.cancel("binary_sensor.hall"));
        assert!(!scheduler.cancel("binary_sensor.hall"));

        advance(10).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_pending() {
        let scheduler = DelayScheduler::new();
        let fired = counter();

        for sensor in ["binary_sensor.a", "binary_sensor.b", "binary_sensor.c"] {
            scheduler.arm(sensor, 5, bump(&fired));
        }
        assert_eq!(scheduler.cancel_all(), 3);
        assert_eq!(scheduler.pending_count(), 0);

        advance(10).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_action_survives_cancel() {
        let scheduler = DelayScheduler::new();
        let started = counter();
        let finished = counter();

        let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
        scheduler.arm("binary_sensor.hall", 5, move || async move {
            s.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            f.fetch_add(1, Ordering::SeqCst);
        });

        advance(6).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(!scheduler.cancel("binary_sensor.hall"));
        assert_eq!(scheduler.cancel_all(), 0);

        advance(15).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_skips_immediate_tick() {
        let ticks = counter();
        let t = Arc::clone(&ticks);
        let handle = spawn_periodic(Duration::from_secs(30), move || {
            t.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        });

        advance(1).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        advance(60).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        handle.abort();
        advance(60).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
