//! Trailing-edge event throttling.
//!
//! Push channels can deliver bursts far faster than a consumer wants to
//! repaint. [`EventThrottle`] sits between the raw channel and the
//! consumer callback: the first event in a quiet period passes through
//! immediately, events arriving inside the throttle interval overwrite a
//! single pending slot, and one deferred flush at the interval boundary
//! delivers whatever is newest. Intermediate values are dropped, never
//! queued.
//!
//! # Architecture
//!
//! ```text
//!  offer(v) ──► quiet? ──yes──► sink(v)                (immediate edge)
//!                 │no
//!                 ▼
//!             pending = v   ──► flusher task ──► sink(newest)
//!             (overwrite)        at last_emit + interval
//!                                  ▲
//!                realtime gate ────┘ (false: hold; false→true: flush now)
//! ```
//!
//! The realtime gate follows the live policy. While it is off, values are
//! held in the pending slot instead of being discarded, and the held value
//! is flushed exactly once, immediately, when the gate re-opens.
//!
//! # Example
//!
//! ```ignore
//! let throttle = EventThrottle::new(policy.throttle_interval, realtime_rx, metrics, move |event| {
//!     update_view(event);
//! });
//! tokio::spawn(throttle.clone().run(cancel.child_token()));
//! push_channel.subscribe("vessels", Arc::new(move |event| throttle.offer(event)))?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::telemetry::RuntimeMetrics;

struct ThrottleState<T> {
    last_emit: Option<Instant>,
    pending: Option<T>,
}

struct Shared<T> {
    sink: Box<dyn Fn(T) + Send + Sync>,
    interval_ms: AtomicU64,
    realtime: watch::Receiver<bool>,
    /// Wakes the flusher when the pending slot or interval changes.
    wakeup: Notify,
    state: Mutex<ThrottleState<T>>,
    metrics: Arc<RuntimeMetrics>,
}

/// Trailing-edge throttle delivering at most one value per interval.
pub struct EventThrottle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventThrottle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> EventThrottle<T> {
    /// Create a throttle feeding `sink`, gated by a realtime flag.
    pub fn new(
        interval: Duration,
        realtime: watch::Receiver<bool>,
        metrics: Arc<RuntimeMetrics>,
        sink: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink: Box::new(sink),
                interval_ms: AtomicU64::new(interval.as_millis() as u64),
                realtime,
                wakeup: Notify::new(),
                state: Mutex::new(ThrottleState {
                    last_emit: None,
                    pending: None,
                }),
                metrics,
            }),
        }
    }

    /// The current throttle interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.shared.interval_ms.load(Ordering::Relaxed))
    }

    /// Change the throttle interval; an already scheduled flush moves to
    /// the new boundary.
    pub fn set_interval(&self, interval: Duration) {
        self.shared
            .interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
        self.shared.wakeup.notify_one();
    }

    /// Offer a value for delivery.
    ///
    /// Emits synchronously when the throttle is quiet and realtime is on;
    /// otherwise the value lands in the pending slot, displacing anything
    /// already there.
    pub fn offer(&self, value: T) {
        let now = Instant::now();
        let interval = self.interval();

        let to_emit = {
            let mut state = self.shared.state.lock();
            let realtime = *self.shared.realtime.borrow();
            let quiet = state
                .last_emit
                .map_or(true, |t| now.duration_since(t) >= interval);

            if realtime && quiet && state.pending.is_none() {
                state.last_emit = Some(now);
                Some(value)
            } else {
                if state.pending.replace(value).is_some() {
                    self.shared.metrics.throttle_suppressed();
                }
                None
            }
        };

        match to_emit {
            Some(value) => {
                (self.shared.sink)(value);
                self.shared.metrics.throttle_emitted();
            }
            None => self.shared.wakeup.notify_one(),
        }
    }

    /// Deliver the pending value now, if there is one.
    fn flush_now(&self) {
        let flushed = {
            let mut state = self.shared.state.lock();
            match state.pending.take() {
                Some(value) => {
                    state.last_emit = Some(Instant::now());
                    Some(value)
                }
                None => None,
            }
        };
        if let Some(value) = flushed {
            (self.shared.sink)(value);
            self.shared.metrics.throttle_emitted();
        }
    }

    /// Drive deferred flushes and the realtime gate until cancelled.
    ///
    /// While realtime is off no boundary flush fires; the pending value
    /// waits. Re-enabling realtime flushes it immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut realtime = self.shared.realtime.clone();

        loop {
            let (has_deadline, deadline) = {
                let state = self.shared.state.lock();
                if state.pending.is_some() && *realtime.borrow() {
                    let at = state
                        .last_emit
                        .map(|t| t + self.interval())
                        .unwrap_or_else(Instant::now);
                    (true, at)
                } else {
                    (false, Instant::now())
                }
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("event throttle stopping");
                    break;
                }

                changed = realtime.changed() => match changed {
                    Ok(()) => {
                        let enabled = *realtime.borrow_and_update();
                        if enabled {
                            // The held value goes out right away, once.
                            self.flush_now();
                        }
                    }
                    Err(_) => break,
                },

                _ = self.shared.wakeup.notified() => {}

                _ = tokio::time::sleep_until(deadline), if has_deadline => self.flush_now(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        throttle: EventThrottle<&'static str>,
        emissions: Arc<Mutex<Vec<(&'static str, Duration)>>>,
        realtime_tx: watch::Sender<bool>,
        metrics: Arc<RuntimeMetrics>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn start(interval: Duration, realtime: bool) -> Self {
            let (realtime_tx, realtime_rx) = watch::channel(realtime);
            let metrics = Arc::new(RuntimeMetrics::new());
            let emissions: Arc<Mutex<Vec<(&'static str, Duration)>>> =
                Arc::new(Mutex::new(Vec::new()));

            let started = Instant::now();
            let sink_log = Arc::clone(&emissions);
            let throttle = EventThrottle::new(
                interval,
                realtime_rx,
                Arc::clone(&metrics),
                move |value| {
                    sink_log.lock().push((value, started.elapsed()));
                },
            );

            let cancel = CancellationToken::new();
            let task = tokio::spawn(throttle.clone().run(cancel.clone()));
            Self {
                throttle,
                emissions,
                realtime_tx,
                metrics,
                cancel,
                task,
            }
        }

        fn seen(&self) -> Vec<(&'static str, Duration)> {
            self.emissions.lock().clone()
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_event_in_quiet_period_passes_through() {
        let h = Harness::start(Duration::from_millis(2000), true);

        h.throttle.offer("v0");
        assert_eq!(h.seen(), vec![("v0", Duration::ZERO)]);
        assert_eq!(h.metrics.snapshot().throttle_emitted, 1);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_delivers_newest_at_the_boundary() {
        let h = Harness::start(Duration::from_millis(2000), true);

        h.throttle.offer("t0");
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.throttle.offer("t500");
        tokio::time::sleep(Duration::from_millis(1300)).await;
        h.throttle.offer("t1800");

        // Cross the boundary; the deferred flush fires at exactly 2000.
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(
            h.seen(),
            vec![
                ("t0", Duration::ZERO),
                ("t1800", Duration::from_millis(2000)),
            ]
        );
        // t500 was displaced and never delivered.
        assert_eq!(h.metrics.snapshot().throttle_suppressed, 1);
        assert_eq!(h.metrics.snapshot().throttle_emitted, 2);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_after_flush_emits_immediately_again() {
        let h = Harness::start(Duration::from_millis(2000), true);

        h.throttle.offer("a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.throttle.offer("b");
        tokio::time::sleep(Duration::from_millis(3900)).await;

        // Well past the last emission at t=2000; this one is immediate.
        h.throttle.offer("c");

        assert_eq!(
            h.seen(),
            vec![
                ("a", Duration::ZERO),
                ("b", Duration::from_millis(2000)),
                ("c", Duration::from_millis(4000)),
            ]
        );

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_holds_values_and_flushes_once_on_reenable() {
        let h = Harness::start(Duration::from_millis(500), false);

        h.throttle.offer("v1");
        h.throttle.offer("v2");
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(h.seen().is_empty());

        h.realtime_tx.send(true).unwrap();
        settle().await;

        let seen = h.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "v2");
        // Only the displaced v1 counts as dropped.
        assert_eq!(h.metrics.snapshot().throttle_suppressed, 1);

        // Nothing left to flush; time passing adds no emissions.
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(h.seen().len(), 1);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenable_without_pending_emits_nothing() {
        let h = Harness::start(Duration::from_millis(500), false);

        h.realtime_tx.send(true).unwrap();
        settle().await;

        assert!(h.seen().is_empty());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_mid_deferral_holds_the_value() {
        let h = Harness::start(Duration::from_millis(2000), true);

        h.throttle.offer("v0");
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.throttle.offer("v100");

        // Gate closes before the boundary; the scheduled flush must not fire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.realtime_tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(2800)).await;
        assert_eq!(h.seen().len(), 1);

        h.realtime_tx.send(true).unwrap();
        settle().await;

        let seen = h.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, "v100");
        assert_eq!(seen[1].1, Duration::from_millis(3000));

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_the_deferred_flush() {
        let h = Harness::start(Duration::from_millis(2000), true);

        h.throttle.offer("v0");
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.throttle.offer("v100");

        h.cancel.cancel();
        h.task.await.unwrap();

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(h.emissions.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_moves_the_boundary() {
        let h = Harness::start(Duration::from_millis(2000), true);

        h.throttle.offer("v0");
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.throttle.offer("v100");

        h.throttle.set_interval(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(450)).await;

        // Flushed at the new 500ms boundary instead of 2000ms.
        assert_eq!(
            h.seen(),
            vec![
                ("v0", Duration::ZERO),
                ("v100", Duration::from_millis(500)),
            ]
        );

        h.stop().await;
    }
}
