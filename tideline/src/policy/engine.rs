//! Reactive policy recomputation.
//!
//! [`PolicyEngine`] sits between the two monitors and everything else. It
//! watches the connection snapshot and memory pressure channels, derives a
//! fresh [`PerformancePolicy`] whenever the derivation inputs actually
//! change, and publishes it on its own watch channel.
//!
//! Memoization happens at the input level: the engine keeps the last
//! [`PolicyInputs`] it derived from and skips derivation entirely when a
//! channel wakeup carries the same triple. A connection sample that changes
//! only its raw rtt, for example, never reaches consumers.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::netinfo::{ConnectionSnapshot, MemoryPressure};
use crate::telemetry::RuntimeMetrics;

use super::profile::{derive_policy, PerformancePolicy, PolicyInputs};

/// Derives and publishes the live [`PerformancePolicy`].
pub struct PolicyEngine {
    network_rx: watch::Receiver<ConnectionSnapshot>,
    pressure_rx: watch::Receiver<MemoryPressure>,
    policy_tx: watch::Sender<PerformancePolicy>,
    last_inputs: PolicyInputs,
    metrics: Arc<RuntimeMetrics>,
}

impl PolicyEngine {
    /// Create an engine and derive the initial policy immediately.
    pub fn new(
        network_rx: watch::Receiver<ConnectionSnapshot>,
        pressure_rx: watch::Receiver<MemoryPressure>,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        let last_inputs = PolicyInputs::from_parts(&network_rx.borrow(), *pressure_rx.borrow());
        let initial = derive_policy(last_inputs);
        info!(
            quality = %last_inputs.quality,
            pressure = %last_inputs.pressure,
            page_size = initial.page_size,
            "policy engine starting"
        );
        let (policy_tx, _) = watch::channel(initial);
        Self {
            network_rx,
            pressure_rx,
            policy_tx,
            last_inputs,
            metrics,
        }
    }

    /// Subscribe to policy changes.
    pub fn subscribe(&self) -> watch::Receiver<PerformancePolicy> {
        self.policy_tx.subscribe()
    }

    /// The most recently derived policy.
    pub fn policy(&self) -> PerformancePolicy {
        self.policy_tx.borrow().clone()
    }

    /// React to monitor updates until cancelled or both monitors are gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("policy engine stopping");
                    break;
                }

                changed = self.network_rx.changed() => {
                    if changed.is_err() {
                        debug!("network channel closed, policy engine stopping");
                        break;
                    }
                    self.recompute();
                }

                changed = self.pressure_rx.changed() => {
                    if changed.is_err() {
                        debug!("pressure channel closed, policy engine stopping");
                        break;
                    }
                    self.recompute();
                }
            }
        }
    }

    /// Derive and publish if the inputs moved; a no-op otherwise.
    fn recompute(&mut self) {
        let inputs =
            PolicyInputs::from_parts(&self.network_rx.borrow(), *self.pressure_rx.borrow());
        if inputs == self.last_inputs {
            return;
        }
        self.last_inputs = inputs;

        let policy = derive_policy(inputs);
        self.metrics.policy_recomputed();
        info!(
            quality = %inputs.quality,
            pressure = %inputs.pressure,
            save_data = inputs.save_data,
            page_size = policy.page_size,
            realtime = policy.realtime_enabled,
            "policy recomputed"
        );

        self.policy_tx.send_if_modified(|current| {
            if *current == policy {
                return false;
            }
            *current = policy;
            true
        });
    }
}
