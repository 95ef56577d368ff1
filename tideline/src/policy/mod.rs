//! Adaptive performance policy.
//!
//! The policy layer answers one question for the rest of the system: given
//! the current connection quality, memory pressure and user preferences,
//! how aggressive should the client be? The answer is a single immutable
//! [`PerformancePolicy`] value recomputed by [`PolicyEngine`] whenever an
//! input tier moves.
//!
//! ```text
//! NetworkMonitor ──┐
//!                  ├──► PolicyEngine ──► watch<PerformancePolicy> ──► consumers
//! MemoryMonitor ───┘     (memoized)
//! ```

mod engine;
mod profile;

pub use engine::PolicyEngine;
pub use profile::{derive_policy, PerformancePolicy, PolicyInputs};
