//! Queued action records.
//!
//! A [`QueuedAction`] is one mutation captured for later delivery, with
//! enough bookkeeping to replay it, retry it, and explain what happened
//! to it.
//!
//! # State Machine
//!
//! ```text
//! Pending --[begin_attempt]--> InFlight
//! InFlight --[complete]--> Done
//! InFlight --[fail_attempt, attempts left]--> Pending
//! InFlight --[fail_attempt, attempts spent]--> Failed
//! Failed --[reset_for_retry]--> Pending (attempt count zeroed)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{MutationKind, MutationRequest};

/// Lifecycle state of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for replay.
    Pending,
    /// A delivery attempt is running right now.
    InFlight,
    /// Out of attempts; parked for inspection, manual retry or discard.
    Failed,
    /// Applied on the backend.
    Done,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::InFlight => "in_flight",
            ActionStatus::Failed => "failed",
            ActionStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Stable identity, assigned at enqueue time.
    pub id: String,
    /// Operation to replay.
    pub kind: MutationKind,
    /// Target collection.
    pub resource: String,
    /// Operation payload, exactly as submitted.
    pub payload: Value,
    /// Delivery attempts made so far.
    pub attempt_count: u32,
    /// Attempts allowed before the action parks as failed.
    pub max_attempts: u32,
    /// Enqueue time, unix milliseconds.
    pub created_at_ms: i64,
    /// Lifecycle state.
    pub status: ActionStatus,
}

impl QueuedAction {
    /// Capture a mutation as a pending action.
    pub fn new(request: MutationRequest, max_attempts: u32, now_ms: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: request.kind,
            resource: request.resource,
            payload: request.payload,
            attempt_count: 0,
            max_attempts,
            created_at_ms: now_ms,
            status: ActionStatus::Pending,
        }
    }

    /// Rebuild the mutation this action replays.
    pub fn to_request(&self) -> MutationRequest {
        MutationRequest::new(self.resource.clone(), self.kind, self.payload.clone())
    }

    /// Whether another delivery attempt is allowed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Start a delivery attempt.
    pub fn begin_attempt(&mut self) {
        self.attempt_count += 1;
        self.status = ActionStatus::InFlight;
    }

    /// The attempt succeeded; the action is terminal.
    pub fn complete(&mut self) {
        self.status = ActionStatus::Done;
    }

    /// The attempt failed. Returns `true` while the action is still
    /// eligible for another attempt, `false` once it parks as failed.
    pub fn fail_attempt(&mut self) -> bool {
        if self.has_attempts_left() {
            self.status = ActionStatus::Pending;
            true
        } else {
            self.status = ActionStatus::Failed;
            false
        }
    }

    /// Re-arm a failed action for a fresh round of attempts.
    pub fn reset_for_retry(&mut self) {
        self.attempt_count = 0;
        self.status = ActionStatus::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_action(max_attempts: u32) -> QueuedAction {
        QueuedAction::new(
            MutationRequest::insert("vessels", json!({"name": "Nordkapp"})),
            max_attempts,
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_new_action_is_pending_with_fresh_id() {
        let a = sample_action(3);
        let b = sample_action(3);

        assert_eq!(a.status, ActionStatus::Pending);
        assert_eq!(a.attempt_count, 0);
        assert!(a.has_attempts_left());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_attempt_then_complete() {
        let mut action = sample_action(3);

        action.begin_attempt();
        assert_eq!(action.status, ActionStatus::InFlight);
        assert_eq!(action.attempt_count, 1);

        action.complete();
        assert_eq!(action.status, ActionStatus::Done);
    }

    #[test]
    fn test_failure_below_max_returns_to_pending() {
        let mut action = sample_action(3);

        action.begin_attempt();
        assert!(action.fail_attempt());
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.has_attempts_left());
    }

    #[test]
    fn test_failure_at_max_parks_as_failed() {
        let mut action = sample_action(2);

        action.begin_attempt();
        assert!(action.fail_attempt());
        action.begin_attempt();
        assert!(!action.fail_attempt());

        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.attempt_count, 2);
        assert!(!action.has_attempts_left());
    }

    #[test]
    fn test_reset_for_retry_rearms() {
        let mut action = sample_action(1);
        action.begin_attempt();
        action.fail_attempt();
        assert_eq!(action.status, ActionStatus::Failed);

        action.reset_for_retry();
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.attempt_count, 0);
        assert!(action.has_attempts_left());
    }

    #[test]
    fn test_to_request_round_trips_the_mutation() {
        let request = MutationRequest::delete("vessels", json!({"id": 9}));
        let action = QueuedAction::new(request.clone(), 3, 0);
        assert_eq!(action.to_request(), request);
    }

    #[test]
    fn test_serde_round_trip_preserves_status() {
        let mut action = sample_action(3);
        action.begin_attempt();

        let bytes = serde_json::to_vec(&action).unwrap();
        let back: QueuedAction = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(back, action);
        assert!(serde_json::to_string(&ActionStatus::InFlight)
            .unwrap()
            .contains("in_flight"));
    }
}
