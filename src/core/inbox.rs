use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

/// A HITL reply delivered to a suspended review stage.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Feedback {
    pub text: String,
    pub skip: bool,
}

impl Feedback {
    pub fn timed_out() -> Self {
        Self {
            text: String::new(),
            skip: true,
        }
    }
}

#[derive(Default)]
struct Slot {
    value: Option<Feedback>,
    notify: Arc<Notify>,
}

/// Per-job one-slot rendezvous for HITL feedback. One waiter per job; a
/// publish before the waiter arrives is held until consumed, and a second
/// publish before consumption replaces the first.
#[derive(Clone, Default)]
pub struct FeedbackInbox {
    slots: Arc<Mutex<HashMap<i64, Slot>>>,
}

impl FeedbackInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a feedback value and wake the waiter, if any. Last writer wins.
    pub async fn publish(&self, job_id: i64, feedback: Feedback) {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(job_id).or_default();
        slot.value = Some(feedback);
        slot.notify.notify_one();
    }

    /// Block until a value is published or the timeout elapses. Timeout is
    /// reported as a skip so the orchestrator proceeds with the current
    /// stage result.
    pub async fn await_feedback(&self, job_id: i64, timeout: Duration) -> Feedback {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = {
                let mut slots = self.slots.lock().await;
                let slot = slots.entry(job_id).or_default();
                if let Some(value) = slot.value.take() {
                    return value;
                }
                slot.notify.clone()
            };
            if tokio::time::timeout_at(deadline, notify.notified())
                .await
                .is_err()
            {
                return Feedback::timed_out();
            }
        }
    }

    /// Discard any pending value so a following `await_feedback` observes
    /// only publishes made after this call.
    pub async fn reset(&self, job_id: i64) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&job_id) {
            slot.value = None;
        }
    }

    /// Drop the slot entirely at end of orchestration.
    pub async fn remove(&self, job_id: i64) {
        self.slots.lock().await.remove(&job_id);
    }
}
