use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::core::retrieval::BpCase;
use crate::core::store::types::{Decision, SegmentReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Processing,
    Completed,
}

/// Outbound events on the per-job progress stream, serialized as tagged
/// JSON records for the observer UI.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    PageProgress {
        job_id: i64,
        current: usize,
        total: usize,
        status: PhaseStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        page_title: Option<String>,
        reset_agents: bool,
    },
    StageStatus {
        agent: String,
        status: PhaseStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    BpCases {
        records: Vec<BpCase>,
    },
    Interrupt {
        job_id: i64,
        agent: String,
        results: serde_json::Value,
        feedback_suggestion: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        quality_issues: Option<Vec<String>>,
    },
    PageCompleted {
        current: usize,
        total: usize,
        page_title: String,
        page_id: String,
        page_report: String,
        page_decision: Decision,
        page_decision_reason: String,
    },
    Completed {
        report: String,
        decision: Decision,
        decision_reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        decisions: Option<Vec<SegmentReport>>,
    },
    Error {
        message: String,
    },
}

/// Registry of per-job observer channels. Sends are fire-and-forget: with
/// no observer attached the event is dropped, and the orchestrator never
/// blocks on delivery.
#[derive(Clone, Default)]
pub struct ProgressHub {
    observers: Arc<Mutex<HashMap<i64, mpsc::UnboundedSender<ReviewEvent>>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for a job, replacing any previous one.
    pub async fn attach(&self, job_id: i64) -> mpsc::UnboundedReceiver<ReviewEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().await.insert(job_id, tx);
        rx
    }

    pub async fn detach(&self, job_id: i64) {
        self.observers.lock().await.remove(&job_id);
    }

    pub async fn send(&self, job_id: i64, event: ReviewEvent) {
        let mut observers = self.observers.lock().await;
        if let Some(tx) = observers.get(&job_id)
            && tx.send(event).is_err()
        {
            observers.remove(&job_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let hub = ProgressHub::new();
        let mut rx = hub.attach(1).await;

        hub.send(
            1,
            ReviewEvent::StageStatus {
                agent: "BP_Scouter".to_string(),
                status: PhaseStatus::Processing,
                message: None,
            },
        )
        .await;
        hub.send(
            1,
            ReviewEvent::StageStatus {
                agent: "BP_Scouter".to_string(),
                status: PhaseStatus::Completed,
                message: Some("BP 사례 3건 검색 완료".to_string()),
            },
        )
        .await;

        match rx.recv().await.unwrap() {
            ReviewEvent::StageStatus { status, .. } => assert_eq!(status, PhaseStatus::Processing),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ReviewEvent::StageStatus { status, .. } => assert_eq!(status, PhaseStatus::Completed),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_without_observer_is_dropped() {
        let hub = ProgressHub::new();
        hub.send(
            99,
            ReviewEvent::Error {
                message: "dropped".to_string(),
            },
        )
        .await;
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ReviewEvent::PageProgress {
            job_id: 5,
            current: 1,
            total: 2,
            status: PhaseStatus::Processing,
            page_title: Some("설계".to_string()),
            reset_agents: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "page_progress");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["page_title"], "설계");

        let event = ReviewEvent::Completed {
            report: "<div/>".to_string(),
            decision: Decision::Approved,
            decision_reason: "근거".to_string(),
            decisions: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["decision"], "approved");
        assert!(json.get("decisions").is_none());
    }
}
