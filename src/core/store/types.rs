use std::collections::BTreeMap;

/// Review verdict for a job or a segment. `human_decision` and
/// `llm_decision` both use this set; they are stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Decision {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "on-hold")]
    OnHold,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Pending => "pending",
            Decision::Approved => "approved",
            Decision::OnHold => "on-hold",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Decision::Pending),
            "approved" => Some(Decision::Approved),
            "on-hold" => Some(Decision::OnHold),
            _ => None,
        }
    }
}

/// One independently reviewable unit of a submission. A plain-text
/// submission becomes a single synthetic segment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FinalDecision {
    pub decision: Decision,
    pub reason: String,
}

/// Per-segment review outcome, appended in segment order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SegmentReport {
    pub id: String,
    pub title: String,
    pub report: String,
    pub decision: Decision,
    pub reason: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeedbackEntry {
    pub feedback: String,
    pub skip: bool,
    pub timestamp: String,
}

/// Structured metadata bag persisted with each job. Typed fields for the
/// recognized keys; anything else rides in `extra`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_results: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_decision: Option<FinalDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_stages: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_reports: Option<Vec<SegmentReport>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_history: Option<Vec<FeedbackEntry>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct JobRecord {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub proposal_content: String,
    pub domain: String,
    pub division: String,
    pub human_decision: Decision,
    pub llm_decision: Decision,
    pub hitl_stages: Vec<u8>,
    pub segments: Vec<Segment>,
    pub enable_sequential_thinking: bool,
    pub improve: bool,
    pub metadata: JobMetadata,
    pub created_at: String,
    pub updated_at: String,
}

/// Field-level patch for `update_job`. Scalar fields overwrite; `metadata`
/// is deep-merged (see `merge_metadata`).
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub title: Option<String>,
    pub proposal_content: Option<String>,
    pub domain: Option<String>,
    pub division: Option<String>,
    pub status: Option<String>,
    pub human_decision: Option<Decision>,
    pub llm_decision: Option<Decision>,
    pub hitl_stages: Option<Vec<u8>>,
    pub metadata: Option<JobMetadata>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.proposal_content.is_none()
            && self.domain.is_none()
            && self.division.is_none()
            && self.status.is_none()
            && self.human_decision.is_none()
            && self.llm_decision.is_none()
            && self.hitl_stages.is_none()
            && self.metadata.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub title: String,
    pub proposal_content: String,
    pub domain: String,
    pub division: String,
    pub hitl_stages: Vec<u8>,
    pub segments: Vec<Segment>,
    pub enable_sequential_thinking: bool,
    pub improve: bool,
}

/// Admin listing filter. Decisions and status match exactly; `search` is a
/// substring match over title and proposal content.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<String>,
    pub human_decision: Option<Decision>,
    pub llm_decision: Option<Decision>,
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub ascending: bool,
}
