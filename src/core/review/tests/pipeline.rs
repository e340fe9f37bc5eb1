//! End-to-end orchestration scenarios against mock gateways. Assertions
//! target event shape and ordering, not LLM text.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::inbox::{Feedback, FeedbackInbox};
use crate::core::llm::{CompleteOptions, LlmGateway};
use crate::core::progress::{PhaseStatus, ProgressHub, ReviewEvent};
use crate::core::retrieval::{BpCase, RetrievalGateway, RetrievalMethod, stub_bp_cases};
use crate::core::review::{ReviewContext, run_review_job};
use crate::core::store::JobStore;
use crate::core::store::types::{Decision, NewJob, Segment};

// Marker phrases unique to each prompt template.
const OBJECTIVE_MARK: &str = "목표 적합성을 검토하고 평가해주세요";
const DATA_MARK: &str = "데이터 분석을 수행해주세요";
const RISK_MARK: &str = "리스크 분석을 수행해주세요";
const ROI_MARK: &str = "ROI를 추정해주세요";
const FINAL_MARK: &str = "최종 의견을 작성해주세요";
const IMPROVE_MARK: &str = "개선된 지원서를 작성해주세요";

struct MockLlm {
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl MockLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        })
    }

    fn failing_on(marker: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(marker),
        })
    }

    fn count_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl LlmGateway for MockLlm {
    async fn complete(&self, prompt: &str, _opts: CompleteOptions) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.to_string());
        if let Some(marker) = self.fail_on
            && prompt.contains(marker)
        {
            anyhow::bail!("mock provider failure");
        }
        if prompt.contains("심사위원") {
            return Ok(r#"{"decision": "승인", "reason": "실행 가능성이 높음"}"#.to_string());
        }
        if prompt.contains("품질 관리자") {
            return Ok(r#"{"issues": [], "suggestion": "피드백 예시입니다"}"#.to_string());
        }
        if prompt.contains("제목을 만드는 전문가") {
            return Ok(r#"{"title": "목업 제목"}"#.to_string());
        }
        Ok("충분히 상세한 분석 결과입니다. 목표가 명확하고 데이터 확보가 가능하며 \
            리스크가 낮고 기대 효과가 투자 대비 충분합니다."
            .to_string())
    }
}

struct MockRetrieval {
    fail: bool,
}

#[async_trait]
impl RetrievalGateway for MockRetrieval {
    async fn retrieve(
        &self,
        _query: &str,
        k: usize,
        _method: RetrievalMethod,
    ) -> Result<Vec<BpCase>> {
        if self.fail {
            anyhow::bail!("retrieval gateway unavailable");
        }
        Ok(vec![
            BpCase {
                title: "수율 개선 사례".to_string(),
                tech_type: "예측".to_string(),
                business_domain: "제조".to_string(),
                division: "메모리".to_string(),
                problem_as_was: "수율 85%".to_string(),
                solution_to_be: "AI 예측 모델".to_string(),
                summary: "수율 3% 향상".to_string(),
                tips: None,
                link: None,
            };
            k.min(2)
        ])
    }
}

struct Harness {
    ctx: ReviewContext,
    llm: Arc<MockLlm>,
    store: Arc<JobStore>,
}

fn harness_with(llm: Arc<MockLlm>, fail_retrieval: bool) -> Harness {
    let store = Arc::new(JobStore::open_in_memory().unwrap());
    let ctx = ReviewContext {
        store: store.clone(),
        llm: llm.clone(),
        retrieval: Arc::new(MockRetrieval {
            fail: fail_retrieval,
        }),
        progress: ProgressHub::new(),
        inbox: FeedbackInbox::new(),
    };
    Harness { ctx, llm, store }
}

fn harness() -> Harness {
    harness_with(MockLlm::new(), false)
}

fn single_segment() -> Vec<Segment> {
    vec![Segment {
        id: "1".to_string(),
        title: "운영 효율 개선".to_string(),
        content: "운영 효율 개선 제안".to_string(),
    }]
}

async fn submit(h: &Harness, hitl_stages: Vec<u8>, segments: Vec<Segment>, improve: bool) -> i64 {
    h.store
        .create_job(NewJob {
            title: "운영 효율 개선".to_string(),
            proposal_content: "운영 효율 개선 제안".to_string(),
            domain: "제조".to_string(),
            division: "메모리".to_string(),
            hitl_stages,
            segments,
            enable_sequential_thinking: false,
            improve,
        })
        .await
        .unwrap()
}

fn text_feedback(text: &str) -> Feedback {
    Feedback {
        text: text.to_string(),
        skip: false,
    }
}

fn skip_feedback() -> Feedback {
    Feedback {
        text: String::new(),
        skip: true,
    }
}

/// Run the orchestration to its terminal event, answering each interrupt
/// from the script (skip once the script is exhausted).
async fn drive(h: &Harness, job_id: i64, mut script: Vec<Feedback>) -> Vec<ReviewEvent> {
    let mut rx = h.ctx.progress.attach(job_id).await;
    let runner = tokio::spawn(run_review_job(h.ctx.clone(), job_id));

    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for a review event");
        let Some(event) = event else { break };

        if matches!(event, ReviewEvent::Interrupt { .. }) {
            let fb = if script.is_empty() {
                skip_feedback()
            } else {
                script.remove(0)
            };
            h.ctx.inbox.publish(job_id, fb).await;
        }

        let terminal = matches!(
            event,
            ReviewEvent::Completed { .. } | ReviewEvent::Error { .. }
        );
        events.push(event);
        if terminal {
            break;
        }
    }

    runner.await.unwrap();
    events
}

/// Compact label per event for order assertions.
fn label(event: &ReviewEvent) -> String {
    match event {
        ReviewEvent::PageProgress {
            current, status, ..
        } => format!("page_progress:{}:{:?}", current, status),
        ReviewEvent::StageStatus { agent, status, .. } => {
            let phase = match status {
                PhaseStatus::Processing => "processing",
                PhaseStatus::Completed => "completed",
            };
            format!("stage:{}:{}", agent, phase)
        }
        ReviewEvent::BpCases { .. } => "bp_cases".to_string(),
        ReviewEvent::Interrupt { agent, .. } => format!("interrupt:{}", agent),
        ReviewEvent::PageCompleted { page_id, .. } => format!("page_completed:{}", page_id),
        ReviewEvent::Completed { .. } => "completed".to_string(),
        ReviewEvent::Error { .. } => "error".to_string(),
    }
}

fn interrupt_count(events: &[ReviewEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ReviewEvent::Interrupt { .. }))
        .count()
}

#[tokio::test]
async fn single_segment_without_hitl_emits_canonical_sequence() {
    let h = harness();
    let job_id = submit(&h, vec![], single_segment(), false).await;
    let events = drive(&h, job_id, vec![]).await;

    let labels: Vec<String> = events.iter().map(|e| label(e)).collect();
    assert_eq!(
        labels,
        vec![
            "page_progress:1:Processing",
            "stage:BP_Scouter:processing",
            "stage:BP_Scouter:completed",
            "bp_cases",
            "stage:Objective_Reviewer:processing",
            "stage:Objective_Reviewer:completed",
            "stage:Data_Analyzer:processing",
            "stage:Data_Analyzer:completed",
            "stage:Risk_Analyzer:processing",
            "stage:Risk_Analyzer:completed",
            "stage:ROI_Estimator:processing",
            "stage:ROI_Estimator:completed",
            "stage:Final_Generator:processing",
            "stage:Final_Generator:completed",
            "page_completed:1",
            "completed",
        ]
    );

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
    assert!(matches!(
        job.llm_decision,
        Decision::Approved | Decision::OnHold
    ));
    assert!(job.metadata.report.is_some());
    for key in [
        "bp_cases",
        "objective_review",
        "data_analysis",
        "risk_analysis",
        "roi_estimation",
        "final_recommendation",
    ] {
        assert!(
            job.metadata.agent_results.contains_key(key),
            "missing agent result {}",
            key
        );
    }
}

#[tokio::test]
async fn hitl_feedback_regenerates_stage_two_once() {
    let h = harness();
    let job_id = submit(&h, vec![2], single_segment(), false).await;
    let events = drive(&h, job_id, vec![text_feedback("정량 KPI 추가")]).await;

    assert_eq!(h.llm.count_containing(OBJECTIVE_MARK), 2);
    // the feedback reaches the regeneration prompt and the final synthesis
    assert_eq!(h.llm.count_containing("정량 KPI 추가"), 2);
    // interrupt after the initial run and after the regeneration
    assert_eq!(interrupt_count(&events), 2);

    match events
        .iter()
        .find(|e| matches!(e, ReviewEvent::Interrupt { .. }))
        .unwrap()
    {
        ReviewEvent::Interrupt {
            agent,
            results,
            quality_issues,
            ..
        } => {
            assert_eq!(agent, "Objective_Reviewer");
            assert!(results.get("objective_review").is_some());
            assert!(quality_issues.is_some());
        }
        _ => unreachable!(),
    }

    // no other stage was gated
    assert_eq!(h.llm.count_containing(DATA_MARK), 1);
    assert!(matches!(events.last(), Some(ReviewEvent::Completed { .. })));
}

#[tokio::test]
async fn hitl_skip_proceeds_without_regeneration() {
    let h = harness();
    let job_id = submit(&h, vec![2], single_segment(), false).await;
    let events = drive(&h, job_id, vec![skip_feedback()]).await;

    assert_eq!(h.llm.count_containing(OBJECTIVE_MARK), 1);
    assert_eq!(interrupt_count(&events), 1);
    assert!(matches!(events.last(), Some(ReviewEvent::Completed { .. })));
}

#[tokio::test]
async fn hitl_retry_cap_stops_after_three_regenerations() {
    let h = harness();
    let job_id = submit(&h, vec![3], single_segment(), false).await;
    let events = drive(
        &h,
        job_id,
        vec![
            text_feedback("첫번째 보완"),
            text_feedback("두번째 보완"),
            text_feedback("세번째 보완"),
        ],
    )
    .await;

    // initial run plus exactly three regenerations
    assert_eq!(h.llm.count_containing(DATA_MARK), 4);
    assert_eq!(interrupt_count(&events), 3);
    assert!(matches!(events.last(), Some(ReviewEvent::Completed { .. })));

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "completed");
}

#[tokio::test]
async fn multi_segment_job_reviews_pages_in_order() {
    let h = harness();
    let segments = vec![
        Segment {
            id: "A".to_string(),
            title: "설계".to_string(),
            content: "설계 페이지 내용".to_string(),
        },
        Segment {
            id: "B".to_string(),
            title: "검증".to_string(),
            content: "검증 페이지 내용".to_string(),
        },
    ];
    let job_id = submit(&h, vec![], segments, false).await;
    let events = drive(&h, job_id, vec![]).await;

    let page_completions: Vec<&ReviewEvent> = events
        .iter()
        .filter(|e| matches!(e, ReviewEvent::PageCompleted { .. }))
        .collect();
    assert_eq!(page_completions.len(), 2);
    match (page_completions[0], page_completions[1]) {
        (
            ReviewEvent::PageCompleted {
                page_id: first,
                current: c1,
                total: t1,
                ..
            },
            ReviewEvent::PageCompleted {
                page_id: second,
                current: c2,
                ..
            },
        ) => {
            assert_eq!(first, "A");
            assert_eq!(second, "B");
            assert_eq!((*c1, *t1, *c2), (1, 2, 2));
        }
        _ => unreachable!(),
    }

    match events.last().unwrap() {
        ReviewEvent::Completed { decisions, .. } => {
            let decisions = decisions.as_ref().expect("multi-segment verdict list");
            assert_eq!(decisions.len(), 2);
            assert_eq!(decisions[0].id, "A");
            assert_eq!(decisions[1].id, "B");
        }
        other => panic!("expected completed, got {:?}", label(other)),
    }

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    let reports = job.metadata.segment_reports.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].id, "A");
}

#[tokio::test]
async fn retrieval_failure_substitutes_stub_records() {
    let h = harness_with(MockLlm::new(), true);
    let job_id = submit(&h, vec![], single_segment(), false).await;
    let events = drive(&h, job_id, vec![]).await;

    let records = events
        .iter()
        .find_map(|e| match e {
            ReviewEvent::BpCases { records } => Some(records.clone()),
            _ => None,
        })
        .expect("bp_cases event must still be emitted");
    assert_eq!(records, stub_bp_cases("제조", "메모리"));
    assert!(matches!(events.last(), Some(ReviewEvent::Completed { .. })));
}

#[tokio::test]
async fn stage_llm_failure_aborts_segment_with_error() {
    let h = harness_with(MockLlm::failing_on(RISK_MARK), false);
    let job_id = submit(&h, vec![], single_segment(), false).await;
    let events = drive(&h, job_id, vec![]).await;

    match events.last().unwrap() {
        ReviewEvent::Error { message } => assert!(!message.is_empty()),
        other => panic!("expected error event, got {:?}", label(other)),
    }

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, "error");
    // earlier stage outputs stay persisted for inspection
    assert!(job.metadata.agent_results.contains_key("objective_review"));
    assert!(job.metadata.agent_results.contains_key("data_analysis"));
    assert!(!job.metadata.agent_results.contains_key("risk_analysis"));
    // the failed call was retried exactly once
    assert_eq!(h.llm.count_containing(RISK_MARK), 2);
}

#[tokio::test]
async fn improver_runs_after_final_synthesis_when_enabled() {
    let h = harness();
    let job_id = submit(&h, vec![], single_segment(), true).await;
    let events = drive(&h, job_id, vec![]).await;

    assert_eq!(h.llm.count_containing(IMPROVE_MARK), 1);
    assert_eq!(h.llm.count_containing(FINAL_MARK), 1);

    let labels: Vec<String> = events.iter().map(|e| label(e)).collect();
    let final_idx = labels
        .iter()
        .position(|l| l == "stage:Final_Generator:completed")
        .unwrap();
    let improve_idx = labels
        .iter()
        .position(|l| l == "stage:Proposal_Improver:completed")
        .unwrap();
    let page_idx = labels.iter().position(|l| l == "page_completed:1").unwrap();
    assert!(final_idx < improve_idx && improve_idx < page_idx);

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert!(job.metadata.agent_results.contains_key("improved_proposal"));
}
