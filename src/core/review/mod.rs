//! Review orchestration: drives a job through the specialist stages.
//!
//! One cooperative task per job. Within a job, stages run strictly in
//! order; every stage result is persisted to the job store before the next
//! stage starts. Stages listed in the job's `hitl_stages` suspend on the
//! feedback inbox after completing, and regenerate with the human's
//! feedback up to [`MAX_HITL_RETRIES`] times. Multi-segment jobs review
//! each segment end-to-end in submission order.

pub mod prompts;
pub mod quality;
pub mod report;
pub mod stages;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::core::inbox::FeedbackInbox;
use crate::core::llm::{CompleteOptions, LlmGateway};
use crate::core::progress::{PhaseStatus, ProgressHub, ReviewEvent};
use crate::core::retrieval::{BP_RESULT_COUNT, BpCase, RetrievalGateway, RetrievalMethod};
use crate::core::store::JobStore;
use crate::core::store::types::{
    Decision, FinalDecision, JobMetadata, JobPatch, JobRecord, Segment, SegmentReport,
};
use stages::{ReviewStage, StageResults};

/// HITL regeneration cap per stage. After the third regeneration the
/// orchestrator keeps the last result regardless of further feedback.
pub const MAX_HITL_RETRIES: u32 = 3;

/// How long a HITL checkpoint waits for the human before proceeding.
pub const FEEDBACK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const LLM_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Effects handed to the orchestrator and stages: durable store, gateways,
/// and the two keyed per-job rendezvous resources.
#[derive(Clone)]
pub struct ReviewContext {
    pub store: Arc<JobStore>,
    pub llm: Arc<dyn LlmGateway>,
    pub retrieval: Arc<dyn RetrievalGateway>,
    pub progress: ProgressHub,
    pub inbox: FeedbackInbox,
}

struct StageOutcome {
    text: String,
    feedbacks: Vec<String>,
}

/// Run the full review for one job. Spawned from the submit handler; an
/// observer disconnecting never cancels it.
pub async fn run_review_job(ctx: ReviewContext, job_id: i64) {
    let job = match ctx.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!("Review requested for unknown job {}", job_id);
            return;
        }
        Err(e) => {
            error!("Failed to load job {}: {}", job_id, e);
            return;
        }
    };

    let segments = if job.segments.is_empty() {
        vec![Segment {
            id: "1".to_string(),
            title: job.title.clone(),
            content: job.proposal_content.clone(),
        }]
    } else {
        job.segments.clone()
    };
    let total = segments.len();
    info!("Review started for job {} ({} segment(s))", job_id, total);

    let mut segment_reports: Vec<SegmentReport> = Vec::new();

    for (idx, segment) in segments.iter().enumerate() {
        ctx.progress
            .send(
                job_id,
                ReviewEvent::PageProgress {
                    job_id,
                    current: idx + 1,
                    total,
                    status: PhaseStatus::Processing,
                    page_title: Some(segment.title.clone()),
                    reset_agents: true,
                },
            )
            .await;

        let segment_report = match review_segment(&ctx, &job, segment).await {
            Ok(sr) => sr,
            Err(e) => {
                fail_job(&ctx, job_id, e).await;
                return;
            }
        };
        segment_reports.push(segment_report.clone());

        // Segment reports are appended in order; persist before announcing.
        let persisted = ctx
            .store
            .update_job(
                job_id,
                JobPatch {
                    metadata: Some(JobMetadata {
                        segment_reports: Some(segment_reports.clone()),
                        ..JobMetadata::default()
                    }),
                    ..JobPatch::default()
                },
            )
            .await;
        if let Err(e) = persisted {
            fail_job(&ctx, job_id, e.context("persisting segment report")).await;
            return;
        }

        ctx.progress
            .send(
                job_id,
                ReviewEvent::PageCompleted {
                    current: idx + 1,
                    total,
                    page_title: segment_report.title.clone(),
                    page_id: segment_report.id.clone(),
                    page_report: segment_report.report.clone(),
                    page_decision: segment_report.decision,
                    page_decision_reason: segment_report.reason.clone(),
                },
            )
            .await;
    }

    let approved_count = segment_reports
        .iter()
        .filter(|sr| sr.decision == Decision::Approved)
        .count();
    let decision = if approved_count == segment_reports.len() {
        Decision::Approved
    } else {
        Decision::OnHold
    };
    let reason = if total == 1 {
        segment_reports[0].reason.clone()
    } else {
        format!("{}개 페이지 중 {}개 승인", total, approved_count)
    };
    let combined_report = report::aggregate_report(&segment_reports);

    let final_patch = JobPatch {
        status: Some("completed".to_string()),
        llm_decision: Some(decision),
        metadata: Some(JobMetadata {
            report: Some(combined_report.clone()),
            final_decision: Some(FinalDecision {
                decision,
                reason: reason.clone(),
            }),
            ..JobMetadata::default()
        }),
        ..JobPatch::default()
    };
    if let Err(e) = ctx.store.update_job(job_id, final_patch).await {
        fail_job(&ctx, job_id, e.context("persisting final verdict")).await;
        return;
    }

    ctx.progress
        .send(
            job_id,
            ReviewEvent::Completed {
                report: combined_report,
                decision,
                decision_reason: reason,
                decisions: (total > 1).then(|| segment_reports.clone()),
            },
        )
        .await;

    info!("Review completed for job {} ({})", job_id, decision.as_str());
    teardown(&ctx, job_id).await;
}

async fn fail_job(ctx: &ReviewContext, job_id: i64, err: anyhow::Error) {
    error!("Review failed for job {}: {:#}", job_id, err);
    let _ = ctx
        .store
        .update_job(
            job_id,
            JobPatch {
                status: Some("error".to_string()),
                ..JobPatch::default()
            },
        )
        .await;
    ctx.progress
        .send(
            job_id,
            ReviewEvent::Error {
                message: err.to_string(),
            },
        )
        .await;
    teardown(ctx, job_id).await;
}

async fn teardown(ctx: &ReviewContext, job_id: i64) {
    ctx.inbox.remove(job_id).await;
    ctx.progress.detach(job_id).await;
}

/// Run all stages for one segment and return its report and verdict.
async fn review_segment(
    ctx: &ReviewContext,
    job: &JobRecord,
    segment: &Segment,
) -> Result<SegmentReport> {
    let mut results = StageResults::default();

    let bp_cases = scout_bp_cases(ctx, job, segment).await?;

    for stage in ReviewStage::text_stages() {
        let outcome = stage_loop(ctx, job, segment, stage, &results, &bp_cases).await?;
        if !outcome.feedbacks.is_empty() {
            results
                .user_feedbacks
                .insert(stage.number(), outcome.feedbacks.join("\n"));
        }
        results.set(stage, outcome.text);
    }

    let outcome = stage_loop(
        ctx,
        job,
        segment,
        ReviewStage::FinalGenerator,
        &results,
        &bp_cases,
    )
    .await?;
    if !outcome.feedbacks.is_empty() {
        results
            .user_feedbacks
            .insert(ReviewStage::FinalGenerator.number(), outcome.feedbacks.join("\n"));
    }
    results.set(ReviewStage::FinalGenerator, outcome.text);

    let report_html = report::build_report(&bp_cases, &results);
    let verdict = quality::classify_final_decision(
        ctx.llm.as_ref(),
        &report_html,
        &results.final_recommendation,
    )
    .await;

    if job.improve {
        stage_loop(
            ctx,
            job,
            segment,
            ReviewStage::ProposalImprover,
            &results,
            &bp_cases,
        )
        .await?;
    }

    Ok(SegmentReport {
        id: segment.id.clone(),
        title: segment.title.clone(),
        report: report_html,
        decision: verdict.decision,
        reason: verdict.reason,
    })
}

/// Stage 1: query the retrieval gateway; on failure or an empty result,
/// substitute the fixed stub set so the pipeline proceeds degraded. Never
/// subject to HITL.
async fn scout_bp_cases(
    ctx: &ReviewContext,
    job: &JobRecord,
    segment: &Segment,
) -> Result<Vec<BpCase>> {
    let stage = ReviewStage::BpScouter;
    ctx.progress
        .send(
            job.id,
            ReviewEvent::StageStatus {
                agent: stage.agent_name().to_string(),
                status: PhaseStatus::Processing,
                message: Some(stage.processing_message().to_string()),
            },
        )
        .await;

    let snippet: String = segment.content.chars().take(200).collect();
    let query = format!("{} {} {} BP 사례", job.domain, job.division, snippet);

    let bp_cases = match ctx
        .retrieval
        .retrieve(&query, BP_RESULT_COUNT, RetrievalMethod::Rrf)
        .await
    {
        Ok(cases) if !cases.is_empty() => cases,
        Ok(_) => {
            info!("Retrieval returned no records, using stub set");
            crate::core::retrieval::stub_bp_cases(&job.domain, &job.division)
        }
        Err(e) => {
            warn!("Retrieval unavailable, using stub set: {}", e);
            crate::core::retrieval::stub_bp_cases(&job.domain, &job.division)
        }
    };

    persist_stage(ctx, job.id, stage, serde_json::json!(bp_cases)).await?;

    ctx.progress
        .send(
            job.id,
            ReviewEvent::StageStatus {
                agent: stage.agent_name().to_string(),
                status: PhaseStatus::Completed,
                message: Some(format!("BP 사례 {}건 검색 완료", bp_cases.len())),
            },
        )
        .await;
    ctx.progress
        .send(
            job.id,
            ReviewEvent::BpCases {
                records: bp_cases.clone(),
            },
        )
        .await;

    Ok(bp_cases)
}

/// Quality-gated HITL loop around one LLM stage.
///
/// The stage runs, its result is persisted, and completion is announced.
/// If the stage is gated, an interrupt with the quality annotation is
/// published and the loop suspends on the inbox. Skip, empty feedback, or
/// timeout accept the current result; substantive feedback regenerates the
/// stage with the feedback folded into the prompt. After the third
/// regeneration the result stands regardless of further feedback, so no
/// further interrupt is raised.
async fn stage_loop(
    ctx: &ReviewContext,
    job: &JobRecord,
    segment: &Segment,
    stage: ReviewStage,
    results: &StageResults,
    bp_cases: &[BpCase],
) -> Result<StageOutcome> {
    ctx.inbox.reset(job.id).await;

    let gated = stage.hitl_eligible() && job.hitl_stages.contains(&stage.number());
    let opts = CompleteOptions {
        enable_sequential_thinking: job.enable_sequential_thinking,
        ..CompleteOptions::default()
    };

    let mut attempt: u32 = 0;
    let mut feedback: Option<String> = None;
    let mut previous: Option<String> = None;
    let mut feedbacks: Vec<String> = Vec::new();

    loop {
        let message = if attempt == 0 {
            stage.processing_message().to_string()
        } else {
            format!(
                "피드백 반영하여 재검토 중... ({}/{})",
                attempt, MAX_HITL_RETRIES
            )
        };
        ctx.progress
            .send(
                job.id,
                ReviewEvent::StageStatus {
                    agent: stage.agent_name().to_string(),
                    status: PhaseStatus::Processing,
                    message: Some(message),
                },
            )
            .await;

        let prompt = build_stage_prompt(
            stage,
            segment,
            bp_cases,
            results,
            feedback.as_deref(),
            previous.as_deref(),
        );
        let text = complete_with_retry(ctx.llm.as_ref(), &prompt, opts)
            .await
            .with_context(|| format!("{} stage failed", stage.agent_name()))?;

        persist_stage(ctx, job.id, stage, serde_json::Value::String(text.clone())).await?;

        ctx.progress
            .send(
                job.id,
                ReviewEvent::StageStatus {
                    agent: stage.agent_name().to_string(),
                    status: PhaseStatus::Completed,
                    message: Some(stage.completed_message().to_string()),
                },
            )
            .await;

        if !gated || attempt >= MAX_HITL_RETRIES {
            return Ok(StageOutcome { text, feedbacks });
        }

        let q = quality::assess_quality(
            ctx.llm.as_ref(),
            stage.agent_name(),
            &text,
            &segment.content,
        )
        .await;
        ctx.progress
            .send(
                job.id,
                ReviewEvent::Interrupt {
                    job_id: job.id,
                    agent: stage.agent_name().to_string(),
                    results: serde_json::json!({ stage.result_key(): text }),
                    feedback_suggestion: q.suggestion,
                    quality_issues: Some(q.issues),
                },
            )
            .await;
        ctx.store
            .update_job(
                job.id,
                JobPatch {
                    status: Some("waiting_feedback".to_string()),
                    ..JobPatch::default()
                },
            )
            .await?;

        let fb = ctx.inbox.await_feedback(job.id, FEEDBACK_TIMEOUT).await;
        let fb_text = fb.text.trim().to_string();
        if fb.skip || fb_text.is_empty() {
            return Ok(StageOutcome { text, feedbacks });
        }

        attempt += 1;
        feedbacks.push(fb_text.clone());
        feedback = Some(fb_text);
        previous = Some(text);
    }
}

fn build_stage_prompt(
    stage: ReviewStage,
    segment: &Segment,
    bp_cases: &[BpCase],
    results: &StageResults,
    feedback: Option<&str>,
    previous: Option<&str>,
) -> String {
    match stage {
        ReviewStage::ObjectiveReviewer
        | ReviewStage::DataAnalyzer
        | ReviewStage::RiskAnalyzer
        | ReviewStage::RoiEstimator => {
            prompts::stage_prompt(stage, &segment.content, bp_cases, feedback, previous)
        }
        ReviewStage::FinalGenerator => {
            prompts::final_prompt(&segment.content, results, feedback, previous)
        }
        ReviewStage::ProposalImprover => {
            prompts::improver_prompt(&segment.content, results, bp_cases, feedback, previous)
        }
        ReviewStage::BpScouter => unreachable!("retrieval stage has no prompt"),
    }
}

/// Write a stage result into `metadata.agent_results` together with the
/// stage's status label. Durability gates the next stage: the caller only
/// proceeds once this returns.
async fn persist_stage(
    ctx: &ReviewContext,
    job_id: i64,
    stage: ReviewStage,
    value: serde_json::Value,
) -> Result<()> {
    let mut agent_results = BTreeMap::new();
    agent_results.insert(stage.result_key().to_string(), value);
    ctx.store
        .update_job(
            job_id,
            JobPatch {
                status: Some(stage.status_label().to_string()),
                metadata: Some(JobMetadata {
                    agent_results,
                    ..JobMetadata::default()
                }),
                ..JobPatch::default()
            },
        )
        .await?;
    Ok(())
}

/// Primary stage calls get one in-stage retry on failure after a short
/// fixed delay; the second failure propagates.
async fn complete_with_retry(
    llm: &dyn LlmGateway,
    prompt: &str,
    opts: CompleteOptions,
) -> Result<String> {
    match llm.complete(prompt, opts).await {
        Ok(text) => Ok(text),
        Err(first) => {
            warn!("LLM call failed, retrying once: {}", first);
            tokio::time::sleep(LLM_RETRY_DELAY).await;
            llm.complete(prompt, opts).await
        }
    }
}

#[cfg(test)]
mod tests;
