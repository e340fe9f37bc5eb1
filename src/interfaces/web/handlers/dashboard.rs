use axum::{
    Json,
    extract::{Path, Query, State},
};

use super::super::AppState;
use super::sanitize_hitl_stages;
use crate::core::store::types::{Decision, JobFilter, JobPatch, JobRecord, NewJob, Segment};
use crate::core::title::generate_title;

#[derive(serde::Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    /// Filter on the human verdict.
    pub decision: Option<String>,
    pub llm_decision: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct JobCreateRequest {
    pub title: Option<String>,
    pub proposal_content: String,
    pub domain: String,
    pub division: String,
    #[serde(default)]
    pub hitl_stages: Option<Vec<u8>>,
}

/// Admin edits are limited to the content fields and the human verdict;
/// `llm_decision` and `status` stay machine-owned.
#[derive(serde::Deserialize)]
pub struct JobUpdateRequest {
    pub title: Option<String>,
    pub proposal_content: Option<String>,
    pub domain: Option<String>,
    pub division: Option<String>,
    pub human_decision: Option<String>,
    pub hitl_stages: Option<Vec<u8>>,
}

fn job_summary(job: &JobRecord) -> serde_json::Value {
    let preview: String = job.proposal_content.chars().take(200).collect();
    let mut value = serde_json::json!(job);
    if let Some(map) = value.as_object_mut() {
        map.insert("proposal_preview".to_string(), serde_json::json!(preview));
    }
    value
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0);
    let filter = JobFilter {
        status: query.status.filter(|s| !s.is_empty()),
        human_decision: query.decision.as_deref().and_then(Decision::from_str),
        llm_decision: query.llm_decision.as_deref().and_then(Decision::from_str),
        search: query.search.filter(|s| !s.is_empty()),
        limit,
        offset,
        ascending: query.order.as_deref() == Some("asc"),
    };

    let jobs = match state.store.list_jobs(&filter).await {
        Ok(jobs) => jobs,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };
    let total = match state.store.count_jobs(&filter).await {
        Ok(total) => total,
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    };

    let jobs: Vec<serde_json::Value> = jobs.iter().map(job_summary).collect();
    Json(serde_json::json!({
        "success": true,
        "total": total,
        "limit": limit,
        "offset": offset,
        "jobs": jobs
    }))
}

pub async fn get_job_detail(
    Path(job_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.get_job(job_id).await {
        Ok(Some(job)) => Json(serde_json::json!({ "success": true, "job": job })),
        Ok(None) => {
            Json(serde_json::json!({ "success": false, "error": "존재하지 않는 작업입니다." }))
        }
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<JobCreateRequest>,
) -> Json<serde_json::Value> {
    if payload.proposal_content.trim().is_empty()
        || payload.domain.trim().is_empty()
        || payload.division.trim().is_empty()
    {
        return Json(serde_json::json!({
            "success": false,
            "error": "proposal_content, domain, division은 필수입니다."
        }));
    }

    let title = match payload.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => {
            let fallback = format!("{} 제안서", payload.domain);
            generate_title(state.llm.as_ref(), &payload.proposal_content, &fallback).await
        }
    };

    let new = NewJob {
        title: title.clone(),
        proposal_content: payload.proposal_content.clone(),
        domain: payload.domain,
        division: payload.division,
        hitl_stages: sanitize_hitl_stages(payload.hitl_stages.unwrap_or_default()),
        segments: vec![Segment {
            id: "1".to_string(),
            title,
            content: payload.proposal_content,
        }],
        enable_sequential_thinking: false,
        improve: false,
    };

    match state.store.create_job(new).await {
        Ok(job_id) => match state.store.get_job(job_id).await {
            Ok(Some(job)) => Json(serde_json::json!({ "success": true, "job": job })),
            Ok(None) => Json(serde_json::json!({ "success": false, "error": "Job not found" })),
            Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        },
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn update_job(
    Path(job_id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<JobUpdateRequest>,
) -> Json<serde_json::Value> {
    match state.store.get_job(job_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Json(
                serde_json::json!({ "success": false, "error": "존재하지 않는 작업입니다." }),
            );
        }
        Err(e) => return Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }

    let human_decision = match payload.human_decision.as_deref() {
        Some(raw) => match Decision::from_str(raw.trim()) {
            Some(decision) => Some(decision),
            None => {
                return Json(
                    serde_json::json!({ "success": false, "error": "잘못된 결정 값입니다." }),
                );
            }
        },
        None => None,
    };

    let patch = JobPatch {
        title: payload.title,
        proposal_content: payload.proposal_content,
        domain: payload.domain,
        division: payload.division,
        human_decision,
        hitl_stages: payload.hitl_stages.map(sanitize_hitl_stages),
        ..JobPatch::default()
    };

    if patch.is_empty() {
        return Json(
            serde_json::json!({ "success": false, "error": "업데이트할 필드가 없습니다." }),
        );
    }

    if let Err(e) = state.store.update_job(job_id, patch).await {
        return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
    }

    match state.store.get_job(job_id).await {
        Ok(Some(job)) => Json(serde_json::json!({ "success": true, "job": job })),
        Ok(None) => Json(serde_json::json!({ "success": false, "error": "Job not found" })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn delete_job(
    Path(job_id): Path<i64>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.delete_job(job_id).await {
        Ok(true) => Json(serde_json::json!({ "success": true, "job_id": job_id })),
        Ok(false) => {
            Json(serde_json::json!({ "success": false, "error": "존재하지 않는 작업입니다." }))
        }
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
