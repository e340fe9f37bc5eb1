use axum::{
    Json,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use tracing::info;

use super::super::AppState;
use super::sanitize_hitl_stages;
use crate::core::inbox::Feedback;
use crate::core::review::run_review_job;
use crate::core::store::types::{NewJob, Segment};
use crate::core::title::generate_title;

#[derive(serde::Deserialize)]
pub struct PageInput {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(serde::Deserialize)]
pub struct SubmitRequest {
    pub domain: String,
    pub division: String,
    #[serde(default)]
    pub hitl_stages: Vec<u8>,
    #[serde(default)]
    pub improve: bool,
    #[serde(default)]
    pub enable_sequential_thinking: bool,
    /// Plain-text submission; reviewed as one segment.
    pub text: Option<String>,
    /// Pre-parsed external pages; each is reviewed independently.
    pub pages: Option<Vec<PageInput>>,
}

#[derive(serde::Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub skip: Option<bool>,
}

pub async fn submit_proposal(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Json<serde_json::Value> {
    let mut segments: Vec<Segment> = match (&payload.pages, &payload.text) {
        (Some(pages), _) if !pages.is_empty() => pages
            .iter()
            .map(|p| Segment {
                id: p.id.clone(),
                title: p.title.clone(),
                content: p.content.clone(),
            })
            .collect(),
        (_, Some(text)) if !text.trim().is_empty() => vec![Segment {
            id: "1".to_string(),
            title: String::new(),
            content: text.trim().to_string(),
        }],
        _ => {
            return Json(serde_json::json!({
                "success": false,
                "error": "페이지 또는 텍스트를 제공해주세요"
            }));
        }
    };

    let proposal_content = segments
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let fallback = format!("{} 제안서", payload.domain);
    let title = generate_title(state.llm.as_ref(), &proposal_content, &fallback).await;
    for segment in &mut segments {
        if segment.title.is_empty() {
            segment.title = title.clone();
        }
    }

    let pages_summary: Vec<serde_json::Value> = segments
        .iter()
        .map(|s| serde_json::json!({ "id": s.id, "title": s.title }))
        .collect();
    let page_count = segments.len();

    let new = NewJob {
        title,
        proposal_content,
        domain: payload.domain,
        division: payload.division,
        hitl_stages: sanitize_hitl_stages(payload.hitl_stages),
        segments,
        enable_sequential_thinking: payload.enable_sequential_thinking,
        improve: payload.improve,
    };

    match state.store.create_job(new).await {
        Ok(job_id) => {
            info!("Job {} submitted ({} page(s))", job_id, page_count);
            let ctx = state.review_context();
            tokio::spawn(async move {
                run_review_job(ctx, job_id).await;
            });
            Json(serde_json::json!({
                "success": true,
                "job_id": job_id,
                "status": "submitted",
                "page_count": page_count,
                "pages": pages_summary
            }))
        }
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

pub async fn submit_feedback(
    Path(job_id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<FeedbackRequest>,
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

    let text = payload
        .feedback
        .unwrap_or_default()
        .trim()
        .to_string();
    let skip = payload.skip.unwrap_or(false);

    if let Err(e) = state.store.record_feedback(job_id, &text, skip).await {
        return Json(serde_json::json!({ "success": false, "error": e.to_string() }));
    }
    state.inbox.publish(job_id, Feedback { text, skip }).await;

    Json(serde_json::json!({
        "status": "feedback_received",
        "job_id": job_id,
        "skip": skip
    }))
}

/// Long-lived observer channel for one job. Server pushes review events as
/// JSON; client messages are keep-alive pings answered with a pong.
pub async fn observe_job(
    ws: WebSocketUpgrade,
    Path(job_id): Path<i64>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, job_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job_id: i64) {
    let mut rx = state.progress.attach(job_id).await;
    info!("Observer connected for job {}", job_id);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Orchestration reached a terminal event; close cleanly.
                    None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(_))) => {
                        let pong = r#"{"type":"pong"}"#.to_string();
                        if socket.send(Message::Text(pong.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.progress.detach(job_id).await;
    info!("Observer disconnected for job {}", job_id);
}
