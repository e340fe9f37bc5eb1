use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::Settings;

/// Number of best-practice records requested per review.
pub const BP_RESULT_COUNT: usize = 5;

/// A retrieved best-practice exemplar, consumed verbatim as prompt context.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BpCase {
    pub title: String,
    #[serde(default)]
    pub tech_type: String,
    #[serde(default)]
    pub business_domain: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub problem_as_was: String,
    #[serde(default)]
    pub solution_to_be: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(dead_code)]
pub enum RetrievalMethod {
    #[default]
    Rrf,
    Bm25,
    Knn,
    Cc,
}

impl RetrievalMethod {
    fn endpoint(self) -> &'static str {
        match self {
            RetrievalMethod::Rrf => "retrieve-rrf",
            RetrievalMethod::Bm25 => "retrieve-bm25",
            RetrievalMethod::Knn => "retrieve-knn",
            RetrievalMethod::Cc => "retrieve-cc",
        }
    }
}

#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        method: RetrievalMethod,
    ) -> Result<Vec<BpCase>>;
}

// ── RAG HTTP request/response ──

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    index_name: &'a str,
    permission_groups: &'a [String],
    query_text: &'a str,
    num_result_doc: usize,
    fields_exclude: [&'a str; 1],
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    hits: HitsEnvelope,
}

#[derive(Deserialize, Default)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: serde_json::Value,
}

/// HTTP client for the company retrieval service.
pub struct RagGateway {
    base_url: String,
    api_key: String,
    credential_key: String,
    index_name: String,
    permission_groups: Vec<String>,
    client: Client,
}

impl RagGateway {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            base_url: settings.rag_base_url.trim_end_matches('/').to_string(),
            api_key: settings.rag_api_key.clone(),
            credential_key: settings.rag_credential_key.clone(),
            index_name: settings.rag_index_name.clone(),
            permission_groups: settings.rag_permission_groups.clone(),
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
        })
    }
}

#[async_trait]
impl RetrievalGateway for RagGateway {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        method: RetrievalMethod,
    ) -> Result<Vec<BpCase>> {
        let url = format!("{}/{}", self.base_url, method.endpoint());
        let req = RetrieveRequest {
            index_name: &self.index_name,
            permission_groups: &self.permission_groups,
            query_text: query,
            num_result_doc: k,
            fields_exclude: ["v_merge_title_content"],
        };

        let res = self
            .client
            .post(&url)
            .header("x-dep-ticket", &self.credential_key)
            .header("api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!(
                "Retrieval API error: {} - {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }

        let parsed: RetrieveResponse = res.json().await?;
        let cases: Vec<BpCase> = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| source_to_case(hit.source))
            .collect();
        info!("Retrieval returned {} best-practice records", cases.len());
        Ok(cases)
    }
}

fn source_to_case(source: serde_json::Value) -> BpCase {
    let text = |key: &str| -> String {
        source
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let content = text("content");

    BpCase {
        title: some_or(text("title"), "제목 없음"),
        tech_type: some_or(text("tech_type"), "AI/ML"),
        business_domain: some_or(text("business_domain"), &text("domain")),
        division: text("division"),
        problem_as_was: some_or(
            text("problem_as_was"),
            &content.chars().take(100).collect::<String>(),
        ),
        solution_to_be: text("solution_to_be"),
        summary: some_or(
            text("summary"),
            &content.chars().take(200).collect::<String>(),
        ),
        tips: non_empty(text("tips")),
        link: non_empty(text("link")),
    }
}

fn some_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Fixed fallback records used when retrieval is unavailable, so the
/// pipeline can proceed degraded.
pub fn stub_bp_cases(domain: &str, division: &str) -> Vec<BpCase> {
    vec![
        BpCase {
            title: format!("{domain} 분야 AI 기반 자동화 시스템 구축"),
            tech_type: "AI/ML - 자연어처리".to_string(),
            business_domain: domain.to_string(),
            division: division.to_string(),
            problem_as_was: format!(
                "{domain} 업무에서 수작업 처리로 인한 시간 소요 및 오류 발생 (하루 평균 4시간 소요)"
            ),
            solution_to_be: "AI 기반 자동 분류 및 처리 시스템 도입으로 처리 시간 80% 단축 및 정확도 95% 달성"
                .to_string(),
            summary: format!(
                "{domain} 분야에 AI 자동화를 도입하여 업무 효율성을 크게 향상시킨 사례. 6개월 내 ROI 200% 달성"
            ),
            tips: Some("초기 데이터 품질 확보가 중요. 파일럿 프로젝트로 시작하여 점진적 확대 권장".to_string()),
            link: None,
        },
        BpCase {
            title: format!("{division} {domain} 데이터 분석 플랫폼 구축"),
            tech_type: "AI/ML - 예측 분석".to_string(),
            business_domain: domain.to_string(),
            division: division.to_string(),
            problem_as_was: "분산된 데이터로 인한 의사결정 지연 및 인사이트 부족".to_string(),
            solution_to_be: "통합 데이터 분석 플랫폼 구축으로 실시간 인사이트 제공 및 예측 정확도 향상"
                .to_string(),
            summary: format!(
                "{division} 사업부의 {domain} 데이터를 통합 분석하여 의사결정 속도 3배 향상"
            ),
            tips: Some("데이터 거버넌스 체계를 먼저 수립한 후 플랫폼 구축 시작".to_string()),
            link: None,
        },
        BpCase {
            title: format!("{domain} 최적화를 위한 머신러닝 모델 적용"),
            tech_type: "AI/ML - 최적화".to_string(),
            business_domain: domain.to_string(),
            division: division.to_string(),
            problem_as_was: "경험 기반 의사결정으로 인한 최적화 한계 및 리소스 낭비".to_string(),
            solution_to_be: "ML 기반 최적화 모델로 리소스 활용률 30% 개선 및 비용 절감".to_string(),
            summary: format!("{domain} 업무 최적화를 위한 ML 모델 개발 및 적용 성공 사례"),
            tips: Some("도메인 전문가와 데이터 사이언티스트의 긴밀한 협업이 성공의 핵심".to_string()),
            link: None,
        },
    ]
}
