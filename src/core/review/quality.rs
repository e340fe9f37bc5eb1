use tracing::warn;

use super::prompts;
use crate::core::llm::{CompleteOptions, LlmGateway};
use crate::core::store::types::{Decision, FinalDecision};
use crate::core::text::extract_json_object;

/// Below this many characters a stage result is flagged by the heuristic
/// fallback.
pub const QUALITY_MIN_CHARS: usize = 200;

/// Advisory quality annotation attached to a HITL interrupt. The
/// orchestrator never auto-rejects on it; the human decides.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub issues: Vec<String>,
    pub suggestion: String,
}

/// Secondary LLM call annotating a stage result with issues and a
/// suggested feedback template. Falls back to a length heuristic when the
/// assist call or its JSON parse fails, so the pipeline keeps running.
pub async fn assess_quality(
    llm: &dyn LlmGateway,
    agent_name: &str,
    result: &str,
    proposal: &str,
) -> QualityReport {
    let prompt = prompts::quality_prompt(agent_name, result, proposal);
    match llm.complete(&prompt, CompleteOptions::default()).await {
        Ok(response) => parse_quality(&response).unwrap_or_else(|| {
            warn!("Quality gate returned unparseable output, using heuristic");
            heuristic_quality(result)
        }),
        Err(e) => {
            warn!("Quality gate call failed, using heuristic: {}", e);
            heuristic_quality(result)
        }
    }
}

fn parse_quality(response: &str) -> Option<QualityReport> {
    let value = extract_json_object(response)?;
    let issues = value
        .get("issues")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();
    let suggestion = value
        .get("suggestion")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Some(QualityReport { issues, suggestion })
}

pub fn heuristic_quality(result: &str) -> QualityReport {
    let issues = if result.trim().chars().count() >= QUALITY_MIN_CHARS {
        Vec::new()
    } else {
        vec!["분석 결과가 너무 짧습니다. 더 상세한 근거가 필요합니다.".to_string()]
    };
    QualityReport {
        issues,
        suggestion: "검토 결과를 확인하고 보완이 필요한 항목에 구체적인 수치를 포함한 피드백을 \
                     작성해주세요."
            .to_string(),
    }
}

/// Bounded LLM call classifying the final report as approved or on-hold.
/// Any failure defaults to on-hold with a canned reason.
pub async fn classify_final_decision(
    llm: &dyn LlmGateway,
    report: &str,
    recommendation: &str,
) -> FinalDecision {
    let prompt = prompts::classify_prompt(report, recommendation);
    match llm.complete(&prompt, CompleteOptions::default()).await {
        Ok(response) => parse_decision(&response).unwrap_or_else(default_decision),
        Err(e) => {
            warn!("Final decision classification failed, defaulting: {}", e);
            default_decision()
        }
    }
}

fn default_decision() -> FinalDecision {
    FinalDecision {
        decision: Decision::OnHold,
        reason: "자동 판정 실패".to_string(),
    }
}

fn parse_decision(response: &str) -> Option<FinalDecision> {
    let value = extract_json_object(response)?;
    let raw = value.get("decision")?.as_str()?;
    let decision = match raw.trim() {
        "승인" | "approved" => Decision::Approved,
        "보류" | "on-hold" | "hold" => Decision::OnHold,
        _ => return None,
    };
    let reason = value
        .get("reason")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("LLM 판단을 기준으로 자동 분류되었습니다.")
        .to_string();
    Some(FinalDecision { decision, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_flags_short_results() {
        let report = heuristic_quality("짧음");
        assert_eq!(report.issues.len(), 1);

        let long = "분석".repeat(200);
        let report = heuristic_quality(&long);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn decision_parses_korean_labels() {
        let parsed =
            parse_decision(r#"{"decision": "승인", "reason": "ROI가 명확함"}"#).unwrap();
        assert_eq!(parsed.decision, Decision::Approved);
        assert_eq!(parsed.reason, "ROI가 명확함");

        let parsed = parse_decision(r#"{"decision": "보류"}"#).unwrap();
        assert_eq!(parsed.decision, Decision::OnHold);
    }

    #[test]
    fn decision_parse_failure_yields_none() {
        assert!(parse_decision("판단 불가").is_none());
        assert!(parse_decision(r#"{"decision": "미정"}"#).is_none());
    }

    #[test]
    fn quality_parses_strict_json() {
        let parsed = parse_quality(
            r#"{"issues": ["근거 부족", "수치 없음"], "suggestion": "예산은 [3]억 원입니다"}"#,
        )
        .unwrap();
        assert_eq!(parsed.issues.len(), 2);
        assert!(parsed.suggestion.contains("[3]억"));
    }
}
