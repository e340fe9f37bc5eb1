use std::collections::BTreeMap;
use std::fmt::Write;

use super::stages::{ReviewStage, StageResults};
use crate::core::retrieval::BpCase;
use crate::core::text::{PROMPT_CHAR_BUDGET, truncate_for_prompt};

/// Budget for the proposal body itself; upstream stage outputs use the
/// tighter `PROMPT_CHAR_BUDGET`.
pub const PROPOSAL_CHAR_BUDGET: usize = 2000;

/// Compact serialization of BP records for prompt context.
pub fn bp_block(cases: &[BpCase]) -> String {
    if cases.is_empty() {
        return "유사 사례 없음".to_string();
    }
    let mut out = String::new();
    for (idx, case) in cases.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({}) | 문제: {} | 해결: {} | 요약: {}",
            idx + 1,
            case.title,
            case.tech_type,
            truncate_for_prompt(&case.problem_as_was, 120),
            truncate_for_prompt(&case.solution_to_be, 120),
            truncate_for_prompt(&case.summary, 160),
        );
    }
    out
}

fn feedback_section(feedback: Option<&str>, previous: Option<&str>) -> String {
    let Some(feedback) = feedback else {
        return String::new();
    };
    let mut section = String::new();
    if let Some(previous) = previous {
        let _ = write!(
            section,
            "\n이전 분석 결과:\n{}\n",
            truncate_for_prompt(previous, PROMPT_CHAR_BUDGET)
        );
    }
    let _ = write!(
        section,
        "\n**사용자 피드백 (필수 반영):**\n{}\n\n\
         **중요:** 위 사용자 피드백의 모든 내용을 분석 결과에 구체적으로 반영해주세요.\n\
         특히 예산, 인력, 기간, 기술 역량 등 구체적인 정보가 있다면 명시적으로 포함해주세요.",
        feedback
    );
    section
}

/// Prompt for the four assessment stages (objective, data, risk, ROI).
/// When `feedback` is set this is a HITL regeneration and the previous
/// attempt plus the feedback are appended.
pub fn stage_prompt(
    stage: ReviewStage,
    proposal: &str,
    bp_cases: &[BpCase],
    feedback: Option<&str>,
    previous: Option<&str>,
) -> String {
    let proposal = truncate_for_prompt(proposal, PROPOSAL_CHAR_BUDGET);
    let bp = bp_block(bp_cases);
    let extra = feedback_section(feedback, previous);

    match stage {
        ReviewStage::ObjectiveReviewer => format!(
            "당신은 기업의 AI 과제 제안서를 검토하는 전문가입니다.\n\
             다음 제안서의 목표 적합성을 검토하고 평가해주세요:\n\n\
             제안서 내용:\n{proposal}\n\n\
             참고 BP 사례:\n{bp}\n\
             다음 항목을 평가하고 짧게 요약해주세요:\n\
             1. 목표의 명확성\n\
             2. 조직 전략과의 정렬성\n\
             3. 실현 가능성\n\n\
             간결하게 2-3문장으로 평가 결과를 작성해주세요.{extra}"
        ),
        ReviewStage::DataAnalyzer => format!(
            "당신은 AI 프로젝트의 데이터 분석 전문가입니다.\n\
             다음 제안서에 대한 데이터 분석을 수행해주세요:\n\n\
             제안서 내용:\n{proposal}\n\n\
             참고 BP 사례:\n{bp}\n\
             다음 항목을 평가하고 짧게 요약해주세요:\n\
             1. 데이터 확보 가능성\n\
             2. 데이터 품질 예상\n\
             3. 데이터 접근성\n\n\
             간결하게 2-3문장으로 평가 결과를 작성해주세요.{extra}"
        ),
        ReviewStage::RiskAnalyzer => format!(
            "당신은 AI 프로젝트의 리스크 분석 전문가입니다.\n\
             다음 제안서에 대한 리스크 분석을 수행해주세요:\n\n\
             제안서 내용:\n{proposal}\n\n\
             참고 BP 사례:\n{bp}\n\
             다음 리스크를 평가하고 각각 짧게 요약해주세요:\n\
             1. 기술적 리스크\n\
             2. 일정 리스크\n\
             3. 인력 리스크\n\n\
             각 항목마다 1-2문장으로 평가 결과를 작성해주세요.{extra}"
        ),
        ReviewStage::RoiEstimator => format!(
            "당신은 AI 프로젝트의 ROI(투자 수익률) 분석 전문가입니다.\n\
             다음 제안서에 대한 ROI를 추정해주세요:\n\n\
             제안서 내용:\n{proposal}\n\n\
             참고 BP 사례:\n{bp}\n\
             다음 항목을 평가하고 짧게 요약해주세요:\n\
             1. 예상 효과 (비용 절감, 생산성 향상 등)\n\
             2. 투자 대비 효과 (ROI 퍼센티지, 손익분기점)\n\n\
             간결하게 2-3문장으로 평가 결과를 작성해주세요.{extra}"
        ),
        _ => unreachable!("stage_prompt covers assessment stages only"),
    }
}

fn user_feedbacks_block(user_feedbacks: &BTreeMap<u8, String>) -> String {
    if user_feedbacks.is_empty() {
        return String::new();
    }
    let stage_names: BTreeMap<u8, &str> = BTreeMap::from([
        (2u8, "목표 검토"),
        (3u8, "데이터 분석"),
        (4u8, "리스크 분석"),
        (5u8, "ROI 추정"),
        (6u8, "최종 의견"),
    ]);
    let mut lines = String::new();
    for (stage, feedback) in user_feedbacks {
        if feedback.is_empty() {
            continue;
        }
        let name = stage_names.get(stage).copied().unwrap_or("검토");
        let _ = writeln!(lines, "- {}: {}", name, feedback);
    }
    if lines.is_empty() {
        return String::new();
    }
    format!(
        "\n\n**사용자가 제공한 중요 정보 (필수 반영):**\n{lines}\n\
         **중요:** 위 사용자 피드백의 모든 내용을 최종 의견에 구체적으로 반영해주세요.\n\
         특히 예산, 인력, 기간, 기술 역량 등 구체적인 정보가 있다면 명시적으로 포함해주세요."
    )
}

/// Prompt for the final synthesis stage.
pub fn final_prompt(
    proposal: &str,
    results: &StageResults,
    feedback: Option<&str>,
    previous: Option<&str>,
) -> String {
    let proposal = truncate_for_prompt(proposal, PROPOSAL_CHAR_BUDGET);
    let feedbacks = user_feedbacks_block(&results.user_feedbacks);
    let extra = feedback_section(feedback, previous);

    format!(
        "당신은 AI 프로젝트 검토 전문가입니다.\n\
         다음 제안서와 분석 결과를 바탕으로 최종 의견을 작성해주세요:\n\n\
         제안서 내용:\n{proposal}\n\n\
         목표 검토:\n{objective}\n\n\
         데이터 분석:\n{data}\n\n\
         리스크 분석:\n{risk}\n\n\
         ROI 추정:\n{roi}{feedbacks}\n\n\
         다음을 포함한 최종 의견을 작성해주세요:\n\
         1. 승인 또는 보류 권장 (명확하게)\n\
         2. 주요 근거 (3-4가지)\n\
         3. 권장사항 (2-3가지)\n\n\
         간결하게 5-7문장으로 작성해주세요.{extra}",
        objective = truncate_for_prompt(&results.objective_review, PROMPT_CHAR_BUDGET),
        data = truncate_for_prompt(&results.data_analysis, PROMPT_CHAR_BUDGET),
        risk = truncate_for_prompt(&results.risk_analysis, PROMPT_CHAR_BUDGET),
        roi = truncate_for_prompt(&results.roi_estimation, PROMPT_CHAR_BUDGET),
    )
}

/// Prompt for the optional proposal rewrite pass.
pub fn improver_prompt(
    proposal: &str,
    results: &StageResults,
    bp_cases: &[BpCase],
    feedback: Option<&str>,
    previous: Option<&str>,
) -> String {
    let proposal = truncate_for_prompt(proposal, PROPOSAL_CHAR_BUDGET);
    let feedbacks = user_feedbacks_block(&results.user_feedbacks);
    let extra = feedback_section(feedback, previous);

    format!(
        "당신은 AI 과제 지원서 작성 전문가입니다.\n\
         다음 원본 지원서와 검토 결과를 바탕으로 개선된 지원서를 작성해주세요.\n\n\
         **원본 지원서:**\n{proposal}\n\n\
         **검토 결과:**\n\n\
         1. 목표 적합성 검토:\n{objective}\n\n\
         2. 데이터 분석:\n{data}\n\n\
         3. 리스크 분석:\n{risk}\n\n\
         4. ROI 추정:\n{roi}\n\n\
         5. 최종 의견:\n{final_rec}\n\n\
         참고 가능한 유사 사례:\n{bp}{feedbacks}\n\n\
         검토에서 지적된 약점을 보완하고, 목표/데이터/리스크/ROI 각 영역이 구체적인 수치와 함께 \
         기술된 개선된 지원서 전문을 작성해주세요.{extra}",
        objective = truncate_for_prompt(&results.objective_review, PROMPT_CHAR_BUDGET),
        data = truncate_for_prompt(&results.data_analysis, PROMPT_CHAR_BUDGET),
        risk = truncate_for_prompt(&results.risk_analysis, PROMPT_CHAR_BUDGET),
        roi = truncate_for_prompt(&results.roi_estimation, PROMPT_CHAR_BUDGET),
        final_rec = truncate_for_prompt(&results.final_recommendation, PROMPT_CHAR_BUDGET),
        bp = bp_block(&bp_cases[..bp_cases.len().min(3)]),
    )
}

/// Prompt for the advisory quality gate. The model must answer with a
/// small strict-JSON object.
pub fn quality_prompt(agent_name: &str, result: &str, proposal: &str) -> String {
    format!(
        "당신은 AI 검토 프로세스의 품질 관리자입니다.\n\
         {agent_name}가 다음과 같은 분석 결과를 제출했습니다.\n\n\
         제안서 내용:\n{proposal}\n\n\
         {agent_name}의 분석 결과:\n{result}\n\n\
         위 분석 결과가 충분히 상세하고 구체적인지 평가하고, 제안서 작성자가 그대로 복사해 \
         수정할 수 있는 구체적인 피드백 예시를 작성해주세요. 피드백 예시에는 예산, 기간, \
         목표치 등 []로 감싼 수정 가능한 수치를 포함하세요.\n\n\
         반드시 다음 JSON 형식으로만 응답하세요 (설명 없이 JSON만):\n\
         {{\"issues\": [\"발견된 문제점\"], \"suggestion\": \"피드백 예시 전문\"}}\n\n\
         문제가 없으면 issues는 빈 배열로 응답하세요.",
        proposal = truncate_for_prompt(proposal, 500),
        result = truncate_for_prompt(result, PROMPT_CHAR_BUDGET),
    )
}

/// Prompt for the bounded approve/hold classification call.
pub fn classify_prompt(report: &str, recommendation: &str) -> String {
    format!(
        "당신은 AI 프로젝트 심사위원입니다. 최종 보고서와 최종 의견을 읽고 과제를 '승인' 또는 \
         '보류' 중 하나로 판단하세요.\n\
         결정 기준: 실행 가능성, 기대 효과, 리스크 수준, ROI 등을 종합적으로 고려합니다.\n\
         출력은 JSON 형식으로만 답변하며, 가능한 값은 \"승인\" 또는 \"보류\"입니다.\n\n\
         최종 보고서:\n{report}\n\n\
         최종 의견:\n{recommendation}\n\n\
         응답 형식 예시:\n{{\"decision\": \"승인\", \"reason\": \"핵심 근거\"}}",
        report = truncate_for_prompt(report, 1200),
        recommendation = truncate_for_prompt(recommendation, PROMPT_CHAR_BUDGET),
    )
}
