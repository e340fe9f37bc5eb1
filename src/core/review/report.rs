use std::fmt::Write;

use super::stages::StageResults;
use crate::core::retrieval::BpCase;
use crate::core::store::types::SegmentReport;

fn accordion_section(index: usize, title: &str, body: &str, open: bool) -> String {
    let display = if open { " style=\"display: block;\"" } else { "" };
    format!(
        "<div class=\"accordion-item\">\n\
           <div class=\"accordion-header\" onclick=\"toggleAccordion('section{index}')\">\n\
             <span>{index}. {title}</span>\n\
             <span class=\"accordion-icon\">&#9660;</span>\n\
           </div>\n\
           <div id=\"section{index}\" class=\"accordion-content\"{display}>\n\
             {body}\n\
           </div>\n\
         </div>"
    )
}

fn bp_case_card(index: usize, case: &BpCase) -> String {
    let mut card = String::new();
    let title = match &case.link {
        Some(link) => format!(
            "<a href=\"{}\" target=\"_blank\">{}</a>",
            link, case.title
        ),
        None => case.title.clone(),
    };
    let _ = write!(
        card,
        "<div class=\"bp-case\">\n\
           <h4>{index}. {title}</h4>\n\
           <p><strong>기술 유형:</strong> {tech}</p>\n\
           <p><strong>도메인:</strong> {domain} | <strong>사업부:</strong> {division}</p>\n\
           <p><strong>문제 (AS-IS):</strong> {problem}</p>\n\
           <p><strong>솔루션 (TO-BE):</strong> {solution}</p>\n\
           <p class=\"bp-summary\"><strong>핵심 요약:</strong> {summary}</p>",
        tech = case.tech_type,
        domain = case.business_domain,
        division = case.division,
        problem = case.problem_as_was,
        solution = case.solution_to_be,
        summary = case.summary,
    );
    if let Some(tips) = &case.tips {
        let _ = write!(card, "\n<p class=\"bp-tips\"><strong>팁:</strong> {}</p>", tips);
    }
    card.push_str("\n</div>");
    card
}

fn markdown_block(text: &str) -> String {
    format!("<div class=\"markdown-content\" data-markdown>{}</div>", text)
}

/// Assemble the accordion-structured review report for one segment.
pub fn build_report(bp_cases: &[BpCase], results: &StageResults) -> String {
    let bp_body = if bp_cases.is_empty() {
        "<p>검색된 사례 없음</p>".to_string()
    } else {
        let cards: Vec<String> = bp_cases
            .iter()
            .enumerate()
            .map(|(idx, case)| bp_case_card(idx + 1, case))
            .collect();
        format!(
            "<p><strong>유사 사례:</strong></p>\n{}\n<p><em>총 {}건의 유사 사례가 발견되었습니다.</em></p>",
            cards.join("\n"),
            bp_cases.len()
        )
    };

    let sections = [
        accordion_section(
            1,
            &format!("BP 사례 분석 ({}건)", bp_cases.len()),
            &bp_body,
            false,
        ),
        accordion_section(2, "목표 적합성", &markdown_block(&results.objective_review), false),
        accordion_section(3, "데이터 분석", &markdown_block(&results.data_analysis), false),
        accordion_section(4, "리스크 분석", &markdown_block(&results.risk_analysis), false),
        accordion_section(5, "ROI 추정", &markdown_block(&results.roi_estimation), false),
        accordion_section(
            6,
            "최종 의견",
            &markdown_block(&results.final_recommendation),
            true,
        ),
    ];

    format!(
        "<div class=\"review-report\">\n\
           <h2>AI 과제 지원서 검토 보고서</h2>\n\
           <hr/>\n{}\n</div>",
        sections.join("\n")
    )
}

/// Combined report for the terminal event. A single-segment job passes its
/// report through; multi-segment jobs get per-page sections in order.
pub fn aggregate_report(segment_reports: &[SegmentReport]) -> String {
    match segment_reports {
        [only] => only.report.clone(),
        many => {
            let sections: Vec<String> = many
                .iter()
                .map(|sr| {
                    format!(
                        "<div class=\"page-report\">\n<h3>{} ({})</h3>\n{}\n</div>",
                        sr.title,
                        sr.decision.as_str(),
                        sr.report
                    )
                })
                .collect();
            sections.join("\n<hr/>\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retrieval::stub_bp_cases;
    use crate::core::store::types::Decision;

    fn sample_results() -> StageResults {
        StageResults {
            objective_review: "목표가 명확함".to_string(),
            data_analysis: "데이터 확보 가능".to_string(),
            risk_analysis: "리스크 낮음".to_string(),
            roi_estimation: "ROI 양호".to_string(),
            final_recommendation: "승인 권장".to_string(),
            ..StageResults::default()
        }
    }

    #[test]
    fn report_contains_all_sections() {
        let cases = stub_bp_cases("제조", "메모리");
        let report = build_report(&cases, &sample_results());
        for needle in [
            "BP 사례 분석 (3건)",
            "목표 적합성",
            "데이터 분석",
            "리스크 분석",
            "ROI 추정",
            "최종 의견",
            "승인 권장",
        ] {
            assert!(report.contains(needle), "missing section: {}", needle);
        }
    }

    #[test]
    fn empty_bp_list_renders_placeholder() {
        let report = build_report(&[], &sample_results());
        assert!(report.contains("검색된 사례 없음"));
    }

    #[test]
    fn aggregate_joins_pages_in_order() {
        let reports = vec![
            SegmentReport {
                id: "A".to_string(),
                title: "설계".to_string(),
                report: "<div>a</div>".to_string(),
                decision: Decision::Approved,
                reason: "근거".to_string(),
            },
            SegmentReport {
                id: "B".to_string(),
                title: "검증".to_string(),
                report: "<div>b</div>".to_string(),
                decision: Decision::OnHold,
                reason: "근거".to_string(),
            },
        ];
        let combined = aggregate_report(&reports);
        let a = combined.find("설계").unwrap();
        let b = combined.find("검증").unwrap();
        assert!(a < b);

        let single = aggregate_report(&reports[..1]);
        assert_eq!(single, "<div>a</div>");
    }
}
