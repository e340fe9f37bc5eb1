use std::collections::BTreeMap;

/// The fixed pipeline of specialist review stages. Stage 7 is the optional
/// proposal rewrite pass, enabled per submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReviewStage {
    BpScouter,
    ObjectiveReviewer,
    DataAnalyzer,
    RiskAnalyzer,
    RoiEstimator,
    FinalGenerator,
    ProposalImprover,
}

impl ReviewStage {
    pub fn number(self) -> u8 {
        match self {
            ReviewStage::BpScouter => 1,
            ReviewStage::ObjectiveReviewer => 2,
            ReviewStage::DataAnalyzer => 3,
            ReviewStage::RiskAnalyzer => 4,
            ReviewStage::RoiEstimator => 5,
            ReviewStage::FinalGenerator => 6,
            ReviewStage::ProposalImprover => 7,
        }
    }

    pub fn agent_name(self) -> &'static str {
        match self {
            ReviewStage::BpScouter => "BP_Scouter",
            ReviewStage::ObjectiveReviewer => "Objective_Reviewer",
            ReviewStage::DataAnalyzer => "Data_Analyzer",
            ReviewStage::RiskAnalyzer => "Risk_Analyzer",
            ReviewStage::RoiEstimator => "ROI_Estimator",
            ReviewStage::FinalGenerator => "Final_Generator",
            ReviewStage::ProposalImprover => "Proposal_Improver",
        }
    }

    /// Key under `metadata.agent_results` and in interrupt payloads.
    pub fn result_key(self) -> &'static str {
        match self {
            ReviewStage::BpScouter => "bp_cases",
            ReviewStage::ObjectiveReviewer => "objective_review",
            ReviewStage::DataAnalyzer => "data_analysis",
            ReviewStage::RiskAnalyzer => "risk_analysis",
            ReviewStage::RoiEstimator => "roi_estimation",
            ReviewStage::FinalGenerator => "final_recommendation",
            ReviewStage::ProposalImprover => "improved_proposal",
        }
    }

    /// Advisory status label written to the job after the stage completes.
    pub fn status_label(self) -> &'static str {
        match self {
            ReviewStage::BpScouter => "bp_done",
            ReviewStage::ObjectiveReviewer => "objective_done",
            ReviewStage::DataAnalyzer => "data_done",
            ReviewStage::RiskAnalyzer => "risk_done",
            ReviewStage::RoiEstimator => "roi_done",
            ReviewStage::FinalGenerator => "final_done",
            ReviewStage::ProposalImprover => "improved",
        }
    }

    /// Progress message shown while the stage runs.
    pub fn processing_message(self) -> &'static str {
        match self {
            ReviewStage::BpScouter => "BP 사례 검색 중...",
            ReviewStage::ObjectiveReviewer => "목표 적합성 검토 중...",
            ReviewStage::DataAnalyzer => "데이터 분석 중...",
            ReviewStage::RiskAnalyzer => "리스크 분석 중...",
            ReviewStage::RoiEstimator => "ROI 추정 중...",
            ReviewStage::FinalGenerator => "최종 의견 생성 중...",
            ReviewStage::ProposalImprover => "개선된 지원서 작성 중...",
        }
    }

    pub fn completed_message(self) -> &'static str {
        match self {
            ReviewStage::BpScouter => "BP 사례 검색 완료",
            ReviewStage::ObjectiveReviewer => "목표 검토 완료",
            ReviewStage::DataAnalyzer => "데이터 분석 완료",
            ReviewStage::RiskAnalyzer => "리스크 분석 완료",
            ReviewStage::RoiEstimator => "ROI 추정 완료",
            ReviewStage::FinalGenerator => "최종 의견 생성 완료",
            ReviewStage::ProposalImprover => "개선된 지원서 작성 완료",
        }
    }

    /// Stages eligible for a HITL checkpoint. Retrieval never suspends.
    pub fn hitl_eligible(self) -> bool {
        self != ReviewStage::BpScouter
    }

    /// The LLM-backed text stages, in pipeline order, excluding the
    /// optional improver.
    pub fn text_stages() -> [ReviewStage; 4] {
        [
            ReviewStage::ObjectiveReviewer,
            ReviewStage::DataAnalyzer,
            ReviewStage::RiskAnalyzer,
            ReviewStage::RoiEstimator,
        ]
    }
}

/// Accumulated stage outputs for one segment, threaded through the
/// pipeline so every stage observes the latest upstream values.
#[derive(Debug, Clone, Default)]
pub struct StageResults {
    pub objective_review: String,
    pub data_analysis: String,
    pub risk_analysis: String,
    pub roi_estimation: String,
    pub final_recommendation: String,
    /// HITL feedback texts keyed by stage number, consumed by the final
    /// synthesis and improvement prompts.
    pub user_feedbacks: BTreeMap<u8, String>,
}

impl StageResults {
    pub fn set(&mut self, stage: ReviewStage, text: String) {
        match stage {
            ReviewStage::ObjectiveReviewer => self.objective_review = text,
            ReviewStage::DataAnalyzer => self.data_analysis = text,
            ReviewStage::RiskAnalyzer => self.risk_analysis = text,
            ReviewStage::RoiEstimator => self.roi_estimation = text,
            ReviewStage::FinalGenerator => self.final_recommendation = text,
            ReviewStage::BpScouter | ReviewStage::ProposalImprover => {}
        }
    }
}
