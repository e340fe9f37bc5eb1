pub mod dashboard;
pub mod review;

/// Keep only valid HITL stage numbers (stages 2..=7 may gate).
pub(crate) fn sanitize_hitl_stages(stages: Vec<u8>) -> Vec<u8> {
    let mut out: Vec<u8> = stages.into_iter().filter(|s| (2..=7).contains(s)).collect();
    out.sort_unstable();
    out.dedup();
    out
}
