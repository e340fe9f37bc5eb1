use regex::Regex;

/// Character budget applied to upstream stage text when embedded in a
/// prompt.
pub const PROMPT_CHAR_BUDGET: usize = 800;

/// Clip text to `limit` display characters, appending an ellipsis when
/// something was cut.
pub fn truncate_for_prompt(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= limit {
        return trimmed.to_string();
    }
    let mut clipped: String = trimmed.chars().take(limit).collect();
    clipped.push_str("...");
    clipped
}

/// Extract a JSON object from LLM output. Tries a fenced ```json block
/// first, then a direct parse, then the widest `{...}` span.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```")
            && let Ok(value) = serde_json::from_str(body[..end].trim())
        {
            return Some(value);
        }
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
        && value.is_object()
    {
        return Some(value);
    }

    let re = Regex::new(r"(?s)\{.*\}").unwrap();
    let candidate = re.find(trimmed)?;
    serde_json::from_str(candidate.as_str()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_budget() {
        let long = "가".repeat(900);
        let out = truncate_for_prompt(&long, PROMPT_CHAR_BUDGET);
        assert_eq!(out.chars().count(), PROMPT_CHAR_BUDGET + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn short_text_passes_through() {
        assert_eq!(truncate_for_prompt("  짧은 텍스트  ", 800), "짧은 텍스트");
    }

    #[test]
    fn extracts_direct_json() {
        let value = extract_json_object(r#"{"title": "수율 개선"}"#).unwrap();
        assert_eq!(value["title"], "수율 개선");
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "설명입니다.\n```json\n{\"decision\": \"승인\"}\n```\n끝.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["decision"], "승인");
    }

    #[test]
    fn extracts_embedded_object() {
        let text = "판단 결과: {\"decision\": \"보류\", \"reason\": \"근거 부족\"} 입니다.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["reason"], "근거 부족");
    }

    #[test]
    fn plain_text_yields_none() {
        assert!(extract_json_object("JSON 없음").is_none());
        assert!(extract_json_object("").is_none());
    }
}
