use tracing::warn;

use crate::core::llm::{CompleteOptions, LlmGateway};
use crate::core::text::{extract_json_object, truncate_for_prompt};

/// Maximum display length of a generated job title.
pub const TITLE_MAX_CHARS: usize = 25;

/// One-shot LLM call producing a short human title for a submission.
/// Failures fall back to the first non-empty content line, then to the
/// caller-supplied fallback; job creation is never blocked.
pub async fn generate_title(llm: &dyn LlmGateway, content: &str, fallback: &str) -> String {
    let prompt = format!(
        "당신은 제안서 제목을 만드는 전문가입니다. 아래 제안서 내용을 보고 핵심을 표현하는 \
         25자 이하의 한국어 제목을 작성하세요.\n\
         제목은 특수문자 없이 간결하게 작성하고, JSON 형식으로만 응답하세요.\n\n\
         제안서:\n{}\n\n\
         응답 형식:\n{{\"title\": \"여기에 제목\"}}",
        truncate_for_prompt(content, 600)
    );

    match llm.complete(&prompt, CompleteOptions::default()).await {
        Ok(response) => {
            if let Some(value) = extract_json_object(&response)
                && let Some(title) = value.get("title").and_then(|t| t.as_str())
            {
                let title = title.trim();
                if !title.is_empty() {
                    return clip(title);
                }
            }
            fallback_title(content, fallback)
        }
        Err(e) => {
            warn!("Title inference failed, using fallback: {}", e);
            fallback_title(content, fallback)
        }
    }
}

fn fallback_title(content: &str, fallback: &str) -> String {
    for line in content.lines() {
        let line = line.trim();
        if !line.is_empty() {
            return clip(line);
        }
    }
    clip(fallback)
}

fn clip(text: &str) -> String {
    text.chars().take(TITLE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmGateway for FixedLlm {
        async fn complete(&self, _prompt: &str, _opts: CompleteOptions) -> Result<String> {
            if self.0 == "ERR" {
                anyhow::bail!("provider down");
            }
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn title_from_llm_json() {
        let llm = FixedLlm(r#"{"title": "수율 개선 AI 과제"}"#);
        let title = generate_title(&llm, "본문", "대체 제목").await;
        assert_eq!(title, "수율 개선 AI 과제");
    }

    #[tokio::test]
    async fn title_is_clipped_to_display_length() {
        let llm = FixedLlm(r#"{"title": "아주아주아주아주아주아주아주아주 긴 제목이 생성된 경우"}"#);
        let title = generate_title(&llm, "본문", "대체 제목").await;
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[tokio::test]
    async fn empty_response_uses_first_content_line() {
        let llm = FixedLlm("");
        let title = generate_title(&llm, "\n\n공정 모니터링 제안\n상세 내용", "대체 제목").await;
        assert_eq!(title, "공정 모니터링 제안");
    }

    #[tokio::test]
    async fn llm_failure_with_blank_content_uses_fallback() {
        let llm = FixedLlm("ERR");
        let title = generate_title(&llm, "   \n  ", "제조 제안서").await;
        assert_eq!(title, "제조 제안서");
    }
}
