// src/llm/prompts.rs
// Prompt text for the two LLM phases. Kept as constants so tests and the
// orchestrator share one source of truth.

pub const EVENTS_SYSTEM_PROMPT: &str = "You are an editor-in-chief for an international news \
briefing. Group articles into real-world events and return structured JSON only. Do not \
summarize; only identify events and assign article refs. Prioritize impact and significance; \
omit minor or low-signal items. Return roughly 5 to 10 events per run; do not try to cover \
every source.";

pub const EVENTS_USER_PROMPT: &str = r#"Given a list of articles with short IDs, group them into events.

Return JSON only with this shape:
{
  "events": [
    {
      "event_key": "short_unique_key",
      "title": "event title",
      "article_refs": ["A1B2C3", "D4E5F6"]
    }
  ]
}"#;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an editor writing a concise event brief for a \
news digest. Use only the provided articles as evidence. Return a single paragraph summary, \
factual and neutral.";

pub const SUMMARY_USER_PROMPT: &str = r#"Write a concise event summary based on the articles below.
Focus on what happened, where, and why it matters.
Avoid speculation and avoid listing sources."#;

/// The summary system prompt, optionally extended to demand a bilingual
/// two-paragraph brief (English first) when a local language is configured.
pub fn build_summary_system_prompt(local_language: Option<&str>) -> String {
    match local_language {
        Some(language) if !language.trim().is_empty() => format!(
            "{SUMMARY_SYSTEM_PROMPT} Write two paragraphs: the first in English, the second a \
             faithful translation into {}. Do not add any other text.",
            language.trim()
        ),
        _ => SUMMARY_SYSTEM_PROMPT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilingual_extension_only_when_language_set() {
        assert_eq!(build_summary_system_prompt(None), SUMMARY_SYSTEM_PROMPT);
        assert_eq!(build_summary_system_prompt(Some("  ")), SUMMARY_SYSTEM_PROMPT);
        let bilingual = build_summary_system_prompt(Some("Czech"));
        assert!(bilingual.starts_with(SUMMARY_SYSTEM_PROMPT));
        assert!(bilingual.contains("Czech"));
        assert!(bilingual.contains("first in English"));
    }
}
