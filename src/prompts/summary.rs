//! Prompts for extracting innovation / method / conclusion from paper text.

/// Characters of paper text sent to the model
pub const MAX_INPUT_CHARS: usize = 8000;

/// Placeholder the model uses for a missing field
pub const NO_INFORMATION: &str = "No information";

/// System prompt for structured paper summaries
pub const SYSTEM_PROMPT: &str = r#"You are a research assistant. Read the given paper text and extract three short summaries:
- innovation: what is new in this work
- method: how the experiments or approach were carried out
- conclusion: the main findings

Rules you MUST follow:
- Use only the provided text; do not invent content.
- Keep each field under 200 characters.
- If a field cannot be determined, output "No information".
- Output MUST be a JSON object with string values only (no markdown, no extra text)."#;

/// User prompt template
/// Placeholders: {paper_text}
pub const USER_PROMPT_TEMPLATE: &str = r#"Paper text:
---
{paper_text}
---

Output strict JSON:
{"innovation": "...", "method": "...", "conclusion": "..."}"#;

/// Build the user prompt, cutting the text to [`MAX_INPUT_CHARS`].
pub fn build_user_prompt(paper_text: &str) -> String {
    let text: String = paper_text.chars().take(MAX_INPUT_CHARS).collect();
    USER_PROMPT_TEMPLATE.replace("{paper_text}", &text)
}
