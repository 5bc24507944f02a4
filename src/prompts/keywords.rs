//! Prompts for turning a research description into arXiv search keywords.

/// System prompt for keyword suggestion
pub const SYSTEM_PROMPT: &str = r#"You are a research assistant who writes search queries for the arXiv paper index.

Rules you MUST follow:
- Every keyword is English and 1-3 words long.
- Prefer established technical terms over paraphrases.
- Output MUST be a JSON array of strings only (no markdown, no extra text)."#;

/// User prompt template
/// Placeholders: {count}, {description}
pub const USER_PROMPT_TEMPLATE: &str = r#"Generate {count} English search keywords for the research need below.
If {count} good keywords are hard to find, output as many useful ones as you can.

Research need:
{description}

Output example:
["keyword one", "keyword two"]"#;

/// Build the user prompt for `count` keywords
pub fn build_user_prompt(description: &str, count: u32) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{count}", &count.to_string())
        .replace("{description}", description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_user_prompt() {
        let prompt = build_user_prompt("protein structure prediction", 4);
        assert!(prompt.contains("Generate 4 English"));
        assert!(prompt.contains("protein structure prediction"));
        assert!(!prompt.contains("{count}"));
    }
}
