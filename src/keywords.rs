//! Search keyword suggestion.
//!
//! Asks the LLM for a JSON array of keywords; without a client, or when the
//! call or its output is unusable, falls back to picking distinct tokens
//! out of the description.

use crate::llm::{extract_json_array, LlmClient};
use crate::prompts::keywords::{build_user_prompt, SYSTEM_PROMPT};
use tracing::{debug, warn};

/// Tokens shorter than this are ignored by the heuristic
const MIN_TOKEN_LEN: usize = 3;

/// Suggest up to `count` search keywords for `description`.
pub async fn suggest_keywords(llm: Option<&LlmClient>, description: &str, count: u32) -> Vec<String> {
    let description = description.trim();
    if description.is_empty() {
        return Vec::new();
    }
    let count = count.max(1);

    let Some(llm) = llm else {
        return heuristic_keywords(description, count);
    };

    match llm.complete(SYSTEM_PROMPT, &build_user_prompt(description, count)).await {
        Ok(content) => match parse_keyword_list(&content, count) {
            Some(keywords) => {
                debug!(model = llm.model(), count = keywords.len(), "LLM keywords generated");
                keywords
            }
            None => {
                let preview: String = content.chars().take(200).collect();
                warn!(content_preview = %preview, "Unusable keyword output, using heuristic");
                heuristic_keywords(description, count)
            }
        },
        Err(e) => {
            warn!(error = %e, "Keyword generation failed, using heuristic");
            heuristic_keywords(description, count)
        }
    }
}

/// Parse the model's JSON array. Non-string items are skipped and
/// duplicates are removed case-insensitively.
fn parse_keyword_list(content: &str, limit: u32) -> Option<Vec<String>> {
    let items: Vec<serde_json::Value> = serde_json::from_str(&extract_json_array(content)).ok()?;

    let mut keywords: Vec<String> = Vec::new();
    for token in items.iter().filter_map(|v| v.as_str()).map(str::trim) {
        if token.is_empty() || keywords.iter().any(|k| k.eq_ignore_ascii_case(token)) {
            continue;
        }
        keywords.push(token.to_string());
        if keywords.len() >= limit as usize {
            break;
        }
    }
    (!keywords.is_empty()).then_some(keywords)
}

/// Distinct lowercase alphanumeric tokens of the description, in order.
pub fn heuristic_keywords(description: &str, limit: u32) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let tokens = description
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '+' || c == '#'))
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN);

    for token in tokens {
        if !keywords.contains(&token) {
            keywords.push(token);
        }
        if keywords.len() >= limit as usize {
            break;
        }
    }
    keywords
}
