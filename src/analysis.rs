//! Structured summaries of paper text.
//!
//! The LLM is asked for `innovation`, `method` and `conclusion`. Fields it
//! leaves empty, and the whole summary when no model is available, come
//! from a keyword-scored paragraph heuristic.

use crate::llm::{extract_json_object, LlmClient};
use crate::prompts::summary::{build_user_prompt, NO_INFORMATION, SYSTEM_PROMPT};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

const ELLIPSIS: char = '…';

/// Cap applied to joined sentences before the field limit
const SENTENCE_CHAR_CAP: usize = 240;

/// Text used when a PDF yielded nothing
pub const EMPTY_TEXT_MESSAGE: &str = "Could not extract text from the PDF.";

struct SectionPattern {
    keywords: &'static [&'static str],
    max_sentences: usize,
}

const INNOVATION: SectionPattern = SectionPattern {
    keywords: &["innovation", "novel", "contribution", "breakthrough"],
    max_sentences: 2,
};

const METHOD: SectionPattern = SectionPattern {
    keywords: &["method", "approach", "architecture", "experiment"],
    max_sentences: 2,
};

const CONCLUSION: SectionPattern = SectionPattern {
    keywords: &["conclusion", "result", "finding", "future"],
    max_sentences: 2,
};

/// Parsed summary fields for one paper
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperSummary {
    pub innovation: String,
    pub method: String,
    pub conclusion: String,
    pub summary: String,
}

impl PaperSummary {
    fn empty_text() -> Self {
        Self {
            innovation: EMPTY_TEXT_MESSAGE.to_string(),
            ..Default::default()
        }
    }

    /// Apply `limit` to every field.
    pub fn limited(self, limit: usize) -> Self {
        Self {
            innovation: truncate(&self.innovation, limit),
            method: truncate(&self.method, limit),
            conclusion: truncate(&self.conclusion, limit),
            summary: truncate(&self.summary, limit),
        }
    }
}

/// Trim and cut to at most `limit` characters, ending in an ellipsis when cut.
pub fn truncate(value: &str, limit: usize) -> String {
    let value = value.trim();
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let head: String = value.chars().take(limit.saturating_sub(1)).collect();
    let mut cut = head.trim_end().to_string();
    cut.push(ELLIPSIS);
    cut
}

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").unwrap_or_else(|_| unreachable!("static pattern")))
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    paragraph_break()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// First paragraph with the highest keyword hit count; stops early at two hits.
fn find_paragraph<'a>(paragraphs: &[&'a str], keywords: &[&str]) -> &'a str {
    let mut best = "";
    let mut best_score = 0;
    for paragraph in paragraphs {
        let lowered = paragraph.to_lowercase();
        let score = keywords.iter().filter(|k| lowered.contains(*k)).count();
        if score > best_score {
            best = paragraph;
            best_score = score;
            if score >= 2 {
                break;
            }
        }
    }
    best
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Split after sentence punctuation that is followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if is_sentence_end(c) && chars.peek().is_some_and(|n| n.is_whitespace()) {
            sentences.push(std::mem::take(&mut current));
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
        }
    }
    sentences.push(current);
    sentences
        .into_iter()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

fn take_sentences(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let combined = split_sentences(text).into_iter().take(limit).collect::<Vec<_>>().join(" ");
    truncate(&combined, SENTENCE_CHAR_CAP)
}

/// Summary built without a model.
pub fn heuristic_summary(text: &str, field_limit: usize) -> PaperSummary {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return PaperSummary::empty_text();
    }

    let mut paragraphs = split_paragraphs(cleaned);
    if paragraphs.is_empty() {
        paragraphs.push(cleaned);
    }
    let lead = take_sentences(paragraphs[0], 2);

    let section = |pattern: &SectionPattern| {
        let paragraph = find_paragraph(&paragraphs, pattern.keywords);
        let source = if paragraph.is_empty() { lead.as_str() } else { paragraph };
        truncate(&take_sentences(source, pattern.max_sentences), field_limit)
    };

    PaperSummary {
        innovation: section(&INNOVATION),
        method: section(&METHOD),
        conclusion: section(&CONCLUSION),
        summary: truncate(&lead, field_limit),
    }
}

/// Read a string field from the model's JSON, case-insensitively.
fn json_field(fields: &serde_json::Map<String, serde_json::Value>, name: &str) -> String {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| match v {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
        .unwrap_or_default()
}

/// Summary from LLM output, or `None` when the output is not a JSON object.
fn summary_from_llm_output(content: &str, text: &str, field_limit: usize) -> Option<PaperSummary> {
    let value: serde_json::Value = serde_json::from_str(&extract_json_object(content)).ok()?;
    let fields = value.as_object()?;

    let paragraphs = split_paragraphs(text);
    let field = |name: &str, pattern: &SectionPattern| {
        let value = truncate(&json_field(fields, name), field_limit);
        if !value.is_empty() {
            return value;
        }
        let fallback = truncate(
            &take_sentences(find_paragraph(&paragraphs, pattern.keywords), pattern.max_sentences),
            field_limit,
        );
        if fallback.is_empty() {
            NO_INFORMATION.to_string()
        } else {
            fallback
        }
    };

    let innovation = field("innovation", &INNOVATION);
    let method = field("method", &METHOD);
    let conclusion = field("conclusion", &CONCLUSION);
    let summary = [&conclusion, &method, &innovation]
        .into_iter()
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_default();

    Some(PaperSummary {
        innovation,
        method,
        conclusion,
        summary,
    })
}

/// Summarise paper text with the LLM when available, else heuristically.
pub async fn analyze_paper(llm: Option<&LlmClient>, text: &str, field_limit: usize) -> PaperSummary {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return PaperSummary::empty_text();
    }
    let Some(llm) = llm else {
        return heuristic_summary(cleaned, field_limit);
    };

    match llm.complete(SYSTEM_PROMPT, &build_user_prompt(cleaned)).await {
        Ok(content) => summary_from_llm_output(&content, cleaned, field_limit).unwrap_or_else(|| {
            warn!("LLM returned unstructured summary, using heuristic");
            heuristic_summary(cleaned, field_limit)
        }),
        Err(e) => {
            warn!(error = %e, "LLM summary failed, using heuristic");
            heuristic_summary(cleaned, field_limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = "We study sparse attention. It scales well.\n\n\
        Our main contribution is a novel routing layer. It is cheap.\n\n\
        The method uses an encoder architecture. We run each experiment twice.\n\n\
        In conclusion, the results show a 2x speedup. Future work remains.";

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  short  ", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
        assert_eq!(truncate("abc  defgh", 6), "abc…");
        assert_eq!(truncate("创新点很多很多", 4).chars().count(), 4);
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("One. Two!  Three?\nFour。 五");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four。", "五"]);
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
    }

    #[test]
    fn test_heuristic_summary_sections() {
        let summary = heuristic_summary(PAPER, 200);
        assert!(summary.innovation.contains("novel routing layer"));
        assert!(summary.method.contains("encoder architecture"));
        assert!(summary.conclusion.contains("2x speedup"));
        assert_eq!(summary.summary, "We study sparse attention. It scales well.");
    }

    #[test]
    fn test_heuristic_summary_limits_fields() {
        let summary = heuristic_summary(PAPER, 20);
        for field in [&summary.innovation, &summary.method, &summary.conclusion, &summary.summary] {
            assert!(field.chars().count() <= 20, "{field}");
        }
    }

    #[test]
    fn test_heuristic_summary_empty_text() {
        let summary = heuristic_summary("   ", 50);
        assert_eq!(summary.innovation, EMPTY_TEXT_MESSAGE);
        assert!(summary.method.is_empty());
    }

    #[test]
    fn test_summary_from_llm_output_fills_gaps() {
        let content = r#"```json
{"Innovation": "Routing layer", "method": "", "conclusion": "Faster"}
```"#;
        let summary = summary_from_llm_output(content, PAPER, 200).unwrap();
        assert_eq!(summary.innovation, "Routing layer");
        assert!(summary.method.contains("encoder architecture"));
        assert_eq!(summary.summary, "Faster");

        assert!(summary_from_llm_output("[1, 2]", PAPER, 200).is_none());
        assert!(summary_from_llm_output("nothing", PAPER, 200).is_none());
    }

    #[tokio::test]
    async fn test_analyze_without_llm() {
        let summary = analyze_paper(None, PAPER, 50).await;
        assert!(!summary.conclusion.is_empty());
        assert_eq!(analyze_paper(None, "", 50).await.innovation, EMPTY_TEXT_MESSAGE);
    }
}
