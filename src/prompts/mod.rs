//! Prompt templates for the LLM-backed steps.

pub mod keywords;
pub mod summary;
