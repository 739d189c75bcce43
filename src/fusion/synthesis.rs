//! Merge step of a fusion.
//!
//! The coordinator hands every strategy the participants' answers already in
//! request order with placeholders filled in, so a strategy only decides how
//! to phrase the combination. Strategies must be deterministic.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static WHY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwhy\b").expect("valid regex"));
static HOW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bhow\b").expect("valid regex"));
static WHAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwhat\b").expect("valid regex"));

pub struct SynthesisInput<'a> {
    pub query: &'a str,
    pub context: &'a Value,
    /// `(agent, answer)` pairs in participant order
    pub answers: &'a [(String, String)],
}

pub trait SynthesisStrategy: Send + Sync {
    fn synthesize(&self, input: &SynthesisInput<'_>) -> String;
}

/// Concatenates the answers, adds a closing line picked from the question
/// word of the query, and signs with the participant list.
#[derive(Debug, Default, Clone)]
pub struct KeywordSynthesis;

impl KeywordSynthesis {
    fn closing_line(query: &str) -> &'static str {
        if WHY.is_match(query) {
            "Taken together, these perspectives explain the reasons behind the question."
        } else if HOW.is_match(query) {
            "Taken together, these perspectives outline a way forward."
        } else if WHAT.is_match(query) {
            "Taken together, these perspectives describe what is at stake."
        } else {
            "Taken together, these perspectives form a single answer."
        }
    }
}

impl SynthesisStrategy for KeywordSynthesis {
    fn synthesize(&self, input: &SynthesisInput<'_>) -> String {
        let mut combined = String::new();

        for (agent, answer) in input.answers {
            combined.push_str(&format!("[{agent}]: {}\n", answer.trim()));
        }

        combined.push('\n');
        combined.push_str(Self::closing_line(input.query));
        combined.push('\n');

        let signature: Vec<&str> = input.answers.iter().map(|(agent, _)| agent.as_str()).collect();
        combined.push_str(&format!("Fused from: {}", signature.join(" + ")));
        combined
    }
}
