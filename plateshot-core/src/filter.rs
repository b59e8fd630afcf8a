//! Prompt content filtering.
//!
//! Image services moderate prompts aggressively, and plenty of ordinary
//! culinary vocabulary trips their filters. This module rewrites those terms
//! to harmless equivalents and rejects prompts that are not salvageable.
//! Filtering is the last gate before the prompt reaches the service, so a
//! rejection here means no remote cost was incurred.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Terms rewritten for a food-photography context. Tuned permissive: these
/// show up in real recipe titles ("chicken breast", "pork butt") and only
/// need a synonym the service won't object to.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("breast", "fillet"),
    ("breasts", "fillets"),
    ("thigh", "cut"),
    ("thighs", "cuts"),
    ("butt", "shoulder roast"),
    ("blood", "deep crimson"),
    ("bloody", "deep crimson"),
    ("shot", "photograph"),
    ("shots", "photographs"),
    ("naked", "unadorned"),
];

/// Terms that cause outright rejection regardless of context.
const BLOCKED: &[&str] = &["gore", "gory", "nsfw", "nude", "explicit", "corpse"];

/// A single substitution applied by the filter, persisted on the job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChange {
    pub from: String,
    pub to: String,
}

/// Result of filtering a prompt.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// The prompt is safe to submit. `changes` may be empty.
    Passed {
        filtered: String,
        changes: Vec<FilterChange>,
    },
    /// The prompt must not be submitted.
    Rejected { reason: String },
}

fn word_pattern(term: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))).expect("static filter pattern")
}

fn blocked_patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        BLOCKED
            .iter()
            .map(|term| (word_pattern(term), *term))
            .collect()
    })
}

fn substitution_patterns() -> &'static Vec<(Regex, &'static str, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SUBSTITUTIONS
            .iter()
            .map(|(from, to)| (word_pattern(from), *from, *to))
            .collect()
    })
}

/// Apply the prohibited-terms policy to a prompt.
pub fn filter_prompt(prompt: &str) -> FilterOutcome {
    for (pattern, term) in blocked_patterns() {
        if pattern.is_match(prompt) {
            return FilterOutcome::Rejected {
                reason: format!("Prompt contains prohibited term \"{}\"", term),
            };
        }
    }

    let mut filtered = prompt.to_string();
    let mut changes = Vec::new();

    for (pattern, from, to) in substitution_patterns() {
        if pattern.is_match(&filtered) {
            filtered = pattern.replace_all(&filtered, *to).into_owned();
            changes.push(FilterChange {
                from: (*from).to_string(),
                to: (*to).to_string(),
            });
        }
    }

    if !changes.is_empty() {
        tracing::debug!(substitutions = changes.len(), "filtered prompt terms");
    }

    FilterOutcome::Passed { filtered, changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_passed(outcome: FilterOutcome) -> (String, Vec<FilterChange>) {
        match outcome {
            FilterOutcome::Passed { filtered, changes } => (filtered, changes),
            FilterOutcome::Rejected { reason } => panic!("unexpected rejection: {}", reason),
        }
    }

    #[test]
    fn test_clean_prompt_passes_unchanged() {
        let (filtered, changes) = expect_passed(filter_prompt("A rustic bowl of tomato soup"));
        assert_eq!(filtered, "A rustic bowl of tomato soup");
        assert!(changes.is_empty());
    }

    #[test]
    fn test_substitution_recorded() {
        let (filtered, changes) = expect_passed(filter_prompt("Grilled chicken breast with herbs"));
        assert_eq!(filtered, "Grilled chicken fillet with herbs");
        assert_eq!(
            changes,
            vec![FilterChange {
                from: "breast".to_string(),
                to: "fillet".to_string(),
            }]
        );
    }

    #[test]
    fn test_substitution_is_case_insensitive() {
        let (filtered, _) = expect_passed(filter_prompt("BLOOD orange salad"));
        assert_eq!(filtered, "deep crimson orange salad");
    }

    #[test]
    fn test_word_boundaries_respected() {
        // "buttered" must not match the "butt" rule.
        let (filtered, changes) = expect_passed(filter_prompt("buttered toast with jam"));
        assert_eq!(filtered, "buttered toast with jam");
        assert!(changes.is_empty());
    }

    #[test]
    fn test_blocked_term_rejects() {
        match filter_prompt("some nsfw content") {
            FilterOutcome::Rejected { reason } => assert!(reason.contains("nsfw")),
            FilterOutcome::Passed { .. } => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_multiple_substitutions() {
        let (filtered, changes) =
            expect_passed(filter_prompt("chicken thighs and a blood orange"));
        assert_eq!(filtered, "chicken cuts and a deep crimson orange");
        assert_eq!(changes.len(), 2);
    }
}
