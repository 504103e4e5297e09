//! Regex-based intent classification for fuzzy cache matches

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Coarse category of what a chat message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Debugging,
    Refactoring,
    Testing,
    Explanation,
    Styling,
    CodeGeneration,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Debugging => "debugging",
            Intent::Refactoring => "refactoring",
            Intent::Testing => "testing",
            Intent::Explanation => "explanation",
            Intent::Styling => "styling",
            Intent::CodeGeneration => "code_generation",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first match wins.
const PATTERNS: &[(Intent, &str)] = &[
    (
        Intent::Debugging,
        r"\b(fix|bug|error|debug|crash(es|ed)?|broken|exception|not working|fails?|failing)\b",
    ),
    (
        Intent::Refactoring,
        r"\b(refactor|clean ?up|simplify|optimi[sz]e|restructure|rename)\b",
    ),
    (Intent::Testing, r"\b(tests?|unit tests?|coverage|assert(ion)?s?)\b"),
    (
        Intent::Explanation,
        r"\b(explain|what (is|does|are)|how (does|do|is)|why)\b",
    ),
    (
        Intent::Styling,
        r"\b(css|style|styling|colou?r|layout|theme|font|responsive)\b",
    ),
    (
        Intent::CodeGeneration,
        r"\b(write|create|generate|implement|build|make|add)\b",
    ),
];

/// Maps free text to an [`Intent`] using a fixed set of patterns
pub struct IntentClassifier {
    patterns: &'static [(Intent, Regex)],
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            patterns: compiled(),
        }
    }

    /// Classify `text`, or `None` when no pattern matches
    pub fn classify(&self, text: &str) -> Option<Intent> {
        let text = text.to_lowercase();
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(&text))
            .map(|(intent, _)| *intent)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn compiled() -> &'static [(Intent, Regex)] {
    static COMPILED: OnceLock<Vec<(Intent, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(intent, pattern)| match Regex::new(pattern) {
                Ok(regex) => Some((*intent, regex)),
                Err(e) => {
                    log::warn!("Skipping invalid intent pattern for {}: {}", intent, e);
                    None
                }
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(compiled().len(), PATTERNS.len());
    }

    #[test]
    fn test_classify() {
        let classifier = IntentClassifier::new();

        assert_eq!(
            classifier.classify("Fix the error in my loop"),
            Some(Intent::Debugging)
        );
        assert_eq!(
            classifier.classify("Please refactor this function"),
            Some(Intent::Refactoring)
        );
        assert_eq!(
            classifier.classify("write unit tests for parse()"),
            Some(Intent::Testing)
        );
        assert_eq!(
            classifier.classify("What does this closure capture?"),
            Some(Intent::Explanation)
        );
        assert_eq!(
            classifier.classify("change the button color"),
            Some(Intent::Styling)
        );
        assert_eq!(
            classifier.classify("Create a todo list component"),
            Some(Intent::CodeGeneration)
        );
        assert_eq!(classifier.classify("hello there"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let classifier = IntentClassifier::new();
        // mentions both creating and a bug
        assert_eq!(
            classifier.classify("create a fix for the bug"),
            Some(Intent::Debugging)
        );
    }
}
