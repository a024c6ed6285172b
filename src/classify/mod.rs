//! Topic-based classification of recordings into destination keys.
//!
//! Rules are data: an ordered table of patterns and the key they map to.
//! Evaluation is pure so rule tables can be checked without network access.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DESTINATION: &str = "Uploads from Zoom";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Destination key (playlist title or folder name)
    pub destination: String,
    /// Case-insensitive patterns; any one matching selects this rule
    pub patterns: Vec<String>,
}

impl ClassificationRule {
    pub fn new(destination: &str, patterns: &[&str]) -> Self {
        Self {
            destination: destination.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        let topic = topic.to_lowercase();
        let words: Vec<&str> = topic.split_whitespace().collect();
        self.patterns
            .iter()
            .any(|pattern| pattern_matches(&topic, &words, &pattern.to_lowercase()))
    }
}

/// A pattern matches as a plain substring, or word by word as prefixes of
/// consecutive topic words ("web mon" matches "website monitoring").
fn pattern_matches(topic: &str, topic_words: &[&str], pattern: &str) -> bool {
    let pattern_words: Vec<&str> = pattern.split_whitespace().collect();
    if pattern_words.is_empty() {
        return false;
    }
    if topic.contains(pattern) {
        return true;
    }
    topic_words.windows(pattern_words.len()).any(|window| {
        window
            .iter()
            .zip(&pattern_words)
            .all(|(word, prefix)| word.starts_with(prefix))
    })
}

pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "Website Monitoring",
            &["web mon", "website monitoring", "wm"],
        ),
        ClassificationRule::new("Data Together", &["data together"]),
        ClassificationRule::new("Community Calls", &["community call"]),
    ]
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
    default_destination: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules(), DEFAULT_DESTINATION)
    }
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>, default_destination: &str) -> Self {
        Self {
            rules,
            default_destination: default_destination.to_string(),
        }
    }

    /// Key of the first matching rule, or the default key.
    pub fn classify(&self, topic: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(topic))
            .map(|rule| rule.destination.as_str())
            .unwrap_or(self.default_destination.as_str())
    }

    pub fn default_destination(&self) -> &str {
        &self.default_destination
    }
}
