//! Rewrites text into something a speech engine pronounces better.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A pure text-to-text rewrite applied before synthesis.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, text: &str) -> String;
}

/// Leaves text untouched.
pub struct PassThrough;

impl Transcriber for PassThrough {
    fn transcribe(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PhoneticRule {
    #[serde(with = "serde_regex")]
    pub pattern: Regex,
    pub replacement: String,
}

impl PhoneticRule {
    fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("built-in phonetic rule must compile"),
            replacement: replacement.to_string(),
        }
    }
}

/// Applies regex rules in order, each to the output of the previous one.
#[derive(Clone, Debug)]
pub struct RuleTranscriber {
    rules: Vec<PhoneticRule>,
}

impl RuleTranscriber {
    pub fn new(rules: Vec<PhoneticRule>) -> Self {
        Self { rules }
    }

    /// Spells out symbols that engines tend to skip or read literally.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            PhoneticRule::new(r"\s*&\s*", " and "),
            PhoneticRule::new(r"(\d)\s*%", "$1 percent"),
            PhoneticRule::new(r"\s*@\s*", " at "),
            PhoneticRule::new(r"#(\d)", "number $1"),
            PhoneticRule::new(r"(\d)\s*\+\s*(\d)", "$1 plus $2"),
            PhoneticRule::new(r"(\d)\s*=\s*(\d)", "$1 equals $2"),
            PhoneticRule::new(r"[ \t]{2,}", " "),
        ])
    }

    pub fn rules(&self) -> &[PhoneticRule] {
        &self.rules
    }
}

impl Transcriber for RuleTranscriber {
    fn transcribe(&self, text: &str) -> String {
        self.rules.iter().fold(text.to_string(), |text, rule| {
            rule.pattern
                .replace_all(&text, rule.replacement.as_str())
                .into_owned()
        })
    }
}
