//! Input guardrails, evaluated before a request reaches retrieval or the model.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Outcome of a guardrail check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailResult {
    /// The input may proceed.
    Accept,
    /// The input is refused.
    Reject {
        /// Why the input was refused.
        reason: String,
    },
}

impl GuardrailResult {
    /// Creates a rejection.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: reason.into(),
        }
    }

    /// Returns true if the input was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// A synchronous check over user input.
pub trait InputGuardrail: Send + Sync {
    /// Returns the guardrail name.
    fn name(&self) -> &str;

    /// Checks a user message.
    fn validate(&self, message: &str) -> GuardrailResult;
}

/// Guardrail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Words that cause a message to be rejected, matched case-insensitively
    /// against whole words.
    pub sensitive_words: Vec<String>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            sensitive_words: vec!["kill".to_string(), "evil".to_string()],
        }
    }
}

/// Rejects messages containing any configured sensitive word.
#[derive(Debug, Clone)]
pub struct SafeInputGuardrail {
    words: HashSet<String>,
}

impl SafeInputGuardrail {
    /// Creates a guardrail over the given words.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Creates a guardrail from configuration.
    #[must_use]
    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self::new(&config.sensitive_words)
    }
}

impl Default for SafeInputGuardrail {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default())
    }
}

impl InputGuardrail for SafeInputGuardrail {
    fn name(&self) -> &str {
        "safe_input"
    }

    fn validate(&self, message: &str) -> GuardrailResult {
        let lowered = message.to_lowercase();
        let hit = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .find(|word| self.words.contains(*word));

        match hit {
            Some(word) => GuardrailResult::reject(format!("sensitive word not allowed: {word}")),
            None => GuardrailResult::Accept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_sensitive_words() {
        let guardrail = SafeInputGuardrail::default();

        let result = guardrail.validate("kill the game");
        assert_eq!(
            result,
            GuardrailResult::reject("sensitive word not allowed: kill")
        );
        assert!(!guardrail.validate("Pure EVIL!").is_accepted());
    }

    #[test]
    fn test_accepts_clean_input() {
        let guardrail = SafeInputGuardrail::default();
        assert!(guardrail.validate("How do I learn Java?").is_accepted());
        // Substrings of longer words do not match.
        assert!(guardrail.validate("skills and devilish details").is_accepted());
        assert!(guardrail.validate("").is_accepted());
    }

    #[test]
    fn test_custom_words() {
        let guardrail = SafeInputGuardrail::new(["Forbidden", "  "]);
        assert!(!guardrail.validate("this is forbidden").is_accepted());
        assert!(guardrail.validate("kill").is_accepted());
    }
}
