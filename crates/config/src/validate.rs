//! Semantic checks on a loaded configuration.

use std::collections::HashSet;

use crate::schema::ParleyConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "bot.prefixes[1]"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: impl Into<String>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate prefix and mention settings.
pub fn validate(config: &ParleyConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let bot = &config.bot;

    let mut seen = HashSet::new();
    for (i, prefix) in bot.prefixes.iter().enumerate() {
        if prefix.is_empty() {
            result.push(
                Severity::Error,
                format!("bot.prefixes[{i}]"),
                "empty prefix would treat every message as a command",
            );
            continue;
        }
        let key = if bot.case_sensitive {
            prefix.clone()
        } else {
            prefix.to_ascii_lowercase()
        };
        if !seen.insert(key) {
            result.push(
                Severity::Warning,
                format!("bot.prefixes[{i}]"),
                format!("duplicate prefix {prefix:?} is never reached"),
            );
        }
    }

    let mention_usable = bot.mention_prefix && bot.user_id.is_some();
    if bot.mention_prefix && bot.user_id.is_none() {
        result.push(
            Severity::Warning,
            "bot.user_id",
            "mention_prefix is enabled but user_id is not set; mentions will not be recognised",
        );
    }

    if seen.is_empty() && !mention_usable {
        result.push(
            Severity::Error,
            "bot.prefixes",
            "no usable prefix configured; no message can invoke a command",
        );
    }

    result
}
