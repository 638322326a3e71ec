use std::env;

use crate::error::FeedbackError;

const DEFAULT_LABEL: &str = "system";

/// System configuration. Programmatic, or loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Name attached to every log line the system emits.
    pub label: String,
    /// Stop after this many reductions. The state stream completes once the
    /// last allowed state has been published.
    pub max_transitions: Option<u64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            max_transitions: None,
        }
    }
}

impl SystemConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_max_transitions(mut self, limit: u64) -> Self {
        self.max_transitions = Some(limit);
        self
    }

    /// Load from `FEEDBACK_SYSTEM_LABEL` and `FEEDBACK_MAX_TRANSITIONS`.
    /// Both are optional.
    pub fn from_env() -> Result<Self, FeedbackError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FeedbackError> {
        let label = lookup("FEEDBACK_SYSTEM_LABEL").unwrap_or_else(|| DEFAULT_LABEL.to_string());
        let max_transitions = match lookup("FEEDBACK_MAX_TRANSITIONS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                FeedbackError::Config(format!(
                    "FEEDBACK_MAX_TRANSITIONS must be a number, got {raw:?}"
                ))
            })?),
            None => None,
        };

        Ok(Self {
            label,
            max_transitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = SystemConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.label, "system");
        assert_eq!(config.max_transitions, None);
    }

    #[test]
    fn reads_label_and_limit() {
        let config = SystemConfig::from_lookup(lookup_from(&[
            ("FEEDBACK_SYSTEM_LABEL", "checkout"),
            ("FEEDBACK_MAX_TRANSITIONS", " 25 "),
        ]))
        .unwrap();
        assert_eq!(config.label, "checkout");
        assert_eq!(config.max_transitions, Some(25));
    }

    #[test]
    fn rejects_non_numeric_limit() {
        let err = SystemConfig::from_lookup(lookup_from(&[("FEEDBACK_MAX_TRANSITIONS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, FeedbackError::Config(_)));
        assert!(err.to_string().contains("FEEDBACK_MAX_TRANSITIONS"));
    }
}
