use thiserror::Error;

/// A policy document that could not be turned into rule-sets.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("failed to unmarshal policy: {0}")]
    Unmarshal(#[from] serde_json::Error),

    #[error("\"name\" is not present")]
    NameMissing,

    #[error("\"allow_rules\" is not present")]
    AllowRulesMissing,

    /// A problem with one rule. `section` is `deny_rules` or `allow_rules`.
    #[error("\"{section}\" {index}: {reason}")]
    InvalidRule {
        section: &'static str,
        index: usize,
        reason: String,
    },
}

/// Translated rule-sets that the decision engine refused to build.
#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error("policy {policy:?} has no rule-sets")]
    EmptyChain { policy: String },

    #[error("duplicate rule name {rule:?} in rule-set {rule_set:?}")]
    DuplicateRule { rule_set: String, rule: String },

    #[error("invalid matcher pattern {pattern:?} in rule {rule:?}: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("audit logger {0:?} is not registered")]
    UnknownAuditLogger(String),
}

/// The engine could not render a verdict for a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("missing peer information in call context")]
    MissingPeer,

    #[error("missing method name in call context")]
    MissingMethod,
}
