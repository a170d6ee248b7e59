use serde::{Deserialize, Serialize};

/// Top-level authorization policy document, as stored in the policy file.
///
/// Unknown fields are rejected so that a typo never silently widens access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationPolicy {
    /// Policy name; required.
    #[serde(default)]
    pub name: String,
    /// Rules that deny a call when any of them matches. Evaluated first.
    #[serde(default)]
    pub deny_rules: Vec<Rule>,
    /// Rules of which at least one must match for a call to be permitted.
    #[serde(default)]
    pub allow_rules: Vec<Rule>,
    /// Which decisions are emitted to audit loggers, and where.
    #[serde(default)]
    pub audit_logging_options: AuditLoggingOptions,
}

/// A single named rule. A rule matches when both its `source` and its
/// `request` match (AND logic). Empty sections match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub request: Request,
}

/// Who is calling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    /// Authenticated principal names; any one must match.
    #[serde(default)]
    pub principals: Vec<String>,
}

/// What is being called.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    /// Full method paths; any one must match.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Header constraints; all must match.
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Header {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditLoggingOptions {
    #[serde(default)]
    pub audit_condition: AuditCondition,
    #[serde(default)]
    pub audit_loggers: Vec<AuditLoggerConfig>,
}

/// When a decision is forwarded to the audit loggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCondition {
    #[default]
    None,
    OnDeny,
    OnAllow,
    OnDenyAndAllow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditLoggerConfig {
    pub name: String,
    /// Logger-specific settings, passed through untouched.
    #[serde(default)]
    pub config: serde_json::Value,
    /// An optional logger that is not available is skipped instead of
    /// failing the policy.
    #[serde(default)]
    pub is_optional: bool,
}
