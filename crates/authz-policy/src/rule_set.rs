use crate::matcher::StringMatch;
use crate::schema::AuditLoggingOptions;

/// What a rule-set does with a call that one of its rules matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSetAction {
    /// A call must match at least one rule, otherwise it is denied.
    Allow,
    /// A call matching any rule is denied.
    Deny,
}

/// A named, ordered group of rules sharing one action.
///
/// A policy translates into a chain of rule-sets which the engine walks in
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub name: String,
    pub action: RuleSetAction,
    pub rules: Vec<RuleSpec>,
    pub audit: AuditLoggingOptions,
}

/// One translated rule. Matchers of the same kind are OR'd; the three kinds
/// are AND'd. An empty list of a kind matches everything.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    /// `<policy>_<rule>`.
    pub name: String,
    pub principals: Vec<StringMatch>,
    pub paths: Vec<StringMatch>,
    pub headers: Vec<HeaderMatch>,
}

/// A header that must be present with a value accepted by one of `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatch {
    /// Lower-cased header name.
    pub key: String,
    pub values: Vec<StringMatch>,
}
