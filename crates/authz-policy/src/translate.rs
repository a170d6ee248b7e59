use crate::error::TranslationError;
use crate::matcher::StringMatch;
use crate::rule_set::{HeaderMatch, RuleSet, RuleSetAction, RuleSpec};
use crate::schema::{AuditCondition, AuditLoggingOptions, AuthorizationPolicy, Header, Rule};

pub const DENY_RULES: &str = "deny_rules";
pub const ALLOW_RULES: &str = "allow_rules";

/// Translate a raw policy document into its chain of rule-sets and the
/// policy name.
///
/// The deny rule-set (present only when the document has deny rules) comes
/// first, followed by the allow rule-set. Rules keep their document order.
pub fn translate(raw: &[u8]) -> Result<(Vec<RuleSet>, String), TranslationError> {
    let policy: AuthorizationPolicy = serde_json::from_slice(raw)?;
    translate_policy(policy)
}

/// Same as [`translate`], for documents already held as a string.
pub fn translate_str(json: &str) -> Result<(Vec<RuleSet>, String), TranslationError> {
    translate(json.as_bytes())
}

fn translate_policy(policy: AuthorizationPolicy) -> Result<(Vec<RuleSet>, String), TranslationError> {
    if policy.name.is_empty() {
        return Err(TranslationError::NameMissing);
    }
    if policy.allow_rules.is_empty() {
        return Err(TranslationError::AllowRulesMissing);
    }

    let mut rule_sets = Vec::with_capacity(2);
    if !policy.deny_rules.is_empty() {
        rule_sets.push(RuleSet {
            name: DENY_RULES.to_string(),
            action: RuleSetAction::Deny,
            rules: parse_rules(&policy.deny_rules, &policy.name, DENY_RULES)?,
            audit: deny_audit_options(&policy.audit_logging_options),
        });
    }
    rule_sets.push(RuleSet {
        name: ALLOW_RULES.to_string(),
        action: RuleSetAction::Allow,
        rules: parse_rules(&policy.allow_rules, &policy.name, ALLOW_RULES)?,
        audit: policy.audit_logging_options,
    });

    Ok((rule_sets, policy.name))
}

/// The deny rule-set only ever decides to deny; a call it lets through is
/// still subject to the allow rule-set, which audits the final outcome.
fn deny_audit_options(options: &AuditLoggingOptions) -> AuditLoggingOptions {
    let audit_condition = match options.audit_condition {
        AuditCondition::None | AuditCondition::OnAllow => AuditCondition::None,
        AuditCondition::OnDeny | AuditCondition::OnDenyAndAllow => AuditCondition::OnDeny,
    };
    AuditLoggingOptions {
        audit_condition,
        audit_loggers: options.audit_loggers.clone(),
    }
}

fn parse_rules(
    rules: &[Rule],
    policy_name: &str,
    section: &'static str,
) -> Result<Vec<RuleSpec>, TranslationError> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            parse_rule(rule, policy_name).map_err(|reason| TranslationError::InvalidRule {
                section,
                index,
                reason,
            })
        })
        .collect()
}

fn parse_rule(rule: &Rule, policy_name: &str) -> Result<RuleSpec, String> {
    if rule.name.is_empty() {
        return Err("\"name\" is not present".to_string());
    }
    Ok(RuleSpec {
        name: format!("{policy_name}_{}", rule.name),
        principals: parse_patterns(&rule.source.principals),
        paths: parse_patterns(&rule.request.paths),
        headers: parse_headers(&rule.request.headers)?,
    })
}

fn parse_patterns(patterns: &[String]) -> Vec<StringMatch> {
    patterns.iter().map(|p| StringMatch::from_pattern(p)).collect()
}

fn parse_headers(headers: &[Header]) -> Result<Vec<HeaderMatch>, String> {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            if header.key.is_empty() {
                return Err(format!("\"headers\" {i}: \"key\" is not present"));
            }
            let key = header.key.to_ascii_lowercase();
            if is_unsupported_header(&key) {
                return Err(format!("\"headers\" {i}: unsupported \"key\" {key}"));
            }
            if header.values.is_empty() {
                return Err(format!("\"headers\" {i}: \"values\" is not present"));
            }
            Ok(HeaderMatch {
                key,
                values: parse_patterns(&header.values),
            })
        })
        .collect()
}

/// Pseudo-headers, transport-internal and hop-by-hop headers cannot be
/// matched on.
fn is_unsupported_header(key: &str) -> bool {
    matches!(
        key,
        "host"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    ) || key.starts_with(':')
        || key.starts_with("grpc-")
}
