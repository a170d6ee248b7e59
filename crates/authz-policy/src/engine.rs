use std::collections::HashSet;

use call_context::{AuthInfo, CallContext};
use tracing::{debug, trace};

use crate::audit::{builtin_logger, should_audit, AuditEvent, AuditLogger};
use crate::decision::Decision;
use crate::error::{EngineBuildError, EvaluationError};
use crate::matcher::{any_match, CompiledMatch, StringMatch};
use crate::rule_set::{RuleSet, RuleSetAction, RuleSpec};
use crate::schema::AuditCondition;

// ---------------------------------------------------------------------------
// Engine seams
// ---------------------------------------------------------------------------

/// An immutable, evaluable authorization policy.
pub trait DecisionEngine: Send + Sync + 'static {
    /// Render a verdict for one call.
    fn evaluate(&self, ctx: &CallContext) -> Result<Decision, EvaluationError>;
}

/// Builds a [`DecisionEngine`] from translated rule-sets.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: DecisionEngine;

    fn build(
        &self,
        rule_sets: Vec<RuleSet>,
        policy_name: &str,
    ) -> Result<Self::Engine, EngineBuildError>;
}

/// Factory for the built-in [`ChainEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainEngineFactory;

impl EngineFactory for ChainEngineFactory {
    type Engine = ChainEngine;

    fn build(
        &self,
        rule_sets: Vec<RuleSet>,
        policy_name: &str,
    ) -> Result<ChainEngine, EngineBuildError> {
        ChainEngine::new(rule_sets, policy_name)
    }
}

// ---------------------------------------------------------------------------
// Pre-compiled representations
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CompiledRule {
    name: String,
    principals: Vec<CompiledMatch>,
    paths: Vec<CompiledMatch>,
    headers: Vec<(String, Vec<CompiledMatch>)>,
}

#[derive(Debug)]
struct CompiledRuleSet {
    name: String,
    action: RuleSetAction,
    rules: Vec<CompiledRule>,
    audit_condition: AuditCondition,
    audit_loggers: Vec<Box<dyn AuditLogger>>,
}

/// The attributes of a call that rules are matched against.
struct CallAttributes<'a> {
    ctx: &'a CallContext,
    full_method: &'a str,
    /// Identity names of an authenticated peer; empty otherwise.
    principals: Vec<&'a str>,
}

impl<'a> CallAttributes<'a> {
    fn from_context(ctx: &'a CallContext) -> Result<Self, EvaluationError> {
        let peer = ctx.peer.as_ref().ok_or(EvaluationError::MissingPeer)?;
        let full_method = ctx
            .full_method
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or(EvaluationError::MissingMethod)?;
        let principals = match &peer.auth {
            Some(AuthInfo::Tls(tls)) => tls.principal_names().collect(),
            _ => Vec::new(),
        };
        Ok(Self {
            ctx,
            full_method,
            principals,
        })
    }
}

// ---------------------------------------------------------------------------
// ChainEngine
// ---------------------------------------------------------------------------

/// Evaluates a call against an ordered chain of rule-sets.
///
/// Rule-sets are walked in the order the translator produced them. A deny
/// rule-set with a matching rule denies the call; an allow rule-set with no
/// matching rule denies the call. A call that survives the whole chain is
/// permitted.
pub struct ChainEngine {
    policy_name: String,
    chain: Vec<CompiledRuleSet>,
}

impl std::fmt::Debug for ChainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEngine")
            .field("policy_name", &self.policy_name)
            .field("num_rule_sets", &self.chain.len())
            .field(
                "num_rules",
                &self.chain.iter().map(|s| s.rules.len()).sum::<usize>(),
            )
            .finish()
    }
}

impl ChainEngine {
    /// Compile `rule_sets` into an engine. Every matcher is compiled and
    /// every audit logger resolved up front.
    pub fn new(rule_sets: Vec<RuleSet>, policy_name: &str) -> Result<Self, EngineBuildError> {
        if rule_sets.is_empty() {
            return Err(EngineBuildError::EmptyChain {
                policy: policy_name.to_string(),
            });
        }

        let chain = rule_sets
            .into_iter()
            .map(compile_rule_set)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            policy_name: policy_name.to_string(),
            chain,
        })
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    fn audit(&self, set: &CompiledRuleSet, call: &CallAttributes<'_>, matched: Option<&str>, authorized: bool) {
        if set.audit_loggers.is_empty() || !should_audit(set.audit_condition, authorized) {
            return;
        }
        let event = AuditEvent {
            full_method: call.full_method,
            principal: call.principals.first().copied().unwrap_or(""),
            policy_name: &self.policy_name,
            matched_rule: matched,
            authorized,
        };
        for logger in &set.audit_loggers {
            logger.log(&event);
        }
    }
}

impl DecisionEngine for ChainEngine {
    fn evaluate(&self, ctx: &CallContext) -> Result<Decision, EvaluationError> {
        let call = CallAttributes::from_context(ctx)?;
        trace!(policy = %self.policy_name, method = call.full_method, "evaluating call against policy");

        let mut last_match = None;
        for set in &self.chain {
            let matched = set.find_matching_rule(&call);
            match (set.action, matched) {
                (RuleSetAction::Allow, None) => {
                    debug!(
                        policy = %self.policy_name,
                        rule_set = %set.name,
                        method = call.full_method,
                        "call did not match an allow rule"
                    );
                    self.audit(set, &call, None, false);
                    return Ok(Decision::deny(
                        &self.policy_name,
                        None,
                        "incoming RPC did not match an allow policy",
                    ));
                }
                (RuleSetAction::Deny, Some(rule)) => {
                    debug!(
                        policy = %self.policy_name,
                        rule_set = %set.name,
                        rule,
                        method = call.full_method,
                        "call matched a deny rule"
                    );
                    self.audit(set, &call, Some(rule), false);
                    return Ok(Decision::deny(
                        &self.policy_name,
                        Some(rule.to_string()),
                        format!("incoming RPC matched a deny policy {rule:?}"),
                    ));
                }
                _ => {
                    self.audit(set, &call, matched, true);
                    if matched.is_some() {
                        last_match = matched;
                    }
                }
            }
        }

        Ok(Decision::permit(
            &self.policy_name,
            last_match.map(str::to_string),
            "incoming RPC matched an allow policy",
        ))
    }
}

impl CompiledRuleSet {
    /// First rule in document order that matches the call.
    fn find_matching_rule(&self, call: &CallAttributes<'_>) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(call))
            .map(|rule| rule.name.as_str())
    }
}

impl CompiledRule {
    fn matches(&self, call: &CallAttributes<'_>) -> bool {
        any_match(&self.principals, call.principals.iter().copied())
            && any_match(&self.paths, [call.full_method])
            && self.headers.iter().all(|(key, values)| {
                // Multiple values of one header are matched as a single
                // comma-joined value.
                let present = call.ctx.header(key);
                !present.is_empty() && any_match(values, [present.join(",").as_str()])
            })
    }
}

// ---------------------------------------------------------------------------
// Compilation helpers
// ---------------------------------------------------------------------------

fn compile_rule_set(set: RuleSet) -> Result<CompiledRuleSet, EngineBuildError> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(set.rules.len());
    for rule in &set.rules {
        if !seen.insert(rule.name.as_str()) {
            return Err(EngineBuildError::DuplicateRule {
                rule_set: set.name.clone(),
                rule: rule.name.clone(),
            });
        }
        rules.push(compile_rule(rule)?);
    }

    let mut audit_loggers = Vec::new();
    for config in &set.audit.audit_loggers {
        match builtin_logger(config) {
            Some(logger) => audit_loggers.push(logger),
            None if config.is_optional => {
                debug!(logger = %config.name, "optional audit logger is not registered; skipping");
            }
            None => return Err(EngineBuildError::UnknownAuditLogger(config.name.clone())),
        }
    }

    Ok(CompiledRuleSet {
        name: set.name,
        action: set.action,
        rules,
        audit_condition: set.audit.audit_condition,
        audit_loggers,
    })
}

fn compile_rule(rule: &RuleSpec) -> Result<CompiledRule, EngineBuildError> {
    let compile_all = |matchers: &[StringMatch]| {
        matchers
            .iter()
            .map(|m| {
                CompiledMatch::compile(m).map_err(|source| EngineBuildError::InvalidPattern {
                    rule: rule.name.clone(),
                    pattern: m.pattern().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(CompiledRule {
        name: rule.name.clone(),
        principals: compile_all(&rule.principals)?,
        paths: compile_all(&rule.paths)?,
        headers: rule
            .headers
            .iter()
            .map(|h| -> Result<_, EngineBuildError> {
                Ok((h.key.clone(), compile_all(&h.values)?))
            })
            .collect::<Result<Vec<_>, _>>()?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
