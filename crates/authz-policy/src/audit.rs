//! Decision audit logging.
//!
//! A policy's `audit_logging_options` select which decisions are audited and
//! which loggers receive them. Loggers are resolved by name when the engine
//! is built.

use std::fmt;

use crate::schema::{AuditCondition, AuditLoggerConfig};

/// Name of the built-in logger that emits audit events through `tracing`.
pub const STDOUT_LOGGER: &str = "stdout_logger";

/// One audited authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent<'a> {
    pub full_method: &'a str,
    /// The first identity name of the peer, empty when unauthenticated.
    pub principal: &'a str,
    pub policy_name: &'a str,
    pub matched_rule: Option<&'a str>,
    pub authorized: bool,
}

/// A sink for [`AuditEvent`]s. Implementations must not block.
pub trait AuditLogger: Send + Sync + fmt::Debug {
    fn log(&self, event: &AuditEvent<'_>);
}

/// Writes audit events as structured `tracing` events on the `authz_audit`
/// target, so they end up wherever the process sends its logs.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl AuditLogger for StdoutLogger {
    fn log(&self, event: &AuditEvent<'_>) {
        tracing::info!(
            target: "authz_audit",
            full_method = event.full_method,
            principal = event.principal,
            policy_name = event.policy_name,
            matched_rule = event.matched_rule.unwrap_or(""),
            authorized = event.authorized,
            "authorization decision"
        );
    }
}

/// Look up a built-in logger by its configured name.
pub fn builtin_logger(config: &AuditLoggerConfig) -> Option<Box<dyn AuditLogger>> {
    match config.name.as_str() {
        STDOUT_LOGGER => Some(Box::new(StdoutLogger)),
        _ => None,
    }
}

/// Whether a decision with the given outcome should be audited.
pub fn should_audit(condition: AuditCondition, authorized: bool) -> bool {
    match condition {
        AuditCondition::None => false,
        AuditCondition::OnDeny => !authorized,
        AuditCondition::OnAllow => authorized,
        AuditCondition::OnDenyAndAllow => true,
    }
}
