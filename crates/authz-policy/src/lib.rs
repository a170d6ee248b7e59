//! # authz-policy
//!
//! Authorization policy documents and the decision engine that evaluates
//! them. A JSON policy is translated into an ordered chain of rule-sets,
//! compiled once into a [`ChainEngine`], and then evaluated against each
//! incoming call.
//!
//! ## Quick start
//!
//! ```rust
//! use authz_policy::{translate, ChainEngineFactory, DecisionEngine, EngineFactory};
//! use call_context::{CallContext, Peer};
//!
//! let policy = br#"{"name": "authz", "allow_rules": [{"name": "allow_all"}]}"#;
//! let (rule_sets, name) = translate(policy).unwrap();
//! let engine = ChainEngineFactory.build(rule_sets, &name).unwrap();
//!
//! let call = CallContext::new("/pkg.Service/Method").with_peer(Peer::default());
//! assert!(engine.evaluate(&call).unwrap().is_permit());
//! ```

pub mod audit;
mod decision;
mod engine;
mod error;
pub mod matcher;
mod rule_set;
mod schema;
pub mod translate;

// Re-export primary public API at crate root.
pub use decision::{Decision, Verdict};
pub use engine::{ChainEngine, ChainEngineFactory, DecisionEngine, EngineFactory};
pub use error::{EngineBuildError, EvaluationError, TranslationError};
pub use rule_set::{HeaderMatch, RuleSet, RuleSetAction, RuleSpec};
pub use schema::{
    AuditCondition, AuditLoggerConfig, AuditLoggingOptions, AuthorizationPolicy, Header, Request,
    Rule, Source,
};
pub use translate::{translate, translate_str};
