//! Hot-reloadable authorization gate.
//!
//! A [`Gate`] loads an authorization policy file once at construction and
//! then keeps it fresh from a background task. Calls are authorized against
//! whichever policy was most recently built successfully; a policy file that
//! becomes unreadable or invalid is reported and otherwise ignored until it
//! is fixed.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use authz_gate::Gate;
//! use call_context::{CallContext, Peer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = Gate::start("/security/authz/policy.json", Duration::from_secs(60)).await?;
//!
//! let call = CallContext::new("/pkg.Service/Method").with_peer(Peer::default());
//! let decision = gate.authorize(&call)?;
//! println!("{:?}", decision.verdict);
//!
//! gate.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod gate;
mod reloader;
mod source;

pub use error::{ConfigurationError, ConstructionError, LoadError};
pub use gate::{ActivePolicy, Gate};
pub use reloader::{ReloadOutcome, ReloadReport};
pub use source::PolicyFile;
