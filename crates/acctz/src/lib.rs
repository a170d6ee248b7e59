//! Per-call accounting.
//!
//! A [`Recorder`] turns the session details of each intercepted call into a
//! [`Record`] and queues it on a bounded channel. A [`RecordExporter`] drains
//! that channel into an append-only JSON-lines file.
//!
//! ```rust,no_run
//! use acctz::{RecordExporter, Recorder};
//! use call_context::{CallContext, Peer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = Recorder::default();
//! let exporter = RecordExporter::start(
//!     "/var/log/interzept/acct.jsonl",
//!     recorder.records().expect("receiver not yet taken"),
//! )
//! .await?;
//!
//! let call = CallContext::new("/pkg.Service/Method").with_peer(Peer::default());
//! recorder.account(recorder.record_from_context(&call)?).await;
//!
//! drop(recorder);
//! exporter.await?;
//! # Ok(())
//! # }
//! ```

mod exporter;
pub mod peer;
mod record;
mod recorder;
mod writer;

pub use exporter::RecordExporter;
pub use record::{Record, SessionInfo, SessionStatus, UserDetail};
pub use recorder::{RecordError, Recorder, BUFFERED_RECORDS};
pub use writer::{ExportError, RecordWriter};
