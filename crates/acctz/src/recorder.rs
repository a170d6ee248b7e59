use std::sync::{Mutex, PoisonError};

use call_context::CallContext;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::peer::{self, UNKNOWN_USER};
use crate::record::{Record, SessionInfo, SessionStatus, UserDetail};

/// Records buffered before [`Recorder::account`] starts waiting on the
/// consumer.
pub const BUFFERED_RECORDS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("no peer information in context")]
    NoPeer,
}

/// Captures an accounting [`Record`] for each call and queues it for export.
///
/// Records flow through a bounded channel; a single consumer (usually a
/// [`RecordExporter`](crate::RecordExporter)) takes the receiving end with
/// [`records`](Self::records).
pub struct Recorder {
    tx: mpsc::Sender<Record>,
    rx: Mutex<Option<mpsc::Receiver<Record>>>,
    component_name: String,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(BUFFERED_RECORDS)
    }
}

impl Recorder {
    /// A recorder buffering up to `buffer` records. A zero buffer is raised
    /// to one.
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            component_name: std::env::args().next().unwrap_or_default(),
        }
    }

    /// Override the component name stamped on every record.
    pub fn with_component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = name.into();
        self
    }

    /// Queue a record for export, waiting while the buffer is full.
    ///
    /// If the consumer is gone the record is dropped with a warning.
    pub async fn account(&self, record: Record) {
        if let Err(err) = self.tx.send(record).await {
            warn!(
                remote = %err.0.session_info.remote_address,
                "accounting record channel closed; record dropped"
            );
        }
    }

    /// The receiving end of the record channel. Returns `None` once taken.
    pub fn records(&self) -> Option<mpsc::Receiver<Record>> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Build a record describing the session `ctx` arrived on.
    pub fn record_from_context(&self, ctx: &CallContext) -> Result<Record, RecordError> {
        let peer = ctx.peer.as_ref().ok_or(RecordError::NoPeer)?;

        let identity = match peer::spiffe_id(peer) {
            Ok(Some(id)) => id.to_string(),
            Ok(None) => UNKNOWN_USER.to_string(),
            Err(err) => {
                warn!(%err, "unable to fetch spiffe id");
                UNKNOWN_USER.to_string()
            }
        };

        let (local_address, local_port) = peer::split_host_port(peer.local_addr.as_ref());
        let (remote_address, remote_port) = peer::split_host_port(peer.addr.as_ref());

        Ok(Record {
            session_info: SessionInfo {
                local_address,
                local_port,
                remote_address,
                remote_port,
                ip_proto: peer::ip_proto(peer.local_addr.as_ref()),
                status: SessionStatus::Operation,
                user: UserDetail { identity },
            },
            timestamp: chrono::Utc::now(),
            component_name: self.component_name.clone(),
        })
    }
}
