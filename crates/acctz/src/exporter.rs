use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::record::Record;
use crate::writer::{ExportError, RecordWriter};

/// Idle time after which buffered records are flushed to disk.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Drains a [`Recorder`](crate::Recorder)'s channel into a JSON-lines file.
pub struct RecordExporter;

impl RecordExporter {
    /// Open `path` and spawn the export task.
    ///
    /// The task exits after a final flush once every sender of `rx` is
    /// dropped. Write failures are logged and the record skipped.
    pub async fn start(
        path: impl AsRef<Path>,
        rx: mpsc::Receiver<Record>,
    ) -> Result<JoinHandle<()>, ExportError> {
        let mut writer = RecordWriter::open(path).await?;
        Ok(tokio::spawn(async move {
            export_loop(&mut writer, rx).await;
        }))
    }
}

async fn export_loop(writer: &mut RecordWriter, mut rx: mpsc::Receiver<Record>) {
    let mut dirty = false;

    loop {
        match tokio::time::timeout(FLUSH_INTERVAL, rx.recv()).await {
            Ok(Some(record)) => match writer.write(&record).await {
                Ok(()) => dirty = true,
                Err(err) => tracing::error!(%err, "failed to export accounting record"),
            },
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "failed to flush accounting export on shutdown");
                    }
                }
                tracing::debug!("accounting exporter shutting down");
                return;
            }
            Err(_) if dirty => {
                if let Err(err) = writer.flush().await {
                    tracing::error!(%err, "periodic accounting flush failed");
                } else {
                    dirty = false;
                }
            }
            Err(_) => {}
        }
    }
}
