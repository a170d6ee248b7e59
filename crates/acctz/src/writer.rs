use std::path::Path;

use tokio::io::{AsyncWriteExt, BufWriter};

use crate::record::Record;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to create export directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open accounting export file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize accounting record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write accounting record: {0}")]
    Write(std::io::Error),

    #[error("failed to flush accounting export: {0}")]
    Flush(std::io::Error),
}

/// Appends [`Record`]s to a file, one JSON object per line.
pub struct RecordWriter {
    file: BufWriter<tokio::fs::File>,
}

impl RecordWriter {
    /// Open `path` for appending, creating it and its parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ExportError::CreateDir)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(ExportError::OpenFile)?;

        Ok(Self {
            file: BufWriter::new(file),
        })
    }

    pub async fn write(&mut self, record: &Record) -> Result<(), ExportError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line).await.map_err(ExportError::Write)
    }

    pub async fn flush(&mut self) -> Result<(), ExportError> {
        self.file.flush().await.map_err(ExportError::Flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SessionInfo, SessionStatus, UserDetail};

    fn sample(identity: &str) -> Record {
        Record {
            session_info: SessionInfo {
                local_address: "192.0.2.1".into(),
                local_port: 9339,
                remote_address: "192.0.2.2".into(),
                remote_port: 50000,
                ip_proto: 6,
                status: SessionStatus::Operation,
                user: UserDetail {
                    identity: identity.into(),
                },
            },
            timestamp: chrono::Utc::now(),
            component_name: "interzept".into(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/acct.jsonl");

        let mut writer = RecordWriter::open(&path).await.unwrap();
        writer.write(&sample("a")).await.unwrap();
        writer.write(&sample("b")).await.unwrap();
        writer.flush().await.unwrap();
        drop(writer);

        // Reopening appends rather than truncating.
        let mut writer = RecordWriter::open(&path).await.unwrap();
        writer.write(&sample("c")).await.unwrap();
        writer.flush().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let identities: Vec<String> = contents
            .lines()
            .map(|line| serde_json::from_str::<Record>(line).unwrap())
            .map(|r| r.session_info.user.identity)
            .collect();
        assert_eq!(identities, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecordWriter::open(dir.path()).await.err().unwrap();
        assert!(matches!(err, ExportError::OpenFile(_)), "{err}");
    }
}
