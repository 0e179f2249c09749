//! IPC frame source (`spec.md §4.3`): a Unix-domain socket, framed by
//! newline-delimited JSON, lazily opened and cached (`PersistentSocket`).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use super::multiplex::FrameConnection;
use crate::error::TransportError;

/// Holds the socket path and lazily-opened `UnixStream`, split into a
/// buffered read half and a write half so reads (listener task) and writes
/// (send path, under a lock) never contend on the same `&mut`.
pub struct IpcConnection {
    path: PathBuf,
    reader: Mutex<Option<BufReader<tokio::net::unix::OwnedReadHalf>>>,
    writer: Mutex<Option<tokio::net::unix::OwnedWriteHalf>>,
}

impl IpcConnection {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FrameConnection for IpcConnection {
    async fn open(&self) -> Result<(), TransportError> {
        let mut reader_guard = self.reader.lock().await;
        if reader_guard.is_some() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.path).await.map_err(|e| TransportError::Connect {
            uri: self.path.display().to_string(),
            source: e,
        })?;
        let (read_half, write_half) = stream.into_split();
        *reader_guard = Some(BufReader::new(read_half));
        *self.writer.lock().await = Some(write_half);
        Ok(())
    }

    async fn read_frame(&self) -> Result<Vec<u8>, TransportError> {
        use tokio::io::AsyncBufReadExt;

        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionLost("ipc socket not open".to_string()))?;
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::ConnectionLost("ipc socket closed by peer".to_string()));
        }
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }

    async fn write_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionLost("ipc socket not open".to_string()))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        *self.reader.lock().await = None;
        *self.writer.lock().await = None;
    }
}
