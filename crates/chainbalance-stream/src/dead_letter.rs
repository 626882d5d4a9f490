//! Destinations for messages that could not be decoded.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::FeedError;
use crate::feed::FeedMessage;

/// Receives poison messages before their offset is committed.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn divert(&self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError>;
}

/// Keeps diverted messages in memory. Used in tests.
#[derive(Debug, Default)]
pub struct MemoryDeadLetter {
    entries: Mutex<Vec<(FeedMessage, String)>>,
}

impl MemoryDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(FeedMessage, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetter {
    async fn divert(&self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError> {
        self.entries
            .lock()
            .map_err(|_| FeedError::Other("dead-letter mutex poisoned".into()))?
            .push((msg.clone(), reason.to_string()));
        Ok(())
    }
}

#[derive(Serialize)]
struct DeadLetterLine<'a> {
    partition: i32,
    offset: u64,
    reason: &'a str,
    payload_hex: String,
}

/// Appends one JSON object per diverted message to a file.
pub struct JsonLinesDeadLetter {
    path: PathBuf,
    // Serializes appends so concurrent lines never interleave.
    lock: tokio::sync::Mutex<()>,
}

impl JsonLinesDeadLetter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeadLetterSink for JsonLinesDeadLetter {
    async fn divert(&self, msg: &FeedMessage, reason: &str) -> Result<(), FeedError> {
        let line = DeadLetterLine {
            partition: msg.partition,
            offset: msg.offset,
            reason,
            payload_hex: hex::encode(&msg.payload),
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poison(offset: u64) -> FeedMessage {
        FeedMessage {
            partition: 0,
            offset,
            payload: b"not json".to_vec(),
        }
    }

    #[tokio::test]
    async fn memory_sink_keeps_reason() {
        let sink = MemoryDeadLetter::new();
        sink.divert(&poison(4), "bad header").await.unwrap();
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.offset, 4);
        assert_eq!(entries[0].1, "bad header");
    }

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesDeadLetter::new(dir.path().join("dead.jsonl"));
        sink.divert(&poison(1), "first").await.unwrap();
        sink.divert(&poison(2), "second").await.unwrap();

        let text = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["offset"], 1);
        assert_eq!(lines[1]["reason"], "second");
        assert_eq!(lines[0]["payload_hex"], hex::encode(b"not json"));
    }
}
