//! `BlockFeed` trait: abstraction over the partitioned block source.
//!
//! A feed hands out messages in order and is told when each one has been
//! fully handled. Delivery is at-least-once: anything not committed may
//! be delivered again after a restart.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::error::FeedError;

/// One raw message pulled from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    pub partition: i32,
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Ordered, at-least-once source of block payloads.
#[async_trait]
pub trait BlockFeed: Send {
    /// Topic or source label for logs.
    fn topic(&self) -> &str;

    /// Next message, or `None` once the feed is exhausted.
    async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError>;

    /// Acknowledge `msg` and every message before it on its partition.
    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError>;
}

// ─── In-memory feed (tests) ───────────────────────────────────────────────────

/// Feed over a fixed list of payloads, recording every commit.
pub struct MemoryFeed {
    topic: String,
    pending: VecDeque<FeedMessage>,
    next_offset: u64,
    committed: Vec<u64>,
}

impl MemoryFeed {
    pub fn new<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let mut feed = Self {
            topic: "memory".into(),
            pending: VecDeque::new(),
            next_offset: 0,
            committed: Vec::new(),
        };
        for payload in payloads {
            feed.push(payload);
        }
        feed
    }

    /// Append a payload at the next offset.
    pub fn push(&mut self, payload: impl Into<Vec<u8>>) {
        self.pending.push_back(FeedMessage {
            partition: 0,
            offset: self.next_offset,
            payload: payload.into(),
        });
        self.next_offset += 1;
    }

    /// Offsets committed so far, in commit order.
    pub fn committed(&self) -> &[u64] {
        &self.committed
    }

    /// Messages not yet pulled.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl BlockFeed for MemoryFeed {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        Ok(self.pending.pop_front())
    }

    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        if msg.offset >= self.next_offset {
            return Err(FeedError::UnknownOffset { offset: msg.offset });
        }
        self.committed.push(msg.offset);
        Ok(())
    }
}

// ─── JSON-lines replay feed ───────────────────────────────────────────────────

/// Replays a file with one message per line. The line number is the offset.
///
/// Lines are handed over as raw bytes; a line that is not valid UTF-8 or
/// not JSON reaches the decoder and is handled as a poison message.
///
/// The committed offset is kept in a sidecar `<path>.offset` file; reopening
/// the feed skips everything up to and including it.
pub struct JsonLinesFeed {
    topic: String,
    offset_path: PathBuf,
    reader: BufReader<File>,
    next_offset: u64,
    committed: Option<u64>,
}

impl JsonLinesFeed {
    pub async fn open(path: impl AsRef<Path>, topic: impl Into<String>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let offset_path = Self::offset_path_for(path);
        let committed = Self::load_offset(&offset_path).await?;
        let file = File::open(path).await?;
        let topic = topic.into();

        info!(path = %path.display(), %topic, ?committed, "replay feed opened");
        Ok(Self {
            topic,
            offset_path,
            reader: BufReader::new(file),
            next_offset: 0,
            committed,
        })
    }

    /// Sidecar file holding the last committed offset.
    pub fn offset_path_for(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".offset");
        PathBuf::from(name)
    }

    pub fn committed_offset(&self) -> Option<u64> {
        self.committed
    }

    async fn load_offset(offset_path: &Path) -> Result<Option<u64>, FeedError> {
        match tokio::fs::read_to_string(offset_path).await {
            Ok(text) => text
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|e| {
                    FeedError::Other(format!("bad offset file {}: {e}", offset_path.display()))
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlockFeed for JsonLinesFeed {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next_message(&mut self) -> Result<Option<FeedMessage>, FeedError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.reader.read_until(b'\n', &mut line).await? == 0 {
                return Ok(None);
            }
            let offset = self.next_offset;
            self.next_offset += 1;

            let already_committed = self.committed.is_some_and(|c| offset <= c);
            if already_committed || line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let payload = line.strip_suffix(b"\n").unwrap_or(line.as_slice());
            let payload = payload.strip_suffix(b"\r").unwrap_or(payload);
            return Ok(Some(FeedMessage {
                partition: 0,
                offset,
                payload: payload.to_vec(),
            }));
        }
    }

    async fn commit(&mut self, msg: &FeedMessage) -> Result<(), FeedError> {
        if msg.offset >= self.next_offset {
            return Err(FeedError::UnknownOffset { offset: msg.offset });
        }
        let tmp = self.offset_path.with_extension("offset.tmp");
        tokio::fs::write(&tmp, msg.offset.to_string()).await?;
        tokio::fs::rename(&tmp, &self.offset_path).await?;

        self.committed = Some(self.committed.map_or(msg.offset, |c| c.max(msg.offset)));
        debug!(topic = %self.topic, offset = msg.offset, "offset committed");
        Ok(())
    }
}
