//! Upload task state and wire types for resumable uploads.

use crate::RESUME_INCOMPLETE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous byte range of the source sent in one request.
///
/// `end` is exclusive. The zero-length source is represented by the single
/// range `0..0` of total `0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ChunkRange {
    /// Number of bytes in this chunk.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the chunk carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Value for the `Content-Range` request header.
    ///
    /// An empty range uses the unsatisfied form `bytes */{total}` since
    /// `bytes a-b` cannot describe zero bytes.
    pub fn content_range(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "bytes */{}", self.total)
        } else {
            write!(f, "bytes {}-{}/{}", self.start, self.end - 1, self.total)
        }
    }
}

/// Cursor over a single upload attempt.
///
/// `offset` only moves forward and never passes `total`. The task is created
/// per attempt and discarded afterwards; a restart begins at byte 0.
#[derive(Clone, Debug)]
pub struct UploadTask {
    total: u64,
    chunk_size: u64,
    offset: u64,
    acknowledged: u64,
}

impl UploadTask {
    /// Create a task for a source of `total` bytes.
    pub fn new(total: u64, chunk_size: u64) -> crate::Result<Self> {
        if chunk_size == 0 {
            return Err(crate::Error::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            total,
            chunk_size,
            offset: 0,
            acknowledged: 0,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of chunk requests accepted so far.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    /// Expected number of requests for the whole upload.
    pub fn expected_requests(&self) -> u64 {
        if self.total == 0 {
            1
        } else {
            self.total.div_ceil(self.chunk_size)
        }
    }

    /// The next range to send, or `None` once everything is acknowledged.
    pub fn next_range(&self) -> Option<ChunkRange> {
        if self.offset < self.total {
            let end = self.total.min(self.offset.saturating_add(self.chunk_size));
            Some(ChunkRange {
                start: self.offset,
                end,
                total: self.total,
            })
        } else if self.total == 0 && self.acknowledged == 0 {
            Some(ChunkRange {
                start: 0,
                end: 0,
                total: 0,
            })
        } else {
            None
        }
    }

    /// Record acceptance of `range` and move the cursor to its end.
    pub fn advance(&mut self, range: &ChunkRange) -> crate::Result<()> {
        if range.start != self.offset || range.end > self.total || range.end < range.start {
            return Err(crate::Error::RangeOutOfOrder {
                range: range.to_string(),
                offset: self.offset,
            });
        }
        self.offset = range.end;
        self.acknowledged += 1;
        Ok(())
    }

    /// Whether every byte has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.offset == self.total && (self.total > 0 || self.acknowledged > 0)
    }
}

/// Whether a chunk response status lets the upload continue.
pub fn is_accepted(status: u16) -> bool {
    (200..300).contains(&status) || status == RESUME_INCOMPLETE
}

/// Parse the `Range: bytes=0-N` header of an incomplete response.
///
/// Returns the exclusive end of the persisted prefix.
pub fn parse_acknowledged_end(header: &str) -> Option<u64> {
    let range = header.trim().strip_prefix("bytes=")?;
    let (start, last) = range.split_once('-')?;
    if start.trim() != "0" {
        return None;
    }
    last.trim().parse::<u64>().ok().map(|last| last + 1)
}

/// Summary of a finished upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Bytes acknowledged by the destination.
    pub bytes_sent: u64,
    /// Chunk requests issued.
    pub requests: u64,
}

/// Request to open a resumable upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub filename: String,
    pub content_type: String,
}

/// Response from opening a resumable upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadResponse {
    /// Pre-signed destination for chunk writes.
    pub upload_url: String,
    /// Session created for the uploaded throw.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Storage URI of the uploaded object.
    #[serde(default)]
    pub gs_uri: Option<String>,
}
