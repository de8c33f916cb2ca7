//! Byte sources, chunk transports and the sequential upload loop.

use crate::abort::AbortSignal;
use crate::upload::{ChunkRange, UploadReport, UploadTask, is_accepted, parse_acknowledged_end};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Readable, sized upload payload.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// MIME type sent with every chunk.
    fn content_type(&self) -> &str;

    /// Read bytes `[start, end)`.
    async fn read_range(&self, start: u64, end: u64) -> Result<Bytes>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Status and headers of a chunk write.
#[derive(Clone, Debug, Default)]
pub struct ChunkResponse {
    pub status: u16,
    /// `Range` header of an incomplete response, if present.
    pub range: Option<String>,
    pub body: String,
}

/// Destination accepting range-addressed chunk writes.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Write one chunk. Transport failures are `Err`; any HTTP status is `Ok`.
    async fn put_chunk(
        &self,
        range: &ChunkRange,
        content_type: &str,
        body: Bytes,
    ) -> Result<ChunkResponse>;
}

/// In-memory payload.
#[derive(Clone, Debug)]
pub struct MemorySource {
    data: Bytes,
    content_type: String,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        let start = usize::try_from(start).map_err(|_| range_error(start, end))?;
        let end = usize::try_from(end).map_err(|_| range_error(start as u64, end))?;
        if start > end || end > self.data.len() {
            return Err(range_error(start as u64, end as u64));
        }
        Ok(self.data.slice(start..end))
    }
}

/// Payload read from a local file, one chunk at a time.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
    content_type: String,
}

impl FileSource {
    /// Open `path`, guessing the content type from its extension unless given.
    pub async fn open(path: impl AsRef<Path>, content_type: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        let content_type = content_type
            .map(str::to_string)
            .or_else(|| guess_content_type(&path).map(str::to_string))
            .unwrap_or_default();
        Ok(Self {
            path,
            len: metadata.len(),
            content_type,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component, used as the upload name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Override the content type sent with each chunk.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    /// Empty when neither given nor guessable from the extension.
    fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        if start > end || end > self.len {
            return Err(range_error(start, end));
        }
        let size = usize::try_from(end - start)
            .map_err(|_| Error::Transport("chunk size exceeds platform limits".to_string()))?;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut data = vec![0u8; size];
        file.read_exact(&mut data).await?;
        Ok(Bytes::from(data))
    }
}

fn range_error(start: u64, end: u64) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        format!("read range {start}..{end} outside source"),
    ))
}

/// Map a video file extension to its MIME type.
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" | "qt" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "3gp" => "video/3gpp",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

/// Send `source` to `sink` in sequential chunks of `chunk_size` bytes.
///
/// Each chunk waits for the previous one to be accepted (2xx or 308). Any
/// other status ends the upload with [`Error::ChunkRejected`]; nothing is
/// retried. `on_progress(offset, total)` runs after each accepted chunk. A
/// fired `abort` drops the in-flight request and leaves the offset where it
/// was.
pub async fn resumable_put<S, K, F>(
    source: &S,
    sink: &K,
    chunk_size: u64,
    abort: &AbortSignal,
    mut on_progress: F,
) -> Result<UploadReport>
where
    S: ByteSource + ?Sized,
    K: ChunkSink + ?Sized,
    F: FnMut(u64, u64),
{
    let mut task = UploadTask::new(source.len(), chunk_size)?;
    let content_type = source.content_type().to_string();

    while let Some(range) = task.next_range() {
        if abort.is_aborted() {
            tracing::warn!(offset = task.offset(), total = task.total(), "Upload aborted");
            return Err(Error::Aborted);
        }

        let body = source.read_range(range.start, range.end).await?;
        let response = match abort
            .guard(sink.put_chunk(&range, &content_type, body))
            .await
        {
            Ok(response) => response?,
            Err(err) => {
                tracing::warn!(offset = task.offset(), total = task.total(), "Upload aborted");
                return Err(err);
            }
        };

        if !is_accepted(response.status) {
            tracing::debug!(
                status = response.status,
                offset = task.offset(),
                "Chunk rejected"
            );
            return Err(Error::ChunkRejected {
                status: response.status,
                offset: task.offset(),
                body: response.body,
            });
        }

        if let Some(acked) = response.range.as_deref().and_then(parse_acknowledged_end)
            && acked != range.end
        {
            tracing::warn!(
                acknowledged = acked,
                expected = range.end,
                "Destination reported a different persisted range"
            );
        }

        task.advance(&range)?;
        tracing::debug!(
            offset = task.offset(),
            total = task.total(),
            status = response.status,
            "Chunk accepted"
        );
        on_progress(task.offset(), task.total());
    }

    Ok(UploadReport {
        bytes_sent: task.offset(),
        requests: task.acknowledged(),
    })
}
