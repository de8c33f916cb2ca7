use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use throwpro_core::upload::ChunkRange;
use throwpro_core::{AbortHandle, ChunkResponse, ChunkSink, Error, Result};
use tokio::time::Duration;

/// One chunk request as seen by the sink.
#[derive(Clone, Debug)]
pub struct SentChunk {
    pub content_range: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Scripted outcome for the next request.
#[allow(dead_code)]
pub enum Reply {
    Status(u16),
    StatusWithRange(u16, String),
    TransportError,
    /// Fire the handle, then stall until the request is dropped.
    AbortAndHang,
}

/// Sink that records every request and answers from a script.
///
/// Requests beyond the script are answered with `default_status`.
pub struct RecordingSink {
    sent: Mutex<Vec<SentChunk>>,
    script: Mutex<VecDeque<Reply>>,
    default_status: u16,
    abort: Option<AbortHandle>,
    pub attempts: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingSink {
    /// Accept every chunk with 308, like an in-progress resumable session.
    pub fn accepting() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<Reply>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            default_status: 308,
            abort: None,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_abort(mut self, handle: AbortHandle) -> Self {
        self.abort = Some(handle);
        self
    }

    pub fn sent(&self) -> Vec<SentChunk> {
        self.sent.lock().unwrap().clone()
    }

    pub fn ranges(&self) -> Vec<String> {
        self.sent().into_iter().map(|c| c.content_range).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkSink for RecordingSink {
    async fn put_chunk(
        &self,
        range: &ChunkRange,
        content_type: &str,
        body: Bytes,
    ) -> Result<ChunkResponse> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let reply = self.script.lock().unwrap().pop_front();

        let record = SentChunk {
            content_range: range.content_range(),
            content_type: content_type.to_string(),
            body,
        };

        match reply {
            Some(Reply::TransportError) => Err(Error::Transport("connection reset".to_string())),
            Some(Reply::AbortAndHang) => {
                if let Some(handle) = &self.abort {
                    handle.abort();
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
                self.sent.lock().unwrap().push(record);
                Ok(ChunkResponse {
                    status: 308,
                    ..Default::default()
                })
            }
            Some(Reply::StatusWithRange(status, header)) => {
                self.sent.lock().unwrap().push(record);
                Ok(ChunkResponse {
                    status,
                    range: Some(header),
                    body: String::new(),
                })
            }
            Some(Reply::Status(status)) => {
                self.sent.lock().unwrap().push(record);
                Ok(ChunkResponse {
                    status,
                    range: None,
                    body: format!("status {status}"),
                })
            }
            None => {
                self.sent.lock().unwrap().push(record);
                Ok(ChunkResponse {
                    status: self.default_status,
                    ..Default::default()
                })
            }
        }
    }
}
