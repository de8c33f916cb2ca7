use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use serde::{Deserialize, de::DeserializeOwned};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use throwpro_core::cache::{FeatureCache, FeatureQuery};
use throwpro_core::transfer::resumable_put;
use throwpro_core::upload::{ChunkRange, InitUploadRequest, InitUploadResponse};
use throwpro_core::{
    AbortSignal, ByteSource, ChunkResponse, ChunkSink, CurveKind, FeatureCurves, FileSource,
    ProgressPage, ProgressQuery, UploadPolicy, UploadReport, validate_filename,
};

/// Default number of retries for idempotent reads.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound on pages followed by [`ApiClient::fetch_all_progress`].
const MAX_PROGRESS_PAGES: usize = 1000;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
    retry_base_delay: Duration,
    cache: Arc<FeatureCache>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_secs(1),
            cache: Arc::new(FeatureCache::new()),
        })
    }

    /// Retries for idempotent reads on transport errors and 5xx.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// First retry delay; later retries double it.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Endpoint under the base URL. Each segment is percent-encoded, so an
    /// ID containing `/`, `?` or `#` stays a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).context("failed to build API URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = req
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("{what} request failed"))?;
        read_json(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let response = retry_request(self.max_retries, self.retry_base_delay, || {
            self.http.get(url.clone()).bearer_auth(&self.token).send()
        })
        .await
        .with_context(|| format!("{what} request failed"))?;
        read_json(response, what).await
    }

    /// Open a resumable upload session for `filename`.
    pub async fn init_upload(&self, req: &InitUploadRequest) -> Result<InitUploadResponse> {
        let url = self.url(&["uploads", "init"])?;
        self.send_json(self.http.post(url).json(req), "upload init")
            .await
    }

    /// Check, register and upload a local video.
    ///
    /// Pre-conditions are enforced before any request. Chunks go to the
    /// pre-signed URL returned by the init call.
    pub async fn upload_file<F>(
        &self,
        path: &Path,
        content_type: Option<&str>,
        policy: &UploadPolicy,
        abort: &AbortSignal,
        on_progress: F,
    ) -> Result<UploadedSession>
    where
        F: FnMut(u64, u64),
    {
        policy.validate()?;
        let source = FileSource::open(path, content_type)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let filename = validate_filename(&source.file_name())?.to_string();
        let content_type = policy.check(&filename, source.content_type(), source.len())?;
        let source = source.with_content_type(content_type.clone());

        let init = self
            .init_upload(&InitUploadRequest {
                filename,
                content_type,
            })
            .await?;
        tracing::info!(session_id = %init.session_id, bytes = source.len(), "Upload session opened");

        let sink = ChunkUploader::new(self.http.clone(), &init.upload_url)?;
        let report = resumable_put(&source, &sink, policy.chunk_size, abort, on_progress).await?;
        tracing::info!(
            session_id = %init.session_id,
            bytes = report.bytes_sent,
            requests = report.requests,
            "Upload complete"
        );

        Ok(UploadedSession {
            session_id: init.session_id,
            gs_uri: init.gs_uri,
            report,
        })
    }

    /// Feature curves for a session, served from the cache when possible.
    pub async fn fetch_features(
        &self,
        session_id: &str,
        curves: &[CurveKind],
    ) -> Result<Arc<FeatureCurves>> {
        let query = FeatureQuery::new(session_id, curves);
        if let Some(cached) = self.cache.get(&query) {
            tracing::debug!(session_id, "Feature cache hit");
            return Ok(cached);
        }

        let mut url = self.url(&["sessions", path_id(session_id, "session id")?, "features"])?;
        url.query_pairs_mut()
            .append_pair("v", "2")
            .append_pair("curves", &CurveKind::join(&query.curves));
        let features: FeatureCurves = self.get_json(url, "features").await?;
        Ok(self.cache.insert(query, features))
    }

    /// Fetch session A and, if given, session B concurrently.
    pub async fn compare(
        &self,
        a: &str,
        b: Option<&str>,
        curves: &[CurveKind],
    ) -> Result<(Arc<FeatureCurves>, Option<Arc<FeatureCurves>>)> {
        let fetch_b = async {
            match b {
                Some(b) => self.fetch_features(b, curves).await.map(Some),
                None => Ok(None),
            }
        };
        tokio::try_join!(self.fetch_features(a, curves), fetch_b)
    }

    pub async fn fetch_progress(
        &self,
        athlete_id: &str,
        query: &ProgressQuery,
    ) -> Result<ProgressPage> {
        let mut url = self.url(&["athletes", path_id(athlete_id, "athlete id")?, "progress"])?;
        let pairs = query.to_query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        self.get_json(url, "progress").await
    }

    /// Follow `next_cursor` until the history is exhausted.
    ///
    /// A page may come back with no items but a cursor when the backend
    /// filtered every session on it, so only the cursor decides when to stop.
    pub async fn fetch_all_progress(
        &self,
        athlete_id: &str,
        query: &ProgressQuery,
    ) -> Result<ProgressPage> {
        let mut query = query.clone();
        let mut all = ProgressPage::default();
        for _ in 0..MAX_PROGRESS_PAGES {
            let page = self.fetch_progress(athlete_id, &query).await?;
            all.items.extend(page.items);
            match page.next_cursor {
                Some(next) if query.cursor.as_deref() != Some(next.as_str()) => {
                    query.cursor = Some(next);
                }
                _ => return Ok(all),
            }
        }
        tracing::warn!(athlete_id, "Progress paging stopped at page limit");
        Ok(all)
    }

    /// Re-queue processing of a session.
    pub async fn retry_session(&self, session_id: &str) -> Result<OkResponse> {
        let url = self.url(&["sessions", path_id(session_id, "session id")?, "retry"])?;
        let response = self
            .send_json(self.http.post(url), "session retry")
            .await?;
        self.cache.invalidate(session_id);
        Ok(response)
    }

    pub async fn admin_me(&self) -> Result<AdminMeResponse> {
        let url = self.url(&["admin", "me"])?;
        self.get_json(url, "admin check").await
    }

    pub async fn health(&self) -> Result<OkResponse> {
        let url = self.url(&["healthz"])?;
        self.get_json(url, "health").await
    }
}

/// Reject IDs that would be dropped or resolved as dot segments.
fn path_id<'a>(id: &'a str, what: &str) -> Result<&'a str> {
    if id.is_empty() || id == "." || id == ".." {
        anyhow::bail!("invalid {what}: {id:?}");
    }
    Ok(id)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("{what} failed ({}): {}", status.as_u16(), body);
    }
    serde_json::from_str(&body).with_context(|| format!("invalid {what} response"))
}

/// Retries an HTTP request with exponential backoff on transient failures.
///
/// Retries on transport errors and 5xx responses. Returns immediately on
/// success or 4xx (client errors that won't resolve with retries).
async fn retry_request<F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut make_request: F,
) -> reqwest::Result<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
{
    let mut attempt = 0;

    loop {
        match make_request().await {
            Ok(response) if response.status().is_server_error() => {
                attempt += 1;
                if attempt > max_retries {
                    return Ok(response);
                }
                let delay = base_delay * 2u32.pow((attempt - 1).min(10));
                tracing::warn!(
                    status = response.status().as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(e);
                }
                let delay = base_delay * 2u32.pow((attempt - 1).min(10));
                tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "Request error, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Writes chunks to a pre-signed resumable upload URL.
///
/// The URL carries its own authorization, so no bearer token is sent.
pub struct ChunkUploader {
    http: reqwest::Client,
    url: Url,
}

impl ChunkUploader {
    pub fn new(http: reqwest::Client, upload_url: &str) -> Result<Self> {
        let url = Url::parse(upload_url).context("invalid upload URL")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl ChunkSink for ChunkUploader {
    async fn put_chunk(
        &self,
        range: &ChunkRange,
        content_type: &str,
        body: Bytes,
    ) -> throwpro_core::Result<ChunkResponse> {
        let response = self
            .http
            .put(self.url.clone())
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_RANGE, range.content_range())
            .body(body)
            .send()
            .await
            .map_err(|e| throwpro_core::Error::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let range = response
            .headers()
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Ok(ChunkResponse {
            status,
            range,
            body,
        })
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug)]
pub struct UploadedSession {
    pub session_id: String,
    pub gs_uri: Option<String>,
    pub report: UploadReport,
}

#[derive(Debug, Deserialize)]
pub struct OkResponse {
    #[serde(default)]
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdminMeResponse {
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}
