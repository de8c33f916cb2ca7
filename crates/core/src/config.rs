//! Client configuration types.

use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_TYPE, Error, MAX_UPLOAD_BYTES, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client configuration, usually loaded from `config.toml`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Profile used when none is named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Retries for idempotent API reads on transport errors and 5xx.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds; later retries double it.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upload limits and chunking.
    #[serde(default)]
    pub upload: UploadPolicy,
    /// Named API endpoints and credentials.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

/// One API endpoint and its bearer token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub api_url: String,
    pub token: String,
    /// Athlete whose progress is shown by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub athlete_id: Option<String>,
}

/// Pre-conditions and chunking for uploads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Bytes per chunk request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Largest accepted file.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// MIME type used when the file reports none.
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_upload_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_profile: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            upload: UploadPolicy::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_upload_bytes: default_max_upload_bytes(),
            default_content_type: default_content_type(),
        }
    }
}

impl ClientConfig {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile)> {
        let name = name
            .or(self.default_profile.as_deref())
            .ok_or_else(|| Error::Config("no profile specified and no default_profile set".into()))?;
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| Error::Config(format!("profile '{name}' not found in client config")))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.upload.validate()?;
        for (name, profile) in &self.profiles {
            if !profile.api_url.starts_with("http://") && !profile.api_url.starts_with("https://")
            {
                return Err(Error::Config(format!(
                    "profile '{name}': api_url must start with http:// or https://"
                )));
            }
        }
        Ok(())
    }
}

impl UploadPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize(0));
        }
        Ok(())
    }

    /// Check a file against the upload pre-conditions.
    ///
    /// Returns the content type to send, substituting the default when
    /// `content_type` is empty.
    pub fn check(&self, filename: &str, content_type: &str, size: u64) -> Result<String> {
        validate_filename(filename)?;
        let content_type = if content_type.trim().is_empty() {
            self.default_content_type.clone()
        } else {
            content_type.trim().to_string()
        };
        if !content_type.starts_with("video/") {
            return Err(Error::UnsupportedMediaType(content_type));
        }
        if size > self.max_upload_bytes {
            return Err(Error::FileTooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }
        Ok(content_type)
    }
}

/// Accept plain names of `[A-Za-z0-9._-]`, rejecting paths and empty names.
///
/// Surrounding whitespace is ignored; the trimmed name is returned.
pub fn validate_filename(filename: &str) -> Result<&str> {
    let name = filename.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    let safe = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !safe {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(name)
}
