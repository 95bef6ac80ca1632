//! YouTube Data API v3 transport

use crate::{Result, UploadError, VideoMetadata};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Status code YouTube uses for "chunk stored, keep sending"
const RESUME_INCOMPLETE: u16 = 308;

/// Video resource returned once the transfer completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedVideo {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
}

impl UploadedVideo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            snippet: None,
            status: None,
        }
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

/// Result of sending one chunk of a resumable upload
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// The server has persisted `received` bytes and expects more
    Incomplete { received: u64 },
    Complete(UploadedVideo),
}

/// The remote operations an upload needs
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// Open a resumable session and return its URI
    async fn start_session(
        &self,
        metadata: &VideoMetadata,
        content_length: u64,
        content_type: &str,
    ) -> Result<String>;

    /// Send bytes `offset..offset + chunk.len()` of a `total`-byte payload
    async fn send_chunk(
        &self,
        session_uri: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome>;

    async fn insert_playlist_item(&self, playlist_id: &str, video_id: &str) -> Result<()>;
}

/// reqwest-backed client authorized with an OAuth2 bearer token
pub struct YouTubeClient {
    client: reqwest::Client,
    access_token: String,
    upload_endpoint: String,
    api_base: String,
}

impl YouTubeClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            access_token: access_token.into(),
            upload_endpoint: UPLOAD_ENDPOINT.to_string(),
            api_base: API_BASE.to_string(),
        })
    }

    /// Point the client at another server (test doubles, proxies)
    pub fn with_endpoints(
        mut self,
        upload_endpoint: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.upload_endpoint = upload_endpoint.into();
        self.api_base = api_base.into();
        self
    }

    async fn api_error(response: reqwest::Response) -> UploadError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        UploadError::Api { status, message }
    }
}

/// Parse the `Range: bytes=0-N` header of a 308 reply into a byte count
pub fn parse_received_range(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.trim().strip_prefix("bytes="))
        .and_then(|r| r.split('-').nth(1))
        .and_then(|end| end.trim().parse::<u64>().ok())
        .map_or(0, |end| end + 1)
}

/// MIME type YouTube expects for a video container, chosen by extension
pub fn content_type_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl YouTubeApi for YouTubeClient {
    async fn start_session(
        &self,
        metadata: &VideoMetadata,
        content_length: u64,
        content_type: &str,
    ) -> Result<String> {
        debug!("Opening resumable session at {}", self.upload_endpoint);

        let response = self
            .client
            .post(&self.upload_endpoint)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Length", content_length)
            .header("X-Upload-Content-Type", content_type)
            .json(&metadata.request_body())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Api {
                status: response.status().as_u16(),
                message: "resumable session response had no Location header".to_string(),
            })
    }

    async fn send_chunk(
        &self,
        session_uri: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<ChunkOutcome> {
        let end = offset + chunk.len() as u64 - 1;
        debug!("PUT bytes {}-{}/{}", offset, end, total);

        let response = self
            .client
            .put(session_uri)
            .bearer_auth(&self.access_token)
            .header(CONTENT_LENGTH, chunk.len())
            .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, total))
            .body(chunk)
            .send()
            .await?;

        let status = response.status().as_u16();

        if status == RESUME_INCOMPLETE {
            let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
            return Ok(ChunkOutcome::Incomplete {
                received: parse_received_range(range),
            });
        }

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let video: UploadedVideo = response.json().await?;
        Ok(ChunkOutcome::Complete(video))
    }

    async fn insert_playlist_item(&self, playlist_id: &str, video_id: &str) -> Result<()> {
        let body = serde_json::json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video_id,
                },
            }
        });

        let response = self
            .client
            .post(format!("{}/playlistItems", self.api_base))
            .query(&[("part", "snippet")])
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(())
    }
}
