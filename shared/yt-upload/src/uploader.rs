//! Resumable chunked upload of a finished video

use crate::api::{content_type_for, ChunkOutcome, UploadedVideo, YouTubeApi};
use crate::{Result, RetryPolicy, UploadError, VideoMetadata};
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

/// YouTube requires chunk sizes in multiples of 256 KiB
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// A video file and the metadata it should be published with
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: PathBuf,
    pub metadata: VideoMetadata,
    pub playlist_id: Option<String>,
}

impl UploadRequest {
    pub fn new(file: PathBuf, metadata: VideoMetadata) -> Self {
        Self {
            file,
            metadata,
            playlist_id: None,
        }
    }

    pub fn with_playlist(mut self, playlist_id: Option<String>) -> Self {
        self.playlist_id = playlist_id;
        self
    }
}

/// Result of the optional playlist attach
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistOutcome {
    Added(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub video: UploadedVideo,
    pub url: String,
    pub playlist: Option<PlaylistOutcome>,
}

impl UploadResult {
    pub fn video_id(&self) -> &str {
        &self.video.id
    }
}

/// Uploads files through a [`YouTubeApi`] with per-chunk retry
pub struct Uploader<A: YouTubeApi> {
    api: A,
    policy: RetryPolicy,
    chunk_size: usize,
}

impl<A: YouTubeApi> Uploader<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            policy: RetryPolicy::default(),
            chunk_size: CHUNK_ALIGNMENT,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Chunk size, rounded up to the next 256 KiB multiple
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        let chunks = chunk_size.max(1).div_ceil(CHUNK_ALIGNMENT);
        self.chunk_size = chunks * CHUNK_ALIGNMENT;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResult> {
        let path = &request.file;
        let file_size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(UploadError::FileNotFound(path.clone())),
        };
        if file_size == 0 {
            return Err(UploadError::EmptyFile(path.clone()));
        }

        request.metadata.validate()?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("📹 Uploading: {} ({:.1} MB)", name, file_size as f64 / (1024.0 * 1024.0));

        let content_type = content_type_for(path);
        let session = self
            .policy
            .run("session start", || {
                self.api.start_session(&request.metadata, file_size, content_type)
            })
            .await?;
        debug!("Resumable session opened");

        let video = self.transfer(request, &session, file_size).await?;

        let url = video.watch_url();
        info!("✅ Upload successful! Video ID: {}", video.id);
        info!("   URL: {}", url);

        let playlist = match &request.playlist_id {
            Some(playlist_id) => Some(self.add_to_playlist(&video.id, playlist_id).await),
            None => None,
        };

        Ok(UploadResult { video, url, playlist })
    }

    async fn transfer(
        &self,
        request: &UploadRequest,
        session: &str,
        total: u64,
    ) -> Result<UploadedVideo> {
        let mut file = tokio::fs::File::open(&request.file).await?;
        let mut offset = 0u64;
        let mut last_percent = None;
        let mut stalled = 0u32;

        loop {
            let remaining = total.saturating_sub(offset);
            if remaining == 0 {
                return Err(UploadError::Api {
                    status: 308,
                    message: "server acknowledged every byte but never returned the video"
                        .to_string(),
                });
            }

            let len = remaining.min(self.chunk_size as u64) as usize;
            let mut chunk = vec![0u8; len];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;

            let outcome = self
                .policy
                .run("chunk upload", || self.api.send_chunk(session, chunk.clone(), offset, total))
                .await?;

            match outcome {
                ChunkOutcome::Complete(video) => return Ok(video),
                ChunkOutcome::Incomplete { received } => {
                    if received <= offset {
                        stalled += 1;
                        if stalled >= self.policy.max_attempts {
                            return Err(UploadError::Api {
                                status: 308,
                                message: format!("upload stalled at byte {} of {}", offset, total),
                            });
                        }
                        warn!("Server stored no new bytes past {}, resending from there", received);
                    } else {
                        stalled = 0;
                    }
                    offset = received.min(total);

                    let percent = (offset as f64 / total as f64 * 100.0) as u32;
                    if last_percent != Some(percent) {
                        info!("⏳ Progress: {}%", percent);
                        last_percent = Some(percent);
                    }
                }
            }
        }
    }

    /// Attach the uploaded video to a playlist; failures are reported, never raised
    pub async fn add_to_playlist(&self, video_id: &str, playlist_id: &str) -> PlaylistOutcome {
        match self.api.insert_playlist_item(playlist_id, video_id).await {
            Ok(()) => {
                info!("✅ Added to playlist: {}", playlist_id);
                PlaylistOutcome::Added(playlist_id.to_string())
            }
            Err(e) => {
                warn!("⚠️  Could not add to playlist {}: {}", playlist_id, e);
                PlaylistOutcome::Failed(e.to_string())
            }
        }
    }
}
