//! Upload glue between the command line and `yt_upload`

use crate::config::UploadConfig;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use yt_upload::{
    AuthOutcome, Authenticator, Category, CredentialSearch, GoogleOAuthFlow, Privacy, UploadRequest,
    UploadResult, Uploader, VideoMetadata, YouTubeClient,
};

/// Parsed `upload` arguments
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub file: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    pub category: Category,
    pub publish_at: Option<String>,
    /// Value of `--credentials`; the bare default name means "search"
    pub credentials: PathBuf,
    pub playlist: Option<String>,
}

impl PublishOptions {
    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata::new(self.title.clone())
            .with_description(self.description.clone())
            .with_tags(self.tags.clone())
            .with_category(self.category)
            .with_privacy(self.privacy)
            .with_publish_at(self.publish_at.clone())
    }

    pub fn request(&self) -> UploadRequest {
        UploadRequest::new(self.file.clone(), self.metadata()).with_playlist(self.playlist.clone())
    }
}

/// Resolve credentials, authorize, and upload
pub async fn publish(options: &PublishOptions, config: &UploadConfig) -> Result<UploadResult> {
    let request = options.request();
    if !request.file.is_file() {
        return Err(yt_upload::UploadError::FileNotFound(request.file.clone()).into());
    }
    request.metadata.validate()?;

    let credentials = CredentialSearch::from_env(Some(options.credentials.as_path()))?.resolve()?;
    info!("🔑 Using credentials: {}", credentials.display());

    let timeout = Duration::from_secs(config.timeout_seconds);
    let authenticator = Authenticator::new(credentials, GoogleOAuthFlow::new(timeout)?);
    let (token, outcome) = authenticator.authenticate().await?;
    if outcome != AuthOutcome::Cached {
        info!("🔐 Token stored at {}", authenticator.token_path().display());
    }

    let client = YouTubeClient::new(token.token, timeout)?;
    let uploader = Uploader::new(client)
        .with_policy(config.retry_policy())
        .with_chunk_size(config.chunk_size);

    Ok(uploader.upload(&request).await?)
}
