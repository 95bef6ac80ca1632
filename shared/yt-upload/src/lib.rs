//! YT Upload - YouTube Data API v3 uploads for finished narration videos
//!
//! Credential discovery, the OAuth2 token lifecycle, resumable chunked
//! transfer with bounded retry, and playlist attachment.

pub mod api;
pub mod credentials;
pub mod metadata;
pub mod oauth;
pub mod retry;
pub mod uploader;

pub use api::{ChunkOutcome, UploadedVideo, YouTubeApi, YouTubeClient};
pub use credentials::{token_path_for, CredentialSearch, PLUGIN_ROOT_ENV};
pub use metadata::{parse_tags, Category, Privacy, VideoMetadata};
pub use oauth::{AuthOutcome, Authenticator, ClientSecrets, GoogleOAuthFlow, OAuthFlow, StoredToken};
pub use retry::RetryPolicy;
pub use uploader::{PlaylistOutcome, UploadRequest, UploadResult, Uploader};

use std::path::PathBuf;

/// Result type for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

/// Error types for upload operations
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error(
        "credentials.json not found in any of the following locations:\n{}",
        format_searched(.searched)
    )]
    CredentialsNotFound { searched: Vec<PathBuf> },

    #[error("Credentials file not found: {0}\nPlease download it from Google Cloud Console.")]
    CredentialsFileMissing(PathBuf),

    #[error("Invalid credentials file: {0}")]
    InvalidCredentials(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Video file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Video file is empty: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid video metadata: {0}")]
    InvalidMetadata(String),

    #[error("YouTube API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Gave up after {attempts} attempts, last status {status}")]
    RetriesExhausted { attempts: u32, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// HTTP status carried by the error, if it came from the remote API
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Api { status, .. } => Some(*status),
            UploadError::RetriesExhausted { status, .. } => Some(*status),
            UploadError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error was reported by the YouTube API rather than locally
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            UploadError::Api { .. } | UploadError::RetriesExhausted { .. } | UploadError::Http(_)
        )
    }
}

fn format_searched(searched: &[PathBuf]) -> String {
    let listed = searched
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nPlace credentials.json in one of these locations:\n  \
         1. Current project directory: ./credentials.json\n  \
         2. Home directory: ~/credentials.json\n  \
         3. Config directory: ~/.config/youtube/credentials.json\n  \
         4. Plugin directory: ${{{}}}/credentials.json\n\
         Or specify the path with --credentials.",
        listed, PLUGIN_ROOT_ENV
    )
}
