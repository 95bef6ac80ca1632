use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;
use yt_upload::{
    parse_tags, token_path_for, AuthOutcome, Authenticator, Category, ChunkOutcome, ClientSecrets,
    CredentialSearch, OAuthFlow, PlaylistOutcome, Privacy, Result, RetryPolicy, StoredToken,
    UploadError, UploadRequest, UploadedVideo, Uploader, VideoMetadata, YouTubeApi,
};

const CLIENT_SECRETS: &str = r#"{"installed":{
    "client_id":"cid.apps.googleusercontent.com",
    "client_secret":"cs",
    "redirect_uris":["http://localhost"]
}}"#;

/// Scripted stand-in for the YouTube API
struct MockApi {
    chunk_replies: Mutex<VecDeque<Result<ChunkOutcome>>>,
    playlist_reply: Mutex<Option<Result<()>>>,
    sessions: AtomicU32,
    chunks: AtomicU32,
    sent_offsets: Mutex<Vec<u64>>,
}

impl MockApi {
    fn new(chunk_replies: Vec<Result<ChunkOutcome>>) -> Self {
        Self {
            chunk_replies: Mutex::new(chunk_replies.into()),
            playlist_reply: Mutex::new(None),
            sessions: AtomicU32::new(0),
            chunks: AtomicU32::new(0),
            sent_offsets: Mutex::new(Vec::new()),
        }
    }

    fn with_playlist_reply(self, reply: Result<()>) -> Self {
        *self.playlist_reply.lock().unwrap() = Some(reply);
        self
    }
}

fn api_error(status: u16) -> UploadError {
    UploadError::Api {
        status,
        message: format!("status {}", status),
    }
}

fn complete(id: &str) -> Result<ChunkOutcome> {
    Ok(ChunkOutcome::Complete(UploadedVideo::new(id)))
}

#[async_trait]
impl YouTubeApi for MockApi {
    async fn start_session(
        &self,
        _metadata: &VideoMetadata,
        _len: u64,
        _content_type: &str,
    ) -> Result<String> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok("https://upload.example/session/1".to_string())
    }

    async fn send_chunk(
        &self,
        _session: &str,
        _chunk: Vec<u8>,
        offset: u64,
        _total: u64,
    ) -> Result<ChunkOutcome> {
        self.chunks.fetch_add(1, Ordering::SeqCst);
        self.sent_offsets.lock().unwrap().push(offset);
        self.chunk_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(400)))
    }

    async fn insert_playlist_item(&self, _playlist_id: &str, _video_id: &str) -> Result<()> {
        self.playlist_reply.lock().unwrap().take().unwrap_or(Ok(()))
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(5, Duration::ZERO)
}

async fn video_file(dir: &TempDir, size: usize) -> PathBuf {
    let path = dir.path().join("final.mp4");
    fs::write(&path, vec![7u8; size]).await.unwrap();
    path
}

#[tokio::test]
async fn test_transient_errors_are_retried_until_success() {
    let temp_dir = TempDir::new().unwrap();
    let file = video_file(&temp_dir, 1024).await;

    let api = MockApi::new(vec![Err(api_error(503)), Err(api_error(503)), complete("vid123")]);
    let uploader = Uploader::new(api).with_policy(fast_policy());

    let result = uploader
        .upload(&UploadRequest::new(file, VideoMetadata::new("Lesson 1")))
        .await
        .unwrap();

    assert_eq!(result.video_id(), "vid123");
    assert_eq!(result.url, "https://www.youtube.com/watch?v=vid123");
    assert_eq!(uploader.api().chunks.load(Ordering::SeqCst), 3);
    assert!(result.playlist.is_none());
}

#[tokio::test]
async fn test_non_retryable_error_aborts_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let file = video_file(&temp_dir, 1024).await;

    let api = MockApi::new(vec![Err(api_error(404)), complete("never")]);
    let uploader = Uploader::new(api).with_policy(fast_policy());

    let err = uploader
        .upload(&UploadRequest::new(file, VideoMetadata::new("Lesson 1")))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Api { status: 404, .. }));
    assert_eq!(uploader.api().chunks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let temp_dir = TempDir::new().unwrap();
    let file = video_file(&temp_dir, 1024).await;

    let replies = (0..10).map(|_| Err(api_error(500))).collect();
    let uploader =
        Uploader::new(MockApi::new(replies)).with_policy(RetryPolicy::new(4, Duration::ZERO));

    let err = uploader
        .upload(&UploadRequest::new(file, VideoMetadata::new("Lesson 1")))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::RetriesExhausted { attempts: 4, status: 500 }));
    assert_eq!(uploader.api().chunks.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_multi_chunk_upload_follows_server_offsets() {
    let temp_dir = TempDir::new().unwrap();
    let chunk = 256 * 1024;
    let file = video_file(&temp_dir, chunk * 2 + 100).await;

    let api = MockApi::new(vec![
        Ok(ChunkOutcome::Incomplete { received: chunk as u64 }),
        Err(api_error(502)),
        Ok(ChunkOutcome::Incomplete { received: (chunk * 2) as u64 }),
        complete("multi"),
    ]);
    let uploader = Uploader::new(api).with_policy(fast_policy());

    let result = uploader
        .upload(&UploadRequest::new(file, VideoMetadata::new("Long one")))
        .await
        .unwrap();

    assert_eq!(result.video_id(), "multi");
    let offsets = uploader.api().sent_offsets.lock().unwrap().clone();
    assert_eq!(offsets, vec![0, chunk as u64, chunk as u64, (chunk * 2) as u64]);
}

#[tokio::test]
async fn test_missing_file_fails_before_any_network_call() {
    let temp_dir = TempDir::new().unwrap();
    let uploader = Uploader::new(MockApi::new(vec![complete("x")]));

    let err = uploader
        .upload(&UploadRequest::new(temp_dir.path().join("missing.mp4"), VideoMetadata::new("t")))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::FileNotFound(_)));
    assert_eq!(uploader.api().sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_playlist_failure_does_not_fail_upload() {
    let temp_dir = TempDir::new().unwrap();
    let file = video_file(&temp_dir, 10).await;

    let api = MockApi::new(vec![complete("vid9")]).with_playlist_reply(Err(api_error(403)));
    let uploader = Uploader::new(api).with_policy(fast_policy());

    let request =
        UploadRequest::new(file, VideoMetadata::new("t")).with_playlist(Some("PLabc".to_string()));
    let result = uploader.upload(&request).await.unwrap();

    assert_eq!(result.video_id(), "vid9");
    assert!(matches!(result.playlist, Some(PlaylistOutcome::Failed(_))));
}

#[tokio::test]
async fn test_playlist_success_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let file = video_file(&temp_dir, 10).await;

    let uploader = Uploader::new(MockApi::new(vec![complete("vid9")])).with_policy(fast_policy());
    let request =
        UploadRequest::new(file, VideoMetadata::new("t")).with_playlist(Some("PLabc".to_string()));
    let result = uploader.upload(&request).await.unwrap();

    assert_eq!(result.playlist, Some(PlaylistOutcome::Added("PLabc".to_string())));
}

#[test]
fn test_request_body_from_cli_style_inputs() {
    let metadata = VideoMetadata::new("Fourier series")
        .with_tags(parse_tags("a,b,c"))
        .with_category("27".parse::<Category>().unwrap())
        .with_privacy("public".parse::<Privacy>().unwrap());

    let body = metadata.request_body();
    assert_eq!(body["snippet"]["tags"], serde_json::json!(["a", "b", "c"]));
    assert_eq!(body["snippet"]["categoryId"], serde_json::json!("27"));
    assert_eq!(body["status"]["privacyStatus"], serde_json::json!("public"));
}

#[test]
fn test_request_body_with_schedule() {
    let body = VideoMetadata::new("t")
        .with_publish_at(Some("2025-01-15T15:30:00Z".to_string()))
        .request_body();
    assert_eq!(body["status"]["publishAt"], "2025-01-15T15:30:00Z");
}

#[test]
fn test_chunk_size_rounds_to_alignment() {
    let uploader = Uploader::new(MockApi::new(vec![])).with_chunk_size(300 * 1024);
    assert_eq!(uploader.chunk_size(), 512 * 1024);
}

// Credential resolution

fn search_in(temp_dir: &TempDir) -> CredentialSearch {
    CredentialSearch::new(temp_dir.path().join("project"))
        .with_home_dir(Some(temp_dir.path().join("home")))
        .with_plugin_root(Some(temp_dir.path().join("plugin")))
}

async fn touch(path: &PathBuf) {
    fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    fs::write(path, CLIENT_SECRETS).await.unwrap();
}

#[tokio::test]
async fn test_credentials_not_found_lists_every_candidate() {
    let temp_dir = TempDir::new().unwrap();
    let search = search_in(&temp_dir).with_explicit(Some(temp_dir.path().join("custom.json")));

    match search.resolve() {
        Err(UploadError::CredentialsNotFound { searched }) => {
            assert_eq!(searched.len(), 6);
            assert_eq!(searched[0], temp_dir.path().join("custom.json"));
            assert_eq!(searched[5], temp_dir.path().join("plugin/credentials.json"));
        }
        other => panic!("expected CredentialsNotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_credentials_priority_order() {
    let temp_dir = TempDir::new().unwrap();
    let plugin = temp_dir.path().join("plugin/credentials.json");
    let secrets = temp_dir.path().join("home/.config/youtube/client_secrets.json");
    let config = temp_dir.path().join("home/.config/youtube/credentials.json");
    let home = temp_dir.path().join("home/credentials.json");
    let project = temp_dir.path().join("project/credentials.json");
    let explicit = temp_dir.path().join("mine.json");

    touch(&plugin).await;
    assert_eq!(search_in(&temp_dir).resolve().unwrap(), plugin);

    touch(&secrets).await;
    assert_eq!(search_in(&temp_dir).resolve().unwrap(), secrets);

    touch(&config).await;
    assert_eq!(search_in(&temp_dir).resolve().unwrap(), config);

    touch(&home).await;
    assert_eq!(search_in(&temp_dir).resolve().unwrap(), home);

    touch(&project).await;
    assert_eq!(search_in(&temp_dir).resolve().unwrap(), project);

    touch(&explicit).await;
    let search = search_in(&temp_dir).with_explicit(Some(explicit.clone()));
    assert_eq!(search.resolve().unwrap(), explicit);
}

// Token state machine

#[derive(Default)]
struct CountingFlow {
    refreshes: AtomicU32,
    interactive: AtomicU32,
    refresh_fails: bool,
}

fn issued_token(access: &str) -> StoredToken {
    StoredToken {
        token: access.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        client_id: "cid".to_string(),
        client_secret: "cs".to_string(),
        scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
        expiry: Some(Utc::now() + ChronoDuration::hours(1)),
    }
}

#[async_trait]
impl OAuthFlow for CountingFlow {
    async fn refresh(&self, _token: &StoredToken) -> Result<StoredToken> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails {
            Err(UploadError::Auth("invalid_grant".to_string()))
        } else {
            Ok(issued_token("refreshed"))
        }
    }

    async fn authorize_interactive(
        &self,
        secrets: &ClientSecrets,
        _scopes: &[String],
    ) -> Result<StoredToken> {
        assert_eq!(secrets.client_id, "cid.apps.googleusercontent.com");
        self.interactive.fetch_add(1, Ordering::SeqCst);
        Ok(issued_token("interactive"))
    }
}

async fn credentials_file(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("credentials.json");
    fs::write(&path, CLIENT_SECRETS).await.unwrap();
    path
}

#[tokio::test]
async fn test_valid_cached_token_skips_interactive_flow() {
    let temp_dir = TempDir::new().unwrap();
    let creds = credentials_file(&temp_dir).await;
    issued_token("cached").save(&token_path_for(&creds)).await.unwrap();

    let auth = Authenticator::new(creds, CountingFlow::default());
    let (token, outcome) = auth.authenticate().await.unwrap();

    assert_eq!(outcome, AuthOutcome::Cached);
    assert_eq!(token.token, "cached");
    assert_eq!(auth_flow_counts(&auth), (0, 0));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let creds = credentials_file(&temp_dir).await;
    let mut expired = issued_token("old");
    expired.expiry = Some(Utc::now() - ChronoDuration::hours(1));
    expired.save(&token_path_for(&creds)).await.unwrap();

    let auth = Authenticator::new(creds.clone(), CountingFlow::default());
    let (token, outcome) = auth.authenticate().await.unwrap();

    assert_eq!(outcome, AuthOutcome::Refreshed);
    assert_eq!(token.token, "refreshed");
    assert_eq!(auth_flow_counts(&auth), (1, 0));

    let saved = StoredToken::load(&token_path_for(&creds)).await.unwrap();
    assert_eq!(saved.token, "refreshed");
}

#[tokio::test]
async fn test_failed_refresh_falls_back_to_interactive() {
    let temp_dir = TempDir::new().unwrap();
    let creds = credentials_file(&temp_dir).await;
    let mut expired = issued_token("old");
    expired.expiry = Some(Utc::now() - ChronoDuration::hours(1));
    expired.save(&token_path_for(&creds)).await.unwrap();

    let flow = CountingFlow {
        refresh_fails: true,
        ..Default::default()
    };
    let auth = Authenticator::new(creds.clone(), flow);
    let (token, outcome) = auth.authenticate().await.unwrap();

    assert_eq!(outcome, AuthOutcome::Authorized);
    assert_eq!(token.token, "interactive");
    assert_eq!(auth_flow_counts(&auth), (1, 1));
    assert_eq!(StoredToken::load(&token_path_for(&creds)).await.unwrap().token, "interactive");
}

#[tokio::test]
async fn test_no_token_runs_interactive_flow() {
    let temp_dir = TempDir::new().unwrap();
    let creds = credentials_file(&temp_dir).await;

    let auth = Authenticator::new(creds.clone(), CountingFlow::default());
    let (_, outcome) = auth.authenticate().await.unwrap();

    assert_eq!(outcome, AuthOutcome::Authorized);
    assert_eq!(auth_flow_counts(&auth), (0, 1));
    assert!(token_path_for(&creds).exists());
}

#[tokio::test]
async fn test_missing_credentials_file_at_auth_time() {
    let temp_dir = TempDir::new().unwrap();
    let creds = temp_dir.path().join("credentials.json");

    let auth = Authenticator::new(creds, CountingFlow::default());
    let err = auth.authenticate().await.unwrap_err();

    assert!(matches!(err, UploadError::CredentialsFileMissing(_)));
}

fn auth_flow_counts(auth: &Authenticator<CountingFlow>) -> (u32, u32) {
    let flow = auth.flow();
    (
        flow.refreshes.load(Ordering::SeqCst),
        flow.interactive.load(Ordering::SeqCst),
    )
}
