//! OAuth2 client secrets, cached tokens, and the installed-app authorization flow

use crate::credentials::token_path_for;
use crate::{Result, UploadError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Scope needed for `videos.insert` and `playlistItems.insert`
pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// OAuth client identity downloaded from Google Cloud Console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse the `{"installed": {...}}` or `{"web": {...}}` layout
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| UploadError::InvalidCredentials(e.to_string()))?;

        file.installed.or(file.web).ok_or_else(|| {
            UploadError::InvalidCredentials(
                "expected an \"installed\" or \"web\" client section".to_string(),
            )
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}

/// Token response from Google's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Cached session token, stored in Google's authorized-user JSON layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Build a token from a fresh token response
    pub fn from_response(
        response: TokenResponse,
        client_id: &str,
        client_secret: &str,
        token_uri: &str,
        previous_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = response
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| vec![UPLOAD_SCOPE.to_string()]);

        Self {
            token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh_token),
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expiry: response
                .expires_in
                .map(|secs| now + ChronoDuration::seconds(secs)),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => now + ChronoDuration::seconds(EXPIRY_SKEW_SECONDS) < expiry,
            None => true,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().map_or(false, |t| !t.is_empty())
    }

    /// Load a token file; unreadable or corrupt files count as absent
    pub async fn load(path: &Path) -> Option<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No cached token at {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        debug!("💾 Token saved to {}", path.display());
        Ok(())
    }
}

/// How the session token was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The cached token was still valid
    Cached,
    Refreshed,
    /// The user completed the browser consent flow
    Authorized,
}

/// Token endpoint operations, split out so the state machine can be driven offline
#[async_trait]
pub trait OAuthFlow: Send + Sync {
    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken>;

    async fn authorize_interactive(
        &self,
        secrets: &ClientSecrets,
        scopes: &[String],
    ) -> Result<StoredToken>;
}

/// Drives the cached-token state machine for one credentials file
pub struct Authenticator<F: OAuthFlow> {
    credentials_path: PathBuf,
    token_path: PathBuf,
    scopes: Vec<String>,
    flow: F,
}

impl<F: OAuthFlow> Authenticator<F> {
    pub fn new(credentials_path: PathBuf, flow: F) -> Self {
        let token_path = token_path_for(&credentials_path);
        Self {
            credentials_path,
            token_path,
            scopes: vec![UPLOAD_SCOPE.to_string()],
            flow,
        }
    }

    pub fn with_token_path(mut self, token_path: PathBuf) -> Self {
        self.token_path = token_path;
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    /// Produce a valid token, persisting it whenever it was refreshed or newly issued
    pub async fn authenticate(&self) -> Result<(StoredToken, AuthOutcome)> {
        let cached = StoredToken::load(&self.token_path).await;

        if let Some(token) = &cached {
            if token.is_valid_at(Utc::now()) {
                debug!("Using cached token from {}", self.token_path.display());
                return Ok((token.clone(), AuthOutcome::Cached));
            }

            if token.can_refresh() {
                info!("🔄 Refreshing expired access token");
                match self.flow.refresh(token).await {
                    Ok(refreshed) => {
                        refreshed.save(&self.token_path).await?;
                        return Ok((refreshed, AuthOutcome::Refreshed));
                    }
                    Err(e) => {
                        warn!("Token refresh failed, falling back to browser authorization: {}", e);
                    }
                }
            }
        }

        if !self.credentials_path.is_file() {
            return Err(UploadError::CredentialsFileMissing(self.credentials_path.clone()));
        }

        let secrets = ClientSecrets::load(&self.credentials_path).await?;
        let token = self.flow.authorize_interactive(&secrets, &self.scopes).await?;
        token.save(&self.token_path).await?;
        info!("✅ Authorization complete, token saved to {}", self.token_path.display());

        Ok((token, AuthOutcome::Authorized))
    }
}

/// Google OAuth2 endpoints with a loopback redirect listener
pub struct GoogleOAuthFlow {
    client: reqwest::Client,
}

impl GoogleOAuthFlow {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn exchange(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.client.post(token_uri).form(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(UploadError::Auth(format!("token endpoint returned {}: {}", status, text)));
        }

        Ok(response.json().await?)
    }

    /// Consent URL for the installed-app flow
    pub fn authorization_url(
        secrets: &ClientSecrets,
        scopes: &[String],
        redirect_uri: &str,
        state: &str,
    ) -> Result<url::Url> {
        let scope = scopes.join(" ");
        url::Url::parse_with_params(
            &secrets.auth_uri,
            &[
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| UploadError::InvalidCredentials(format!("bad auth_uri: {}", e)))
    }

    /// Wait for the browser to hit the loopback listener and return the authorization code
    async fn await_callback(listener: TcpListener, expected_state: &str) -> Result<String> {
        let (mut stream, peer) = listener.accept().await?;
        debug!("OAuth callback connection from {}", peer);

        let (reader, mut writer) = stream.split();
        let mut request_line = String::new();
        BufReader::new(reader).read_line(&mut request_line).await?;

        let result = parse_callback(&request_line, expected_state);

        let page = match &result {
            Ok(_) => "The authentication flow has completed. You may close this window.",
            Err(_) => "Authorization failed. Return to the terminal for details.",
        };
        let reply = format!(
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            page.len(),
            page
        );
        writer.write_all(reply.as_bytes()).await?;
        writer.shutdown().await?;

        result
    }
}

/// Extract the authorization code from a `GET /?code=...&state=... HTTP/1.1` request line
pub fn parse_callback(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| UploadError::Auth("malformed callback request".to_string()))?;

    let url = url::Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(|e| UploadError::Auth(format!("malformed callback URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(UploadError::Auth(format!("authorization denied: {}", value))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(UploadError::Auth("state mismatch in OAuth callback".to_string()));
    }

    code.ok_or_else(|| UploadError::Auth("callback carried no authorization code".to_string()))
}

#[async_trait]
impl OAuthFlow for GoogleOAuthFlow {
    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| UploadError::Auth("token has no refresh_token".to_string()))?;

        let response = self
            .exchange(
                &token.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("client_id", token.client_id.as_str()),
                    ("client_secret", token.client_secret.as_str()),
                ],
            )
            .await?;

        Ok(StoredToken::from_response(
            response,
            &token.client_id,
            &token.client_secret,
            &token.token_uri,
            Some(refresh_token),
            Utc::now(),
        ))
    }

    async fn authorize_interactive(
        &self,
        secrets: &ClientSecrets,
        scopes: &[String],
    ) -> Result<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://localhost:{}/", port);
        let state = uuid::Uuid::new_v4().simple().to_string();

        let auth_url = Self::authorization_url(secrets, scopes, &redirect_uri, &state)?;
        info!("🌐 Open this URL in your browser to authorize uploads:");
        eprintln!("\n    {}\n", auth_url);

        let code = Self::await_callback(listener, &state).await?;

        let response = self
            .exchange(
                &secrets.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                ],
            )
            .await?;

        Ok(StoredToken::from_response(
            response,
            &secrets.client_id,
            &secrets.client_secret,
            &secrets.token_uri,
            None,
            Utc::now(),
        ))
    }
}
