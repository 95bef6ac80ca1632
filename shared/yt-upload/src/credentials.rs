//! Client-secret discovery and token file pairing

use crate::{Result, UploadError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the plugin install directory
pub const PLUGIN_ROOT_ENV: &str = "CLAUDE_PLUGIN_ROOT";

/// Default value of the `--credentials` flag, treated as "not specified"
pub const DEFAULT_CREDENTIALS_NAME: &str = "credentials.json";

const TOKEN_FILE_NAME: &str = "token.json";

/// Inputs of the credentials probe, captured once so resolution is deterministic
#[derive(Debug, Clone, Default)]
pub struct CredentialSearch {
    explicit: Option<PathBuf>,
    current_dir: PathBuf,
    home_dir: Option<PathBuf>,
    plugin_root: Option<PathBuf>,
}

impl CredentialSearch {
    pub fn new(current_dir: PathBuf) -> Self {
        Self {
            explicit: None,
            current_dir,
            home_dir: None,
            plugin_root: None,
        }
    }

    /// Capture the probe inputs from the running process
    pub fn from_env(explicit: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let plugin_root = std::env::var_os(PLUGIN_ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self::new(current_dir)
            .with_explicit(explicit.map(Path::to_path_buf))
            .with_home_dir(dirs::home_dir())
            .with_plugin_root(plugin_root))
    }

    pub fn with_explicit(mut self, explicit: Option<PathBuf>) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    pub fn with_plugin_root(mut self, plugin_root: Option<PathBuf>) -> Self {
        self.plugin_root = plugin_root;
        self
    }

    /// Candidate locations in priority order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(explicit) = &self.explicit {
            if explicit.as_os_str() != DEFAULT_CREDENTIALS_NAME {
                paths.push(explicit.clone());
            }
        }

        paths.push(self.current_dir.join(DEFAULT_CREDENTIALS_NAME));

        if let Some(home) = &self.home_dir {
            paths.push(home.join(DEFAULT_CREDENTIALS_NAME));
            let youtube_dir = home.join(".config").join("youtube");
            paths.push(youtube_dir.join(DEFAULT_CREDENTIALS_NAME));
            paths.push(youtube_dir.join("client_secrets.json"));
        }

        if let Some(root) = &self.plugin_root {
            paths.push(root.join(DEFAULT_CREDENTIALS_NAME));
        }

        paths
    }

    /// Return the first candidate that exists on disk
    pub fn resolve(&self) -> Result<PathBuf> {
        let candidates = self.candidates();

        for path in &candidates {
            if path.is_file() {
                info!("🔑 Using credentials: {}", path.display());
                return Ok(path.clone());
            }
            debug!("No credentials at {}", path.display());
        }

        Err(UploadError::CredentialsNotFound {
            searched: candidates,
        })
    }
}

/// Token file paired with a credentials file.
///
/// `credentials.json` maps to a sibling `token.json`; any other name maps to
/// `<stem>.token.json`, so the token never overwrites the client secret.
pub fn token_path_for(credentials: &Path) -> PathBuf {
    let parent = credentials.parent().unwrap_or(Path::new(""));
    let file_name = credentials
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if file_name == DEFAULT_CREDENTIALS_NAME || file_name.is_empty() {
        return parent.join(TOKEN_FILE_NAME);
    }

    let stem = credentials
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(file_name);

    parent.join(format!("{}.{}", stem, TOKEN_FILE_NAME))
}
