//! Server endpoint derivation.
//!
//! The processing server is reached through a zrok reserved share: the user
//! only types the share name and both endpoints are derived from it.

use std::fmt;

/// Share name used until the user sets their own.
pub const DEFAULT_TARGET: &str = "splatscan777scapp777";

/// Public zrok share domain.
pub const ZROK_SHARE_DOMAIN: &str = "share.zrok.io";

/// Errors from building an [`UploadTarget`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target name is empty")]
    Empty,

    #[error("invalid character {0:?} in target name")]
    InvalidCharacter(char),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

/// The server a run talks to. Both endpoints share one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    name: String,
    root: String,
}

impl Default for UploadTarget {
    fn default() -> Self {
        Self {
            name: DEFAULT_TARGET.into(),
            root: zrok_root(DEFAULT_TARGET),
        }
    }
}

impl UploadTarget {
    /// Target for a zrok reserved share: `https://{name}.share.zrok.io`.
    pub fn zrok(name: &str) -> Result<Self, TargetError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TargetError::Empty);
        }
        if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
            return Err(TargetError::InvalidCharacter(c));
        }
        Ok(Self {
            name: name.to_string(),
            root: zrok_root(name),
        })
    }

    /// Target for an explicit server root such as `http://10.0.0.5:5000`.
    pub fn with_root_url(url: &str) -> Result<Self, TargetError> {
        let root = url.trim().trim_end_matches('/');
        let host = root
            .strip_prefix("https://")
            .or_else(|| root.strip_prefix("http://"))
            .ok_or_else(|| TargetError::InvalidUrl(url.to_string()))?;
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(TargetError::InvalidUrl(url.to_string()));
        }
        Ok(Self {
            name: root.to_string(),
            root: root.to_string(),
        })
    }

    /// Share name, or the root URL for explicit targets.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `POST` endpoint for the video.
    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.root)
    }

    /// `GET` endpoint for the server state.
    pub fn status_url(&self) -> String {
        format!("{}/status", self.root)
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)
    }
}

fn zrok_root(name: &str) -> String {
    format!("https://{name}.{ZROK_SHARE_DOMAIN}")
}
