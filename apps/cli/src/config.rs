//! Client configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/splatscan/client.toml`
//! - Windows: `%APPDATA%/splatscan/client.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use splatscan_status::{DEFAULT_IDLE_MARKER, PollPolicy, StatusClassifier};
use splatscan_transfer::TransferSettings;
use splatscan_uploader::{
    DEFAULT_TARGET, OrchestratorSettings, TargetError, TrainingParams, UploadTarget,
};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// zrok reserved share name of the processing server.
    #[serde(default = "default_target")]
    pub target: String,

    /// Explicit server root URL. Takes precedence over `target`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Substring of the status body that means "no job running".
    #[serde(default = "default_idle_marker")]
    pub idle_marker: String,

    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Growth factor applied to the poll interval (1.0 = fixed).
    #[serde(default = "default_backoff_factor")]
    pub poll_backoff_factor: f64,

    /// Upper bound on the poll interval in seconds.
    #[serde(default = "default_poll_max_interval")]
    pub poll_max_interval_secs: u64,

    /// Give up polling after this many seconds. Unset polls forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_secs: Option<u64>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum idle time while the upload is in flight.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Upload chunk size in KiB (clamped to 8..=1024).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_kib: usize,

    /// Training parameters sent with every upload unless overridden.
    #[serde(default)]
    pub params: TrainingParams,
}

fn default_target() -> String {
    DEFAULT_TARGET.into()
}

fn default_idle_marker() -> String {
    DEFAULT_IDLE_MARKER.into()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_poll_max_interval() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_read_timeout() -> u64 {
    15 * 60
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: default_target(),
            server_url: None,
            idle_marker: default_idle_marker(),
            poll_interval_secs: default_poll_interval(),
            poll_backoff_factor: default_backoff_factor(),
            poll_max_interval_secs: default_poll_max_interval(),
            poll_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            chunk_size_kib: default_chunk_size(),
            params: TrainingParams::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or creates a default if not found.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Rejects values that would make every run misbehave.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_marker.trim().is_empty() {
            anyhow::bail!("idle_marker must not be empty");
        }
        for (name, secs) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    /// Server to upload to.
    pub fn upload_target(&self) -> Result<UploadTarget, TargetError> {
        match &self.server_url {
            Some(url) => UploadTarget::with_root_url(url),
            None => UploadTarget::zrok(&self.target),
        }
    }

    pub fn classifier(&self) -> StatusClassifier {
        StatusClassifier::with_idle_marker(self.idle_marker.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            backoff_factor: self.poll_backoff_factor,
            max_interval: Duration::from_secs(self.poll_max_interval_secs),
            max_duration: self.poll_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            chunk_size: self.chunk_size_kib.saturating_mul(1024),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            poll_policy: self.poll_policy(),
            ..OrchestratorSettings::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn default_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("splatscan").join("client.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("splatscan")
            .join("client.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.target, "splatscan777scapp777");
        assert_eq!(config.server_url, None);
        assert_eq!(config.idle_marker, "idle");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.poll_timeout_secs, None);
        assert_eq!(config.chunk_size_kib, 64);
        assert!(config.params.is_empty());
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");

        let mut config = Config::default();
        config.target = "myshare".into();
        config.poll_timeout_secs = Some(7200);
        config.params.iterations = Some("500".into());
        config.params.extra.insert("scene".into(), "garden".into());
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
target = "lab-server"
poll_interval_secs = 10

[params]
keep_post = "50"
"#,
        )
        .unwrap();
        assert_eq!(config.target, "lab-server");
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.poll_max_interval_secs, 60);
        assert_eq!(config.probe_timeout_secs, 30);
        assert_eq!(config.params.keep_post.as_deref(), Some("50"));
        assert_eq!(config.params.iterations, None);
    }

    #[test]
    fn empty_idle_marker_is_rejected() {
        for marker in ["", "   "] {
            let config = Config {
                idle_marker: marker.into(),
                ..Config::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("idle_marker"));
        }
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let zeroed = [
            Config {
                connect_timeout_secs: 0,
                ..Config::default()
            },
            Config {
                read_timeout_secs: 0,
                ..Config::default()
            },
            Config {
                probe_timeout_secs: 0,
                ..Config::default()
            },
        ];
        for config in zeroed {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("must be greater than zero"));
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "idle_marker = \"\"\n").unwrap();
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "read_timeout_secs = 0\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn server_url_overrides_target() {
        let mut config = Config::default();
        assert_eq!(
            config.upload_target().unwrap().status_url(),
            "https://splatscan777scapp777.share.zrok.io/status"
        );

        config.server_url = Some("http://192.168.1.20:5000".into());
        assert_eq!(
            config.upload_target().unwrap().upload_url(),
            "http://192.168.1.20:5000/upload"
        );
    }

    #[test]
    fn invalid_target_is_reported() {
        let config = Config {
            target: "not a share".into(),
            ..Config::default()
        };
        assert_eq!(
            config.upload_target(),
            Err(TargetError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn settings_conversions() {
        let config = Config {
            poll_interval_secs: 0,
            poll_timeout_secs: Some(3600),
            chunk_size_kib: 128,
            idle_marker: "ready".into(),
            ..Config::default()
        };

        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(policy.max_duration, Some(Duration::from_secs(3600)));
        assert_eq!(config.transfer_settings().chunk_size, 128 * 1024);
        assert_eq!(config.classifier().idle_marker, "ready");
        assert_eq!(config.orchestrator_settings().poll_policy, policy);
    }
}
