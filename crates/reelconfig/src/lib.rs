//! Settings shared by every shaderreel render unit.
//!
//! The file lives at `~/.shaderreel/config.toml` and is entirely optional: a
//! missing file, or a file that omits a key, falls back to the defaults the
//! screensaver has always shipped with (five minute rotation, 16x maximum
//! undersampling, ~30 FPS pacing, two day definition cache).
//!
//! Durations accept either a number of seconds or a humantime string such as
//! `"5m"`, `"33ms"`, or `"2days"`.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REMOTE_HOST: &str = "www.shadertoy.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// How long one shader stays on screen before rotation.
    #[serde(deserialize_with = "deserialize_duration")]
    pub shader_duration: Duration,
    /// Upper bound for the render scale divisor.
    pub undersample_max: f32,
    /// Host pacing interval; the adaptive controller aims for this frame time.
    #[serde(deserialize_with = "deserialize_duration")]
    pub frame_interval: Duration,
    /// Age after which a cached shader definition is dropped once used.
    #[serde(deserialize_with = "deserialize_duration")]
    pub stale_after: Duration,
    /// Delay between selection rounds while no shader could be loaded.
    #[serde(deserialize_with = "deserialize_duration")]
    pub retry_interval: Duration,
    pub remote_host: String,
    pub api_key: Option<String>,
    /// Never touch the network; serve only what is already cached.
    pub cache_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shader_duration: Duration::from_secs(300),
            undersample_max: 16.0,
            frame_interval: Duration::from_micros(33_333),
            stale_after: Duration::from_secs(2 * 24 * 60 * 60),
            retry_interval: Duration::from_secs(30),
            remote_host: DEFAULT_REMOTE_HOST.to_string(),
            api_key: None,
            cache_only: false,
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: Settings = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Loads settings from `path`, returning the defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// API key with surrounding whitespace removed; blank keys count as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.undersample_max.is_finite() || self.undersample_max < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "undersample_max must be >= 1.0 (got {})",
                self.undersample_max
            )));
        }

        for (name, value) in [
            ("shader_duration", self.shader_duration),
            ("frame_interval", self.frame_interval),
            ("stale_after", self.stale_after),
            ("retry_interval", self.retry_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let host = self.remote_host.trim();
        if host.is_empty() {
            return Err(ConfigError::Invalid("remote_host may not be empty".into()));
        }
        if host.contains("://") || host.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "remote_host '{host}' must be a bare host name"
            )));
        }

        Ok(())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v.trim())
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::from_toml_str("").expect("parse empty config");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.shader_duration, Duration::from_secs(300));
        assert_eq!(settings.stale_after, Duration::from_secs(172_800));
        assert_eq!(settings.remote_host, "www.shadertoy.com");
    }

    #[test]
    fn parses_humantime_and_numeric_durations() {
        let settings = Settings::from_toml_str(
            r#"
shader_duration = "2m"
frame_interval = 0.5
stale_after = "3days"
retry_interval = 5
undersample_max = 8.0
api_key = "abc"
"#,
        )
        .expect("parse config");

        assert_eq!(settings.shader_duration, Duration::from_secs(120));
        assert_eq!(settings.frame_interval, Duration::from_millis(500));
        assert_eq!(settings.stale_after, Duration::from_secs(3 * 86_400));
        assert_eq!(settings.retry_interval, Duration::from_secs(5));
        assert_eq!(settings.undersample_max, 8.0);
        assert_eq!(settings.api_key(), Some("abc"));
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let settings = Settings::from_toml_str("api_key = \"   \"").unwrap();
        assert_eq!(settings.api_key(), None);
    }

    #[test]
    fn rejects_undersample_below_one() {
        let err = Settings::from_toml_str("undersample_max = 0.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_duration() {
        let err = Settings::from_toml_str("shader_duration = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_host_with_scheme() {
        let err = Settings::from_toml_str("remote_host = \"https://example.com\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = Settings::from_toml_str("shader_duration = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&temp.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn loads_file_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "cache_only = true\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert!(settings.cache_only);
    }
}
