use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use abrdl_engine::token::http::DEFAULT_PROVIDER_URL;

use crate::error::AppError;

const APP_NAME: &str = "abrdl";

/// Defaults applied when the matching command line flag is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory downloads are written to
    pub output_dir: PathBuf,

    /// Preferred container (webm or mp4)
    pub container: String,

    /// Preferred video quality, or an audio quality for audio-only downloads
    pub quality: String,

    /// Base URL of the proof-of-origin provider service
    pub provider_url: String,

    /// User agent string for requests
    pub user_agent: Option<String>,

    /// Default proxy URL (supports http, https, socks5)
    pub proxy: Option<String>,

    /// Delete partially written files when a download fails
    pub remove_partial_files: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./saved"),
            container: "webm".to_string(),
            quality: "720p".to_string(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            user_agent: None,
            proxy: None,
            remove_partial_files: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit file, or from the default location
    pub fn load(config_path: Option<&Path>) -> Result<Self, AppError> {
        match config_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&content)?)
            }
            Some(_) => Ok(Self::default()),
            None => Ok(confy::load(APP_NAME, None)?),
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        confy::get_configuration_file_path(APP_NAME, None).ok()
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reset configuration to defaults and save
    pub fn reset(config_path: Option<&Path>) -> Result<PathBuf, AppError> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path)
            .ok_or_else(|| AppError::Config("No configuration path available".to_string()))?;

        Self::default().save(&path)?;
        Ok(path)
    }

    pub fn show(&self) -> Result<String, AppError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abrdl.toml");
        std::fs::write(&path, "container = \"mp4\"\nquality = \"1080p\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.container, "mp4");
        assert_eq!(config.quality, "1080p");
        assert_eq!(config.output_dir, PathBuf::from("./saved"));
        assert!(config.remove_partial_files);
    }

    #[test]
    fn test_reset_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("abrdl.toml");

        let written = AppConfig::reset(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abrdl.toml");
        std::fs::write(&path, "remove_partial_files = \"maybe\"").unwrap();
        assert!(matches!(AppConfig::load(Some(&path)), Err(AppError::Config(_))));
    }
}
