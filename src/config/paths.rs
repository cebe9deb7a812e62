//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings.toml):
//!   Windows: %APPDATA%\ai-teacher\
//!   macOS:   ~/Library/Application Support/ai-teacher/
//!   Linux:   ~/.config/ai-teacher/
//!
//! Data dir (storage.json + Whisper models):
//!   Windows: %LOCALAPPDATA%\ai-teacher\
//!   macOS:   ~/Library/Application Support/ai-teacher/
//!   Linux:   ~/.local/share/ai-teacher/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to the key-value store (`storage.json`).
    ///
    /// Holds the credential, the transcript and the user's level/topic/voice.
    pub storage_file: PathBuf,
    /// Directory for downloaded GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "ai-teacher";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let storage_file = data_dir.join("storage.json");
        let models_dir = data_dir.join("models");

        Self {
            config_dir,
            settings_file,
            storage_file,
            models_dir,
        }
    }

    /// All paths under a single `root` directory (portable installs, tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            settings_file: root.join("settings.toml"),
            storage_file: root.join("storage.json"),
            models_dir: root.join("models"),
            config_dir: root,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths
            .storage_file
            .file_name()
            .is_some_and(|n| n == "storage.json"));
    }

    #[test]
    fn storage_and_models_share_data_dir() {
        let paths = AppPaths::new();
        assert_eq!(paths.storage_file.parent(), paths.models_dir.parent());
    }

    #[test]
    fn rooted_paths_stay_under_root() {
        let paths = AppPaths::with_root("/opt/ai-teacher");
        assert!(paths.settings_file.starts_with("/opt/ai-teacher"));
        assert!(paths.storage_file.starts_with("/opt/ai-teacher"));
        assert!(paths.models_dir.starts_with("/opt/ai-teacher"));
    }
}
