//! Whisper model file resolution.
//!
//! `SttConfig::model` names a GGML file inside [`AppPaths::models_dir`]; the
//! `.bin` extension is optional.  Models are not downloaded automatically:
//! a missing file simply means voice input is unavailable.

use std::path::{Path, PathBuf};

use crate::config::{AppPaths, SttConfig};

/// Where the multilingual GGML models can be fetched from.
pub const MODEL_SOURCE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp";

/// Resolved location of the configured model.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub model_file: PathBuf,
}

impl ModelPaths {
    pub fn resolve(paths: &AppPaths, config: &SttConfig) -> Self {
        Self {
            model_file: model_file_in(&paths.models_dir, &config.model),
        }
    }

    pub fn exists(&self) -> bool {
        self.model_file.is_file()
    }
}

/// `<dir>/<name>.bin`, keeping an explicit extension when one is given.
pub fn model_file_in(dir: &Path, name: &str) -> PathBuf {
    if Path::new(name).extension().is_some() {
        dir.join(name)
    } else {
        dir.join(format!("{name}.bin"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_extension_is_added() {
        let dir = Path::new("/models");
        assert_eq!(model_file_in(dir, "ggml-base"), dir.join("ggml-base.bin"));
        assert_eq!(
            model_file_in(dir, "ggml-small.en.bin"),
            dir.join("ggml-small.en.bin")
        );
    }

    #[test]
    fn resolve_uses_models_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_root(tmp.path());
        let resolved = ModelPaths::resolve(&paths, &SttConfig::default());

        assert!(resolved.model_file.starts_with(&paths.models_dir));
        assert!(!resolved.exists());

        std::fs::create_dir_all(&paths.models_dir).unwrap();
        std::fs::write(&resolved.model_file, b"ggml").unwrap();
        assert!(resolved.exists());
    }
}
