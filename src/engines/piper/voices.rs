use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::ConfigError;

/// Extension of the inference graph inside the models directory.
pub const MODEL_EXTENSION: &str = "onnx";

/// Suffix appended to a voice name to find its config file.
pub const CONFIG_SUFFIX: &str = ".onnx.json";

/// On-disk layout of a Piper voice config (`<voice>.onnx.json`).
///
/// Every section is required; serde rejects the document if one is missing
/// or has the wrong type.
#[derive(Debug, Deserialize)]
struct RawVoiceConfig {
    audio: AudioSection,
    espeak: EspeakSection,
    inference: InferenceSection,
    phoneme_type: String,
    phoneme_id_map: HashMap<String, Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct AudioSection {
    sample_rate: u32,
    quality: String,
}

#[derive(Debug, Deserialize)]
struct EspeakSection {
    voice: String,
}

#[derive(Debug, Deserialize)]
struct InferenceSection {
    noise_scale: f32,
    length_scale: f32,
    noise_w: f32,
}

/// Immutable per-voice settings parsed from a Piper config file.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub sample_rate: u32,
    pub quality: String,
    /// espeak-ng voice used to phonemize text for this model (e.g. `"en-us"`).
    pub voice_id: String,
    pub phoneme_type: String,
    /// `[noise_scale, length_scale, noise_w]`, the order the model expects.
    pub inference_scales: [f32; 3],
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
}

impl VoiceConfig {
    /// Parse a config document. `origin` is only used for error messages.
    pub fn from_json(json: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawVoiceConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            sample_rate: raw.audio.sample_rate,
            quality: raw.audio.quality,
            voice_id: raw.espeak.voice,
            phoneme_type: raw.phoneme_type,
            inference_scales: [
                raw.inference.noise_scale,
                raw.inference.length_scale,
                raw.inference.noise_w,
            ],
            phoneme_id_map: raw.phoneme_id_map,
        })
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingResource {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Err(ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }
        Self::from_json(&content, path)
    }
}

/// A directory of Piper voices.
///
/// Each voice `name` is a pair of files:
///
/// ```text
/// models/
/// ├── en_US-amy-medium.onnx        # inference graph
/// └── en_US-amy-medium.onnx.json   # voice config
/// ```
#[derive(Debug, Clone)]
pub struct VoiceStore {
    root: PathBuf,
}

impl VoiceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self, voice: &str) -> PathBuf {
        self.root.join(format!("{voice}{CONFIG_SUFFIX}"))
    }

    pub fn model_path(&self, voice: &str) -> PathBuf {
        self.root.join(format!("{voice}.{MODEL_EXTENSION}"))
    }

    /// Parse the config for `voice` without activating it anywhere.
    pub fn load_config(&self, voice: &str) -> Result<VoiceConfig, ConfigError> {
        let path = self.config_path(voice);
        log::debug!("Loading voice config from {}", path.display());
        VoiceConfig::from_file(&path)
    }

    /// Read the whole model graph for `voice` into memory.
    pub fn load_model_bytes(&self, voice: &str) -> Result<Vec<u8>, ConfigError> {
        let path = self.model_path(voice);
        if !path.exists() {
            return Err(ConfigError::MissingResource { path });
        }
        let bytes = std::fs::read(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        log::info!(
            "Read model {} ({:.1} MB)",
            path.display(),
            bytes.len() as f64 / 1_048_576.0
        );
        Ok(bytes)
    }

    /// List voices that have both a model and a config, in sorted order.
    pub fn list_voices(&self) -> Result<Vec<String>, ConfigError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| ConfigError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ConfigError::Io {
                    path: self.root.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(MODEL_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.config_path(name).exists() {
                names.push(name.to_string());
            }
        }

        names.sort_unstable();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::{VoiceConfig, VoiceStore};
    use crate::engines::piper::error::ConfigError;
    use crate::engines::piper::testing::{voice_config_json, write_voice};
    use std::path::Path;

    #[test]
    fn parses_every_field_unmodified() {
        let json = voice_config_json("en-gb", &[("h", &[5]), ("w", &[7, 8])]);
        let config = VoiceConfig::from_json(&json.to_string(), Path::new("mem")).unwrap();

        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.quality, "medium");
        assert_eq!(config.voice_id, "en-gb");
        assert_eq!(config.phoneme_type, "espeak");
        assert_eq!(config.inference_scales, [0.5, 1.0, 0.75]);
        assert_eq!(config.phoneme_id_map["w"], vec![7, 8]);
    }

    #[test]
    fn missing_section_is_malformed() {
        let mut json = voice_config_json("en-us", &[("a", &[1])]);
        json.as_object_mut().unwrap().remove("inference");
        let err = VoiceConfig::from_json(&json.to_string(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }), "{err}");
    }

    #[test]
    fn mistyped_field_is_malformed() {
        let mut json = voice_config_json("en-us", &[("a", &[1])]);
        json["audio"]["sample_rate"] = serde_json::json!("fast");
        let err = VoiceConfig::from_json(&json.to_string(), Path::new("mem")).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let store = VoiceStore::new(dir.path());
        let err = store.load_config("nobody").unwrap_err();
        assert!(matches!(err, ConfigError::MissingResource { .. }));
        let err = store.load_model_bytes("nobody").unwrap_err();
        assert!(matches!(err, ConfigError::MissingResource { .. }));
    }

    #[test]
    fn lists_only_complete_voices() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "b_voice", "en-us");
        write_voice(dir.path(), "a_voice", "en-gb");
        std::fs::write(dir.path().join("orphan.onnx"), b"graph").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let store = VoiceStore::new(dir.path());
        assert_eq!(store.list_voices().unwrap(), vec!["a_voice", "b_voice"]);
    }
}
