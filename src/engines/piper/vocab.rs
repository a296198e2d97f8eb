use super::error::{ConfigError, TokenizeError};
use super::voices::{VoiceConfig, VoiceStore};

/// Beginning-of-sequence marker.
pub const BOS_ID: i64 = 1;
/// Padding inserted after the BOS marker and after every phoneme.
pub const PAD_ID: i64 = 0;
/// End-of-sequence marker.
pub const EOS_ID: i64 = 2;

/// Phoneme ids in the layout Piper models are trained on:
/// `[BOS, PAD, id₁, PAD, id₂, PAD, …, EOS]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence(Vec<i64>);

impl TokenSequence {
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<i64> {
        self.0
    }
}

/// The active voice config and the tokenizer built on top of it.
///
/// Holds at most one [`VoiceConfig`]. Replacing it is a single assignment,
/// so the sample rate, scales and phoneme map always belong to the same voice.
#[derive(Debug, Default)]
pub struct PhonemeVocabulary {
    active: Option<VoiceConfig>,
}

impl PhonemeVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `voice` from `store` and make it active.
    ///
    /// On error the previously active config (if any) stays in effect.
    pub fn load(&mut self, store: &VoiceStore, voice: &str) -> Result<&VoiceConfig, ConfigError> {
        let config = store.load_config(voice)?;
        Ok(self.activate(config))
    }

    /// Replace the active config.
    pub fn activate(&mut self, config: VoiceConfig) -> &VoiceConfig {
        log::info!(
            "Voice config active: sample_rate={}, quality='{}', voice='{}', phoneme_type='{}'",
            config.sample_rate,
            config.quality,
            config.voice_id,
            config.phoneme_type
        );
        self.active.insert(config)
    }

    /// Drop the active config, if any.
    pub fn clear(&mut self) -> Option<VoiceConfig> {
        self.active.take()
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    pub fn config(&self) -> Option<&VoiceConfig> {
        self.active.as_ref()
    }

    fn require(&self) -> Result<&VoiceConfig, TokenizeError> {
        self.active.as_ref().ok_or(TokenizeError::NotInitialized)
    }

    /// Map phoneme units to model token ids.
    ///
    /// Phonemes missing from the map are skipped with a warning. Only the
    /// first id of a multi-id entry is used.
    pub fn tokenize<S: AsRef<str>>(&self, phonemes: &[S]) -> Result<TokenSequence, TokenizeError> {
        let config = self.require()?;

        let mut ids = Vec::with_capacity(phonemes.len() * 2 + 3);
        ids.push(BOS_ID);
        ids.push(PAD_ID);

        for phoneme in phonemes {
            let phoneme = phoneme.as_ref();
            match config.phoneme_id_map.get(phoneme).and_then(|ids| ids.first()) {
                Some(&id) => {
                    ids.push(id);
                    ids.push(PAD_ID);
                }
                None => log::warn!("No token for phoneme {phoneme:?}, skipping"),
            }
        }

        ids.push(EOS_ID);
        Ok(TokenSequence(ids))
    }

    /// `[noise_scale, length_scale, noise_w]` of the active voice.
    pub fn inference_scales(&self) -> Result<[f32; 3], TokenizeError> {
        Ok(self.require()?.inference_scales)
    }

    pub fn sample_rate(&self) -> Result<u32, TokenizeError> {
        Ok(self.require()?.sample_rate)
    }
}
