use std::path::PathBuf;

/// Failure to load a per-voice config or model resource.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Resource not found at {}", .path.display())]
    MissingResource { path: PathBuf },
    #[error("Invalid voice config {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// espeak-ng bring-up failure.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("espeak-ng initialization failed with status {status} (data path: {})", .path.display())]
    Native { status: i32, path: PathBuf },
    #[error(
        "espeak-ng is already initialized with {}; cannot re-initialize with {}",
        .current.display(),
        .requested.display()
    )]
    AlreadyInitialized {
        current: PathBuf,
        requested: PathBuf,
    },
    #[error("espeak-ng data path is not valid UTF-8 without NUL bytes: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("No espeak-ng data (phontab) found at {}", .0.display())]
    MissingData(PathBuf),
    #[error("Failed to unpack espeak-ng data: {0}")]
    DataArchive(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum VoiceError {
    #[error("espeak-ng rejected voice '{voice}' (error code {code})")]
    Rejected { voice: String, code: i32 },
    #[error("Invalid voice name: {0:?}")]
    InvalidName(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PhonemizeError {
    #[error("espeak-ng returned a null phoneme buffer")]
    NullResult,
    #[error("Phonemizer produced no phonemes for {0:?}")]
    Empty(String),
    #[error("Text cannot be passed to espeak-ng: {0}")]
    InvalidInput(String),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("No voice config is loaded. Call load_model() first.")]
    NotInitialized,
}

#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("Failed to load model: {0}")]
    LoadFailed(String),
    #[error("Inference failed: {0}")]
    ScheduleFailed(String),
    #[error("Model produced an empty audio buffer")]
    EmptyOutput,
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Audio playback failed: {0}")]
    Playback(String),
    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("Audio receiver has been dropped")]
    Closed,
}

/// A failure confined to one chunk of an utterance.
#[derive(thiserror::Error, Debug)]
pub enum ChunkError {
    #[error(transparent)]
    Phonemize(#[from] PhonemizeError),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
}

impl ChunkError {
    /// True when the chunk produced no audio rather than failing outright.
    pub fn is_silent(&self) -> bool {
        matches!(self, ChunkError::Inference(InferenceError::EmptyOutput))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Another synthesis or model load is in progress")]
    Busy,
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
