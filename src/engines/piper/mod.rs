//! Piper text-to-speech.
//!
//! Text is segmented at punctuation, phonemized with espeak-ng, mapped to
//! token ids with the voice's phoneme map and run through the voice's VITS
//! model. Each chunk is played through an [`AudioSink`](crate::sink::AudioSink)
//! before the next one is synthesized.
//!
//! # System Requirements
//!
//! The `espeak` feature links against **espeak-ng**:
//! - **Linux**: `sudo apt-get install libespeak-ng-dev`
//! - **macOS**: `brew install espeak-ng`
//!
//! With `bundled-data`, [`data::ensure_data_dir`] unpacks a shipped
//! `espeak-ng-data.zip` so no system data directory is needed.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/
//! ├── en_US-amy-medium.onnx        # VITS graph
//! ├── en_US-amy-medium.onnx.json   # voice config (sample rate, espeak voice, phoneme map)
//! ├── en_GB-alan-low.onnx
//! └── en_GB-alan-low.onnx.json
//! ```
//!
//! Voices are addressed by file stem, e.g. `en_US-amy-medium`.
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "onnx", feature = "espeak"))]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use piper_synth::engines::piper::{
//!     EspeakPhonemizer, OnnxBackend, SynthesisOrchestrator, SynthesisSettings, VoiceStore,
//! };
//! use piper_synth::sink::WavFileSink;
//! use std::path::Path;
//!
//! let orchestrator = SynthesisOrchestrator::new(
//!     VoiceStore::new("models"),
//!     Box::new(EspeakPhonemizer::initialize(Path::new("/usr/share/espeak-ng-data"))?),
//!     Box::new(OnnxBackend::default()),
//!     Box::new(WavFileSink::new("out", "speech")?),
//!     SynthesisSettings::default(),
//! );
//!
//! orchestrator.load_model("en_US-amy-medium")?;
//! let report = orchestrator.synthesize("Hello, world. Are you there?")?;
//! println!("{} chunks spoken", report.spoken);
//! # Ok(())
//! # }
//! # #[cfg(not(all(feature = "onnx", feature = "espeak")))]
//! # fn main() {}
//! ```

#[cfg(feature = "bundled-data")]
pub mod data;
pub mod engine;
pub mod error;
pub mod model;
pub mod phonemizer;
pub mod segment;
pub mod vocab;
pub mod voices;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{
    ModelLoadReport, SynthesisOrchestrator, SynthesisReport, SynthesisSettings,
    SynthesisSettingsBuilder, SynthesisState,
};
pub use error::{
    ChunkError, ConfigError, InferenceError, InitError, PhonemizeError, SinkError,
    SynthesisError, TokenizeError, VoiceError,
};
pub use model::{InferenceBackend, InferenceSession, ModelInputs};
#[cfg(feature = "onnx")]
pub use model::{OnnxBackend, PiperModelParams};
pub use phonemizer::Phonemizer;
#[cfg(feature = "espeak")]
pub use phonemizer::EspeakPhonemizer;
pub use segment::{segment, PauseMark, SynthesisChunk};
pub use vocab::{PhonemeVocabulary, TokenSequence};
pub use voices::{VoiceConfig, VoiceStore};
