//! # piper-synth
//!
//! A Rust library for Piper text-to-speech: espeak-ng phonemization, a
//! Piper ONNX voice model, and paced playback of the synthesized audio.
//!
//! ## Features
//!
//! - **Punctuation-paced speech**: text is spoken chunk by chunk, with pauses
//!   after commas, periods and question/exclamation marks
//! - **Hot-swappable voices**: load another voice model at runtime; a failed
//!   load leaves the current voice in place
//! - **Pluggable audio output**: any [`sink::AudioSink`], plus WAV-file and
//!   channel sinks out of the box
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-synth = { version = "2026.10", features = ["piper"] }
//! ```
//!
//! ```ignore
//! use piper_synth::engines::piper::{
//!     EspeakPhonemizer, OnnxBackend, SynthesisOrchestrator, SynthesisSettings, VoiceStore,
//! };
//! use piper_synth::sink::WavFileSink;
//! use std::path::Path;
//!
//! let espeak = EspeakPhonemizer::initialize(Path::new("espeak-ng-data"))?;
//! let orchestrator = SynthesisOrchestrator::new(
//!     VoiceStore::new("models"),
//!     Box::new(espeak),
//!     Box::new(OnnxBackend::default()),
//!     Box::new(WavFileSink::new("out", "speech")?),
//!     SynthesisSettings::default(),
//! );
//!
//! orchestrator.load_model("en_US-amy-medium")?;
//! orchestrator.synthesize("Hello, world. How are you?")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;
pub mod sink;

use std::path::Path;

/// Mono audio produced for one chunk of text.
///
/// Contains raw f32 samples in `[-1, 1]` and the sample rate of the voice.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio (from the voice config, typically 22050)
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
