//! Speech synthesis engines.
//!
//! The engine itself is always compiled; its native backends are enabled via
//! Cargo features:
//! - `onnx` - ONNX Runtime inference ([`piper::OnnxBackend`])
//! - `espeak` - espeak-ng phonemization ([`piper::EspeakPhonemizer`])
//! - `bundled-data` - unpacking of a shipped `espeak-ng-data.zip`
//! - `piper` - all of the above

pub mod piper;
