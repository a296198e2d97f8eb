//! Fakes for the native collaborators, shared by the unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use super::engine::{SynthesisOrchestrator, SynthesisSettings};
use super::error::{InferenceError, PhonemizeError, SinkError, VoiceError};
use super::model::{InferenceBackend, InferenceSession, ModelInputs};
use super::phonemizer::Phonemizer;
use super::voices::{VoiceConfig, VoiceStore};
use crate::sink::AudioSink;
use crate::AudioBuffer;

pub const SAMPLE_RATE: u32 = 22050;
/// Token id of `z`; the fake model returns silence for any input holding it.
pub const SILENT_ID: i64 = 10 + 25;
/// Model bytes the fake backend refuses to load.
pub const CORRUPT_MODEL: &[u8] = b"corrupt graph";

fn config_json(voice: &str, map: Map<String, Value>) -> Value {
    json!({
        "audio": { "sample_rate": SAMPLE_RATE, "quality": "medium" },
        "espeak": { "voice": voice },
        "inference": { "noise_scale": 0.5, "length_scale": 1.0, "noise_w": 0.75 },
        "phoneme_type": "espeak",
        "phoneme_id_map": map,
    })
}

pub fn voice_config_json(voice: &str, map: &[(&str, &[i64])]) -> Value {
    let map = map
        .iter()
        .map(|(phoneme, ids)| (phoneme.to_string(), json!(ids)))
        .collect();
    config_json(voice, map)
}

pub fn test_config(voice: &str, map: &[(&str, &[i64])]) -> VoiceConfig {
    let json = voice_config_json(voice, map).to_string();
    VoiceConfig::from_json(&json, Path::new("test")).unwrap()
}

/// `a`..`z` → 10..35 and space → 3.
fn alphabet_map() -> Map<String, Value> {
    let mut map: Map<String, Value> = ('a'..='z')
        .enumerate()
        .map(|(i, ch)| (ch.to_string(), json!([10 + i as i64])))
        .collect();
    map.insert(" ".to_string(), json!([3]));
    map
}

/// Write `<name>.onnx` and `<name>.onnx.json` into `dir`.
pub fn write_voice(dir: &Path, name: &str, voice: &str) {
    std::fs::write(dir.join(format!("{name}.onnx")), name.as_bytes()).unwrap();
    std::fs::write(
        dir.join(format!("{name}.onnx.json")),
        config_json(voice, alphabet_map()).to_string(),
    )
    .unwrap();
}

#[derive(Clone, Default)]
pub struct PhonemizerProbe {
    pub voices: Arc<Mutex<Vec<String>>>,
    pub texts: Arc<Mutex<Vec<String>>>,
    /// Number of upcoming `phonemize` calls that fail with a null result.
    pub fail_next: Arc<AtomicUsize>,
}

impl PhonemizerProbe {
    pub fn fail_next_texts(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn voices(&self) -> Vec<String> {
        self.voices.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

/// Lowercases text instead of producing IPA.
///
/// Text containing `fail` yields a null result and text containing `mute`
/// yields no phonemes.
pub struct FakePhonemizer {
    probe: PhonemizerProbe,
    rejected_voice: Option<String>,
}

impl FakePhonemizer {
    pub fn new(probe: PhonemizerProbe) -> Self {
        Self {
            probe,
            rejected_voice: None,
        }
    }

    pub fn rejecting(mut self, voice: &str) -> Self {
        self.rejected_voice = Some(voice.to_string());
        self
    }
}

impl Phonemizer for FakePhonemizer {
    fn set_voice(&mut self, voice: &str) -> Result<(), VoiceError> {
        if self.rejected_voice.as_deref() == Some(voice) {
            return Err(VoiceError::Rejected {
                voice: voice.to_string(),
                code: -1,
            });
        }
        self.probe.voices.lock().unwrap().push(voice.to_string());
        Ok(())
    }

    fn phonemize(&mut self, text: &str) -> Result<String, PhonemizeError> {
        self.probe.texts.lock().unwrap().push(text.to_string());
        let armed = self
            .probe
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed || text.contains("fail") {
            return Err(PhonemizeError::NullResult);
        }
        if text.contains("mute") {
            return Ok(String::new());
        }
        Ok(text.to_lowercase())
    }
}

#[derive(Clone, Default)]
pub struct BackendProbe {
    pub loads: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub max_live: Arc<AtomicUsize>,
    pub runs: Arc<Mutex<Vec<ModelInputs>>>,
}

impl BackendProbe {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

pub struct FakeBackend {
    probe: BackendProbe,
}

impl FakeBackend {
    pub fn new(probe: BackendProbe) -> Self {
        Self { probe }
    }
}

impl InferenceBackend for FakeBackend {
    fn load(&self, model: &[u8]) -> Result<Box<dyn InferenceSession>, InferenceError> {
        if model == CORRUPT_MODEL {
            return Err(InferenceError::LoadFailed("corrupt graph".to_string()));
        }
        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            probe: self.probe.clone(),
        }))
    }
}

/// Returns four samples per token.
struct FakeSession {
    probe: BackendProbe,
}

impl InferenceSession for FakeSession {
    fn run(&mut self, inputs: &ModelInputs) -> Result<Vec<f32>, InferenceError> {
        self.probe.runs.lock().unwrap().push(inputs.clone());
        if inputs.tokens.contains(&SILENT_ID) {
            return Ok(Vec::new());
        }
        Ok(vec![0.25; inputs.tokens.len() * 4])
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct SinkProbe {
    pub played: Arc<Mutex<Vec<(Instant, AudioBuffer)>>>,
    /// Buffers handed over while the previous one was still playing.
    pub overlaps: Arc<AtomicUsize>,
}

impl SinkProbe {
    pub fn played(&self) -> Vec<AudioBuffer> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|(_, audio)| audio.clone())
            .collect()
    }

    pub fn play_times(&self) -> Vec<Instant> {
        self.played.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

/// Reports itself as playing for a fixed number of polls after each buffer.
pub struct RecordingSink {
    probe: SinkProbe,
    polls_per_buffer: usize,
    remaining: AtomicUsize,
}

impl RecordingSink {
    pub fn new(probe: SinkProbe, polls_per_buffer: usize) -> Self {
        Self {
            probe,
            polls_per_buffer,
            remaining: AtomicUsize::new(0),
        }
    }
}

impl AudioSink for RecordingSink {
    fn play(&mut self, audio: AudioBuffer) -> Result<(), SinkError> {
        if self.remaining.load(Ordering::SeqCst) > 0 {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.probe
            .played
            .lock()
            .unwrap()
            .push((Instant::now(), audio));
        self.remaining.store(self.polls_per_buffer, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Blocks inside `play` until the test releases it.
pub struct GatedSink {
    pub started: Sender<()>,
    pub release: Receiver<()>,
}

impl AudioSink for GatedSink {
    fn play(&mut self, _audio: AudioBuffer) -> Result<(), SinkError> {
        let _ = self.started.send(());
        self.release
            .recv()
            .map_err(|_| SinkError::Playback("gate dropped".to_string()))
    }

    fn is_playing(&self) -> bool {
        false
    }
}

pub fn quick_settings() -> SynthesisSettings {
    SynthesisSettings {
        comma_delay: Duration::ZERO,
        period_delay: Duration::ZERO,
        question_exclamation_delay: Duration::ZERO,
        playback_poll_interval: Duration::from_millis(1),
        ..SynthesisSettings::default()
    }
}

pub struct Harness {
    pub orchestrator: SynthesisOrchestrator,
    pub phonemizer: PhonemizerProbe,
    pub backend: BackendProbe,
    pub dir: TempDir,
}

/// A models directory with voices `amy` (en-us), `bob` (en-gb), `broken`
/// (unparseable config), `corrupt` (unloadable graph) and `weird` (voice
/// `xx-bad`, which the phonemizer rejects).
pub fn harness(settings: SynthesisSettings, sink: Box<dyn AudioSink>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    write_voice(dir.path(), "amy", "en-us");
    write_voice(dir.path(), "bob", "en-gb");
    write_voice(dir.path(), "broken", "en-us");
    std::fs::write(dir.path().join("broken.onnx.json"), "{ \"audio\": ").unwrap();
    write_voice(dir.path(), "corrupt", "en-gb");
    std::fs::write(dir.path().join("corrupt.onnx"), CORRUPT_MODEL).unwrap();
    write_voice(dir.path(), "weird", "xx-bad");

    let phonemizer = PhonemizerProbe::default();
    let backend = BackendProbe::default();
    let orchestrator = SynthesisOrchestrator::new(
        VoiceStore::new(dir.path()),
        Box::new(FakePhonemizer::new(phonemizer.clone()).rejecting("xx-bad")),
        Box::new(FakeBackend::new(backend.clone())),
        sink,
        settings,
    );

    Harness {
        orchestrator,
        phonemizer,
        backend,
        dir,
    }
}

pub fn recording_harness(settings: SynthesisSettings, polls: usize) -> (Harness, SinkProbe) {
    let probe = SinkProbe::default();
    let harness = harness(settings, Box::new(RecordingSink::new(probe.clone(), polls)));
    (harness, probe)
}
