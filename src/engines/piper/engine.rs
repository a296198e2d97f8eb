use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use derive_builder::Builder;

use crate::sink::AudioSink;
use crate::AudioBuffer;

use super::error::{ChunkError, ConfigError, PhonemizeError, SinkError, SynthesisError};
use super::model::{InferenceBackend, ModelHandle, ModelInputs};
use super::phonemizer::{phoneme_units, Phonemizer};
use super::segment::{segment, PauseMark};
use super::vocab::PhonemeVocabulary;
use super::voices::{VoiceConfig, VoiceStore};

/// Runtime settings for a [`SynthesisOrchestrator`].
///
/// ```
/// use piper_synth::engines::piper::SynthesisSettingsBuilder;
/// use std::time::Duration;
///
/// let settings = SynthesisSettingsBuilder::default()
///     .period_delay(Duration::from_millis(300))
///     .build()?;
/// assert_eq!(settings.comma_delay, Duration::from_millis(100));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SynthesisSettings {
    /// Pause after `,`, `;` and `:`.
    pub comma_delay: Duration,
    /// Pause after `.`.
    pub period_delay: Duration,
    /// Pause after `?` and `!`.
    pub question_exclamation_delay: Duration,
    /// Text synthesized (and discarded) right after a model is loaded.
    #[builder(setter(into))]
    pub warmup_text: String,
    /// How often the sink is asked whether it is still playing.
    pub playback_poll_interval: Duration,
    /// How long past a buffer's own duration to keep waiting for the sink.
    /// `None` waits indefinitely.
    pub playback_slack: Option<Duration>,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            comma_delay: Duration::from_millis(100),
            period_delay: Duration::from_millis(500),
            question_exclamation_delay: Duration::from_millis(600),
            warmup_text: "hello".to_string(),
            playback_poll_interval: Duration::from_millis(10),
            playback_slack: Some(Duration::from_millis(500)),
        }
    }
}

impl SynthesisSettings {
    pub fn delay_for(&self, mark: PauseMark) -> Duration {
        match mark {
            PauseMark::Comma | PauseMark::Semicolon | PauseMark::Colon => self.comma_delay,
            PauseMark::Period => self.period_delay,
            PauseMark::Question | PauseMark::Exclamation => self.question_exclamation_delay,
        }
    }
}

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    LoadingModel,
    Pausing,
    Phonemizing,
    Tokenizing,
    Inferring,
    Emitting,
    WaitingPlayback,
}

/// Outcome of one [`SynthesisOrchestrator::synthesize`] call.
///
/// Every chunk is accounted for: `synthesize` returns only after each one was
/// spoken, dropped or paused on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisReport {
    /// Chunks that were synthesized and played.
    pub spoken: usize,
    /// Chunks dropped because phonemization, inference or playback failed.
    pub failed: usize,
    /// Chunks dropped because the model returned no audio.
    pub silent: usize,
    /// Punctuation marks paused on (including zero-length pauses).
    pub pauses: usize,
}

impl SynthesisReport {
    /// True when no speakable chunk was dropped.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.silent == 0
    }
}

/// Outcome of a successful [`SynthesisOrchestrator::load_model`].
#[derive(Debug)]
pub struct ModelLoadReport {
    pub model: String,
    pub voice_id: String,
    pub sample_rate: u32,
    /// Number of warmup samples, or why warmup failed. A failed warmup does
    /// not unload the model.
    pub warmup: Result<usize, ChunkError>,
}

/// Everything one synthesis run needs exclusive access to.
struct Pipeline {
    vocabulary: PhonemeVocabulary,
    phonemizer: Box<dyn Phonemizer>,
    backend: Box<dyn InferenceBackend>,
    model: Option<ModelHandle>,
    sink: Box<dyn AudioSink>,
}

/// Turns text into paced speech with one Piper voice at a time.
///
/// All operations take `&self`, so the orchestrator can be shared behind an
/// `Arc`. Only one synthesis or model load runs at a time; a call made while
/// another is in progress fails with [`SynthesisError::Busy`].
pub struct SynthesisOrchestrator {
    store: VoiceStore,
    pipeline: Mutex<Pipeline>,
    state: Mutex<SynthesisState>,
    settings: SynthesisSettings,
}

/// Exclusive use of the pipeline for one operation.
///
/// Dropping it (however the operation ends) releases the pipeline and resets
/// the state to `Idle` under the state lock. A reader never sees `Idle` while
/// the pipeline is still held, and the next operation's first state change
/// lands after the reset.
struct Claim<'a> {
    orchestrator: &'a SynthesisOrchestrator,
    pipeline: ManuallyDrop<MutexGuard<'a, Pipeline>>,
}

impl Deref for Claim<'_> {
    type Target = Pipeline;

    fn deref(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl DerefMut for Claim<'_> {
    fn deref_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut state = self
            .orchestrator
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // SAFETY: `pipeline` is dropped exactly once, here, and never used again.
        unsafe { ManuallyDrop::drop(&mut self.pipeline) };
        *state = SynthesisState::Idle;
    }
}

impl SynthesisOrchestrator {
    pub fn new(
        store: VoiceStore,
        phonemizer: Box<dyn Phonemizer>,
        backend: Box<dyn InferenceBackend>,
        sink: Box<dyn AudioSink>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            store,
            pipeline: Mutex::new(Pipeline {
                vocabulary: PhonemeVocabulary::new(),
                phonemizer,
                backend,
                model: None,
                sink,
            }),
            state: Mutex::new(SynthesisState::Idle),
            settings,
        }
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    pub fn store(&self) -> &VoiceStore {
        &self.store
    }

    pub fn state(&self) -> SynthesisState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SynthesisState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Claim the pipeline, or fail with `Busy` if an operation holds it.
    fn acquire(&self) -> Result<Claim<'_>, SynthesisError> {
        let pipeline = match self.pipeline.try_lock() {
            Ok(pipeline) => pipeline,
            Err(TryLockError::WouldBlock) => return Err(SynthesisError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("A previous synthesis panicked; continuing with its state");
                poisoned.into_inner()
            }
        };
        Ok(Claim {
            orchestrator: self,
            pipeline: ManuallyDrop::new(pipeline),
        })
    }

    /// Blocks while an operation is running.
    fn inspect(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the loaded model. Waits for a running operation to finish.
    pub fn active_model(&self) -> Option<String> {
        self.inspect().model.as_ref().map(|m| m.name().to_string())
    }

    /// Config of the loaded voice. Waits for a running operation to finish.
    pub fn active_voice(&self) -> Option<VoiceConfig> {
        self.inspect().vocabulary.config().cloned()
    }

    /// Voices available in the models directory.
    pub fn list_voices(&self) -> Result<Vec<String>, ConfigError> {
        self.store.list_voices()
    }

    /// Load voice `name` (config and model) and make it the active voice.
    ///
    /// The swap is all-or-nothing: if the config, the model file, the espeak
    /// voice or the session cannot be set up, the previous voice stays active.
    /// The new model is warmed up once before this returns.
    pub fn load_model(&self, name: &str) -> Result<ModelLoadReport, SynthesisError> {
        let mut guard = self.acquire()?;
        self.set_state(SynthesisState::LoadingModel);
        let pipeline = &mut *guard;

        log::info!("Loading voice config for model: {name}");
        let config = self.store.load_config(name).inspect_err(|e| {
            log::error!("Failed to load voice config, aborting model load: {e}");
        })?;
        let model_bytes = self.store.load_model_bytes(name).inspect_err(|e| {
            log::error!("Failed to read model, aborting model load: {e}");
        })?;

        let previous_voice = pipeline.vocabulary.config().map(|c| c.voice_id.clone());
        if let Err(e) = pipeline.phonemizer.set_voice(&config.voice_id) {
            log::error!("Failed to set voice '{}': {e}", config.voice_id);
            if let Some(voice) = &previous_voice {
                if let Err(e) = pipeline.phonemizer.set_voice(voice) {
                    log::warn!("Could not re-apply previous voice '{voice}': {e}");
                }
            }
            return Err(e.into());
        }

        let previous_model = pipeline.model.take().map(|old| old.name().to_string());

        let session = match pipeline.backend.load(&model_bytes) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Model '{name}' loading failed: {e}");
                self.reinstate(pipeline, previous_model.as_deref(), previous_voice.as_deref());
                return Err(e.into());
            }
        };
        drop(model_bytes);

        pipeline.model = Some(ModelHandle::new(name, session));
        let voice_id = config.voice_id.clone();
        let sample_rate = config.sample_rate;
        pipeline.vocabulary.activate(config);
        log::info!("Model '{name}' loaded successfully.");

        let warmup = self.warm_up(pipeline);
        Ok(ModelLoadReport {
            model: name.to_string(),
            voice_id,
            sample_rate,
            warmup,
        })
    }

    /// Bring back the model that was disposed for a load that then failed.
    fn reinstate(&self, pipeline: &mut Pipeline, model: Option<&str>, voice: Option<&str>) {
        if let Some(voice) = voice {
            if let Err(e) = pipeline.phonemizer.set_voice(voice) {
                log::warn!("Could not re-apply previous voice '{voice}': {e}");
            }
        }
        let Some(name) = model else {
            return;
        };

        log::info!("Reinstating previous model '{name}'");
        let restored = self
            .store
            .load_model_bytes(name)
            .map_err(|e| e.to_string())
            .and_then(|bytes| pipeline.backend.load(&bytes).map_err(|e| e.to_string()));

        match restored {
            Ok(session) => {
                pipeline.model = Some(ModelHandle::new(name, session));
                if let Err(e) = self.warm_up(pipeline) {
                    log::warn!("Reinstated model '{name}' failed its warmup, keeping it: {e}");
                }
            }
            Err(e) => {
                log::error!("Could not reinstate model '{name}': {e}; no voice is active");
                pipeline.vocabulary.clear();
            }
        }
    }

    fn warm_up(&self, pipeline: &mut Pipeline) -> Result<usize, ChunkError> {
        log::info!("Warming up the model with a dummy run...");
        match self.render_chunk(pipeline, &self.settings.warmup_text) {
            Ok(audio) => {
                if let Some(model) = pipeline.model.as_mut() {
                    model.mark_warmed_up();
                }
                log::info!(
                    "Model warmup successful. Generated dummy audio data length: {}",
                    audio.samples.len()
                );
                Ok(audio.samples.len())
            }
            Err(e) => {
                log::error!("Model warmup failed: {e}");
                Err(e)
            }
        }
    }

    /// Drop the active model and voice config.
    pub fn unload_model(&self) -> Result<(), SynthesisError> {
        let mut pipeline = self.acquire()?;
        pipeline.model = None;
        pipeline.vocabulary.clear();
        Ok(())
    }

    /// Speak `text` through the sink, chunk by chunk.
    ///
    /// Each speakable chunk is synthesized, handed to the sink, and waited on
    /// until the sink stops playing. Punctuation marks pause for the configured
    /// delay. A chunk that fails is logged, counted and skipped; the remaining
    /// chunks still play.
    pub fn synthesize(&self, text: &str) -> Result<SynthesisReport, SynthesisError> {
        let mut pipeline = self.acquire()?;

        let chunks = segment(text);
        let mut report = SynthesisReport::default();
        if chunks.is_empty() {
            log::debug!("Nothing to synthesize");
            return Ok(report);
        }
        let speakable = chunks.iter().any(|c| c.speakable_text().is_some());
        if speakable && pipeline.model.is_none() {
            return Err(SynthesisError::ModelNotLoaded);
        }

        log::info!("Synthesizing {} chunks", chunks.len());
        for chunk in &chunks {
            if let Some(mark) = chunk.pause_mark() {
                report.pauses += 1;
                let delay = self.settings.delay_for(mark);
                if !delay.is_zero() {
                    self.set_state(SynthesisState::Pausing);
                    log::debug!("Pausing for '{mark}' for {delay:?}");
                    thread::sleep(delay);
                }
                continue;
            }

            let Some(text) = chunk.speakable_text() else {
                continue;
            };
            log::info!("Processing text chunk: {text:?}");
            match self.speak_chunk(&mut pipeline, &text) {
                Ok(()) => report.spoken += 1,
                Err(e) if e.is_silent() => {
                    log::warn!("Chunk {text:?} produced no audio, skipping");
                    report.silent += 1;
                }
                Err(e) => {
                    log::error!("Dropping chunk {text:?}: {e}");
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Finished playing all chunks: {} spoken, {} failed, {} silent",
            report.spoken,
            report.failed,
            report.silent
        );
        Ok(report)
    }

    /// Synthesize `text` as a single chunk and return the audio instead of
    /// playing it. Punctuation is left to the phonemizer.
    pub fn synthesize_chunk(&self, text: &str) -> Result<AudioBuffer, SynthesisError> {
        let mut pipeline = self.acquire()?;
        if pipeline.model.is_none() {
            return Err(SynthesisError::ModelNotLoaded);
        }
        Ok(self.render_chunk(&mut pipeline, text)?)
    }

    /// Synthesize `text` as a single chunk and write it to a WAV file.
    pub fn synthesize_to_file(&self, text: &str, wav_path: &Path) -> Result<(), SynthesisError> {
        let audio = self.synthesize_chunk(text)?;
        audio.write_wav(wav_path).map_err(SinkError::from)?;
        Ok(())
    }

    fn speak_chunk(&self, pipeline: &mut Pipeline, text: &str) -> Result<(), ChunkError> {
        let audio = self.render_chunk(pipeline, text)?;
        let duration = Duration::from_secs_f64(audio.duration_secs());

        self.set_state(SynthesisState::Emitting);
        pipeline.sink.play(audio)?;

        self.set_state(SynthesisState::WaitingPlayback);
        self.wait_for_playback(pipeline.sink.as_ref(), duration);
        Ok(())
    }

    /// Text → phonemes → tokens → model → audio, for one chunk.
    fn render_chunk(&self, pipeline: &mut Pipeline, text: &str) -> Result<AudioBuffer, ChunkError> {
        if pipeline.model.is_none() {
            return Err(ChunkError::ModelNotLoaded);
        }

        self.set_state(SynthesisState::Phonemizing);
        let phonemes = pipeline.phonemizer.phonemize(text)?;
        let units = phoneme_units(&phonemes);
        if units.is_empty() {
            return Err(PhonemizeError::Empty(text.to_string()).into());
        }

        self.set_state(SynthesisState::Tokenizing);
        let tokens = pipeline.vocabulary.tokenize(units.as_slice())?;
        let scales = pipeline.vocabulary.inference_scales()?;
        let sample_rate = pipeline.vocabulary.sample_rate()?;
        log::debug!(
            "Model inputs prepared. Token count: {}, Scales: {scales:?}",
            tokens.len()
        );

        self.set_state(SynthesisState::Inferring);
        let model = pipeline.model.as_mut().ok_or(ChunkError::ModelNotLoaded)?;
        let samples = model.run(&ModelInputs::new(tokens, scales))?;
        log::debug!("Generated audio data length: {}", samples.len());

        Ok(AudioBuffer::new(samples, sample_rate))
    }

    fn wait_for_playback(&self, sink: &dyn AudioSink, duration: Duration) {
        let deadline = self
            .settings
            .playback_slack
            .map(|slack| Instant::now() + duration + slack);

        while sink.is_playing() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                log::warn!("Sink still playing after {duration:?} plus slack, moving on");
                return;
            }
            thread::sleep(self.settings.playback_poll_interval);
        }
    }
}
