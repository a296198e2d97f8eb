use std::path::PathBuf;
use std::time::Instant;

use piper_synth::engines::piper::{
    data::ensure_data_dir, EspeakPhonemizer, OnnxBackend, PiperModelParams,
    SynthesisOrchestrator, SynthesisSettings, VoiceStore,
};
use piper_synth::sink::WavFileSink;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let models_dir =
        PathBuf::from(std::env::var("PIPER_MODELS_DIR").unwrap_or_else(|_| "models/piper".into()));
    let voice = std::env::var("PIPER_VOICE").unwrap_or_else(|_| "en_US-amy-medium".into());

    // Either a system data directory, or a bundled archive unpacked next to the models.
    let data_dir = match std::env::var("ESPEAK_DATA_PATH") {
        Ok(path) => PathBuf::from(path),
        Err(_) => ensure_data_dir(&models_dir.join("espeak-ng-data.zip"), &models_dir)?,
    };

    let store = VoiceStore::new(&models_dir);
    println!("Available voices: {:?}", store.list_voices()?);

    let orchestrator = SynthesisOrchestrator::new(
        store,
        Box::new(EspeakPhonemizer::initialize(&data_dir)?),
        Box::new(OnnxBackend::new(PiperModelParams::default())),
        Box::new(WavFileSink::new("output", "chunk")?),
        SynthesisSettings::default(),
    );

    let load_start = Instant::now();
    let loaded = orchestrator.load_model(&voice)?;
    println!(
        "Model '{}' ({} Hz, espeak voice '{}') loaded in {:.2?}",
        loaded.model,
        loaded.sample_rate,
        loaded.voice_id,
        load_start.elapsed()
    );

    let text = "Hello! This is Piper, a fast local text to speech system. \
                It pauses at commas, periods, and questions; doesn't it?";

    let synth_start = Instant::now();
    let report = orchestrator.synthesize(text)?;
    println!(
        "Spoke {} chunks ({} failed, {} silent, {} pauses) in {:.2?}",
        report.spoken,
        report.failed,
        report.silent,
        report.pauses,
        synth_start.elapsed()
    );

    orchestrator.synthesize_to_file(text, &PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    orchestrator.unload_model()?;
    Ok(())
}
