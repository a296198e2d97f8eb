//! Audio output.
//!
//! The orchestrator hands every synthesized chunk to an [`AudioSink`] and then
//! polls [`AudioSink::is_playing`] until the sink is ready for the next one.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::engines::piper::error::SinkError;
use crate::AudioBuffer;

/// Destination for synthesized audio.
pub trait AudioSink: Send {
    /// Start playing `audio`. May return before playback finishes.
    fn play(&mut self, audio: AudioBuffer) -> Result<(), SinkError>;

    /// Whether the last buffer is still playing.
    fn is_playing(&self) -> bool;
}

/// Writes each buffer to its own numbered WAV file.
///
/// Files are named `<prefix>-000.wav`, `<prefix>-001.wav`, … in play order.
/// Writing is synchronous, so the sink never reports itself as playing.
#[derive(Debug)]
pub struct WavFileSink {
    dir: PathBuf,
    prefix: String,
    next_index: usize,
    written: Vec<PathBuf>,
}

impl WavFileSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            SinkError::Playback(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            next_index: 0,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in play order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl AudioSink for WavFileSink {
    fn play(&mut self, audio: AudioBuffer) -> Result<(), SinkError> {
        let path = self
            .dir
            .join(format!("{}-{:03}.wav", self.prefix, self.next_index));
        audio.write_wav(&path)?;
        log::debug!(
            "Wrote {:.2}s of audio to {}",
            audio.duration_secs(),
            path.display()
        );
        self.next_index += 1;
        self.written.push(path);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        false
    }
}

/// Forwards buffers to a channel for a consumer on another thread.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<AudioBuffer>,
}

impl ChannelSink {
    /// Create a sink and the receiver its buffers arrive on.
    pub fn new() -> (Self, Receiver<AudioBuffer>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl AudioSink for ChannelSink {
    fn play(&mut self, audio: AudioBuffer) -> Result<(), SinkError> {
        self.tx.send(audio).map_err(|_| SinkError::Closed)
    }

    fn is_playing(&self) -> bool {
        false
    }
}
