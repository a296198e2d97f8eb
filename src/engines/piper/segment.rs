//! Punctuation-driven text segmentation.
//!
//! Text is cut at `, ; : . ? !`. Each mark becomes its own pausing chunk, and
//! the text between marks becomes a speakable chunk with its whitespace kept
//! as-is. Other symbols are not boundaries: they are blanked out when a
//! speakable chunk is cleaned for phonemization.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Anything that is neither a word character (letters, combining marks,
/// decimal digits, connector punctuation) nor whitespace.
static UNSPEAKABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// A punctuation mark followed by a pause in playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseMark {
    Comma,
    Semicolon,
    Colon,
    Period,
    Question,
    Exclamation,
}

impl PauseMark {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            ',' => Some(Self::Comma),
            ';' => Some(Self::Semicolon),
            ':' => Some(Self::Colon),
            '.' => Some(Self::Period),
            '?' => Some(Self::Question),
            '!' => Some(Self::Exclamation),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Semicolon => ';',
            Self::Colon => ':',
            Self::Period => '.',
            Self::Question => '?',
            Self::Exclamation => '!',
        }
    }
}

impl fmt::Display for PauseMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Pausing(PauseMark),
    Speakable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisChunk {
    /// The chunk exactly as it appeared in the input.
    pub text: String,
    pub kind: ChunkKind,
}

impl SynthesisChunk {
    fn pause(mark: PauseMark) -> Self {
        Self {
            text: mark.as_char().to_string(),
            kind: ChunkKind::Pausing(mark),
        }
    }

    fn speakable(text: String) -> Self {
        Self {
            text,
            kind: ChunkKind::Speakable,
        }
    }

    pub fn pause_mark(&self) -> Option<PauseMark> {
        match self.kind {
            ChunkKind::Pausing(mark) => Some(mark),
            ChunkKind::Speakable => None,
        }
    }

    /// Text to send to the phonemizer, or `None` if nothing speakable is left.
    ///
    /// Characters that are neither word characters nor whitespace become
    /// spaces, then the result is trimmed. Combining marks stay attached to
    /// their base letter.
    pub fn speakable_text(&self) -> Option<String> {
        if self.kind != ChunkKind::Speakable {
            return None;
        }
        let cleaned = UNSPEAKABLE.replace_all(&self.text, " ");
        let trimmed = cleaned.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Split `text` into chunks in source order.
///
/// Empty runs (between adjacent marks, or at either end) produce no chunk.
pub fn segment(text: &str) -> Vec<SynthesisChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        match PauseMark::from_char(ch) {
            Some(mark) => {
                if !current.is_empty() {
                    chunks.push(SynthesisChunk::speakable(std::mem::take(&mut current)));
                }
                chunks.push(SynthesisChunk::pause(mark));
            }
            None => current.push(ch),
        }
    }

    if !current.is_empty() {
        chunks.push(SynthesisChunk::speakable(current));
    }
    chunks
}
