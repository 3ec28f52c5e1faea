//! Text chunker — splits normalised text into units the synthesiser handles
//! in one call.
//!
//! Each line is its own unit (the game uses line breaks as pauses); lines
//! over the size bound are split between words. A word longer than the bound
//! is never cut and becomes a chunk of its own.

use std::sync::Arc;

use crate::voice::VoiceProfile;

/// Default upper bound (in characters) for one chunk.
pub const DEFAULT_MAX_CHARS: usize = 400;

/// One synthesis unit. `index` is the playback position within its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub content: String,
    pub profile: Arc<VoiceProfile>,
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars: max_chars.max(1) }
    }

    /// Split `text` into candidate units without attaching a voice.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut units = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.chars().count() <= self.max_chars {
                units.push(line.to_string());
                continue;
            }
            let mut current = String::new();
            let mut current_len = 0;
            for word in line.split_whitespace() {
                let word_len = word.chars().count();
                if !current.is_empty() && current_len + 1 + word_len > self.max_chars {
                    units.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if !current.is_empty() {
                    current.push(' ');
                    current_len += 1;
                }
                current.push_str(word);
                current_len += word_len;
            }
            if !current.is_empty() {
                units.push(current);
            }
        }
        units
    }

    /// Chunk a single-voice text. Indices start at 0.
    pub fn chunk(&self, text: &str, profile: Arc<VoiceProfile>) -> Vec<TextChunk> {
        self.chunk_segments([(text, profile)])
    }

    /// Chunk a sequence of voice segments (from the dialog formatter) into one
    /// ordered run with dense indices across all segments.
    pub fn chunk_segments<'a, I>(&self, segments: I) -> Vec<TextChunk>
    where
        I: IntoIterator<Item = (&'a str, Arc<VoiceProfile>)>,
    {
        let mut chunks = Vec::new();
        for (text, profile) in segments {
            for content in self.split(text) {
                chunks.push(TextChunk {
                    index: chunks.len(),
                    content,
                    profile: Arc::clone(&profile),
                });
            }
        }
        chunks
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
