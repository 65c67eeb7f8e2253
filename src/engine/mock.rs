use super::SpeechEngine;
use anyhow::Result;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::time::Duration;

// Common English words for generated transcripts
static VOCABULARY: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "I", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we",
    "say", "her", "she", "or", "an", "will", "my", "one", "all", "would", "there", "their",
    "what", "so", "up", "out", "if", "about", "who", "get", "which", "go", "me", "when", "make",
    "can", "like", "time", "no", "just", "him", "know", "take", "people", "into", "year", "your",
    "good", "some", "could", "them", "see", "other", "than", "then", "now", "look", "only",
    "come", "its", "over", "think", "also", "back", "after", "use", "two", "how", "our", "work",
    "first", "well", "way", "even", "new", "want", "because", "any", "these", "give", "day",
    "most", "us", "need", "house", "home", "hand", "school", "place", "while", "away", "keep",
    "let", "begin", "seem", "help", "show", "hear", "play", "run", "move", "live", "believe",
    "hold", "bring", "happen", "must", "write", "provide", "sit", "stand", "lose", "pay", "meet",
    "include", "continue", "set", "learn", "change", "lead", "understand", "watch", "follow",
    "stop", "create", "speak", "read", "allow", "add", "spend", "grow", "open", "walk", "win",
    "offer", "remember", "love", "consider", "appear", "buy", "wait", "serve", "send", "expect",
    "build", "stay", "fall", "cut", "reach", "remain", "suggest", "raise", "pass", "sell",
    "require", "report", "decide", "pull", "develop", "thank", "carry",
];

/// Generates realistic-looking transcript text, with word count
/// proportional to the amount of audio.
#[derive(Debug, Clone)]
pub struct TextGenerator {
    bytes_per_word: usize,
}

impl TextGenerator {
    pub fn new(bytes_per_word: usize) -> Self {
        Self {
            bytes_per_word: bytes_per_word.max(1),
        }
    }

    /// Generate text proportional to the audio byte count (always at
    /// least one word).
    pub fn generate(&self, audio_bytes: usize) -> String {
        let word_count = (audio_bytes / self.bytes_per_word).max(1);
        self.generate_words(word_count)
    }

    pub fn generate_words(&self, word_count: usize) -> String {
        let mut rng = rand::rng();
        let words: Vec<&str> = (0..word_count)
            .map(|_| VOCABULARY.choose(&mut rng).copied().unwrap_or("the"))
            .collect();
        words.join(" ")
    }
}

/// Mock speech engine: simulated latency plus fake text generation.
pub struct MockEngine {
    text_gen: TextGenerator,
    latency: Duration,
}

impl MockEngine {
    pub fn new(bytes_per_word: usize, latency: Duration) -> Self {
        Self {
            text_gen: TextGenerator::new(bytes_per_word),
            latency,
        }
    }
}

#[async_trait]
impl SpeechEngine for MockEngine {
    async fn transcribe_chunk(&self, audio: &[u8]) -> Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.text_gen.generate(audio.len()))
    }

    async fn finalize(&self) -> Result<String> {
        Ok(String::new())
    }
}
