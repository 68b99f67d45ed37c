use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::get_config;
use crate::services::storage::write_atomic;

/// Character cap applied before any provider call. Trailing content is
/// dropped silently.
pub const MAX_TTS_CHARS: usize = 16_000;

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const GOOGLE_TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";

// The unofficial translate endpoint rejects long inputs, so text is sent in
// whitespace-split chunks of at most this many characters.
const GOOGLE_TTS_CHUNK_CHARS: usize = 200;

#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns MP3 bytes for the given text.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String>;

    /// Playback estimate at an average speaking rate of 150 words/minute.
    /// Not measured from the actual audio.
    fn estimate_duration(&self, text: &str) -> f64 {
        let words = text.split_whitespace().count();
        words as f64 / 150.0 * 60.0
    }
}

pub struct OpenAiTts {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiTts {
    pub fn new(api_key: String, model: String, voice: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            voice,
        }
    }
}

#[async_trait]
impl TtsProvider for OpenAiTts {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String> {
        let payload = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3",
        });

        let res = self
            .client
            .post(OPENAI_SPEECH_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !res.status().is_success() {
            return Err(format!("API error: {}", res.status()));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?;

        Ok(bytes.to_vec())
    }
}

pub struct GoogleTranslateTts {
    client: reqwest::Client,
    language: String,
}

impl GoogleTranslateTts {
    pub fn new(language: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            language,
        }
    }
}

#[async_trait]
impl TtsProvider for GoogleTranslateTts {
    fn name(&self) -> &'static str {
        "google_translate"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String> {
        let mut audio = Vec::new();

        // MP3 frames are self-contained, so per-chunk responses concatenate
        // into one playable stream.
        for chunk in chunk_text(text, GOOGLE_TTS_CHUNK_CHARS) {
            let res = self
                .client
                .get(GOOGLE_TRANSLATE_TTS_URL)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("q", chunk.as_str()),
                ])
                .send()
                .await
                .map_err(|e| format!("Request failed: {}", e))?;

            if !res.status().is_success() {
                return Err(format!("API error: {}", res.status()));
            }

            let bytes = res
                .bytes()
                .await
                .map_err(|e| format!("Failed to read response body: {}", e))?;
            audio.extend_from_slice(&bytes);
        }

        Ok(audio)
    }
}

/// Last-resort provider that fabricates a short silent MP3 so a conversion
/// reaching this stage still yields a playable artifact. Every invocation
/// logs a warning: audio from here means both real providers failed.
pub struct SilentTts;

// MPEG-1 Layer III, 44.1 kHz, 128 kbps, mono. Frame size is
// 144 * 128000 / 44100 = 417 bytes; zeroed side info decodes as silence.
const SILENT_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];
const SILENT_FRAME_LEN: usize = 417;
// 38 frames * 1152 samples / 44100 Hz = 0.99s of audio, reported as 1.0.
const SILENT_FRAME_COUNT: usize = 38;
const SILENT_DURATION_SECS: f64 = 1.0;

impl SilentTts {
    fn silent_mp3() -> Vec<u8> {
        let mut data = Vec::with_capacity(SILENT_FRAME_COUNT * SILENT_FRAME_LEN);
        for _ in 0..SILENT_FRAME_COUNT {
            data.extend_from_slice(&SILENT_FRAME_HEADER);
            data.resize(data.len() + SILENT_FRAME_LEN - SILENT_FRAME_HEADER.len(), 0);
        }
        data
    }
}

#[async_trait]
impl TtsProvider for SilentTts {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, String> {
        tracing::warn!("TTS | silent fallback engaged, producing placeholder audio");
        Ok(Self::silent_mp3())
    }

    fn estimate_duration(&self, _text: &str) -> f64 {
        SILENT_DURATION_SECS
    }
}

/// Ordered provider chain. Each provider is tried in turn; an error or an
/// empty result falls through to the next.
pub struct SpeechSynthesizer {
    providers: Vec<Arc<dyn TtsProvider>>,
}

impl SpeechSynthesizer {
    pub fn new(providers: Vec<Arc<dyn TtsProvider>>) -> Self {
        Self { providers }
    }

    pub fn from_config() -> Self {
        let config = get_config();
        let mut providers: Vec<Arc<dyn TtsProvider>> = Vec::new();

        if let Some(key) = &config.openai_api_key {
            providers.push(Arc::new(OpenAiTts::new(
                key.clone(),
                config.openai_tts_model.clone(),
                config.openai_tts_voice.clone(),
            )));
        } else {
            tracing::warn!("TTS | OPENAI_API_KEY not set, primary provider disabled");
        }

        providers.push(Arc::new(GoogleTranslateTts::new(
            config.gtts_language.clone(),
        )));

        if config.tts_silent_fallback {
            providers.push(Arc::new(SilentTts));
        }

        Self::new(providers)
    }

    /// Writes the first successful synthesis into `output_dir` under a fresh
    /// name and returns it with the duration estimate. Returns `(None, 0.0)`
    /// only when every provider in the chain failed.
    pub async fn synthesize_to_file(&self, text: &str, output_dir: &Path) -> (Option<String>, f64) {
        let text = truncate_for_speech(text);

        for provider in &self.providers {
            match provider.synthesize(text).await {
                Ok(bytes) if bytes.is_empty() => {
                    tracing::warn!("TTS | provider={} | empty result, trying next", provider.name());
                }
                Ok(bytes) => {
                    let filename = format!("{}.mp3", Uuid::new_v4().simple());
                    let final_path = output_dir.join(&filename);
                    match write_atomic(output_dir.to_path_buf(), final_path, bytes).await {
                        Ok(()) => {
                            tracing::info!(
                                "TTS | provider={} | wrote {} ({} chars in)",
                                provider.name(),
                                filename,
                                text.chars().count()
                            );
                            return (Some(filename), provider.estimate_duration(text));
                        }
                        Err(e) => {
                            tracing::warn!(
                                "TTS | provider={} | failed to write artifact: {}",
                                provider.name(),
                                e
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("TTS | provider={} | {} | trying next", provider.name(), e);
                }
            }
        }

        (None, 0.0)
    }
}

/// Cuts text to the provider cap on a char boundary.
pub fn truncate_for_speech(text: &str) -> &str {
    if text.len() <= MAX_TTS_CHARS {
        return text;
    }
    match text.char_indices().nth(MAX_TTS_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();

        // A single word over the limit gets hard-split on char boundaries.
        if word_chars > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut piece = String::new();
            for c in word.chars() {
                piece.push(c);
                if piece.chars().count() == max_chars {
                    chunks.push(std::mem::take(&mut piece));
                }
            }
            if !piece.is_empty() {
                current = piece;
            }
            continue;
        }

        let current_chars = current.chars().count();
        if !current.is_empty() && current_chars + 1 + word_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticTts {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl TtsProvider for StaticTts {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, String> {
            Ok(self.bytes.clone())
        }
    }

    struct FailingTts;

    #[async_trait]
    impl TtsProvider for FailingTts {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, String> {
            Err("provider down".to_string())
        }
    }

    #[test]
    fn truncates_to_char_cap() {
        let long = "a".repeat(20_000);
        assert_eq!(truncate_for_speech(&long).len(), MAX_TTS_CHARS);

        let short = "hello world";
        assert_eq!(truncate_for_speech(short), short);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let long = "é".repeat(17_000);
        let cut = truncate_for_speech(&long);
        assert_eq!(cut.chars().count(), MAX_TTS_CHARS);
    }

    #[test]
    fn duration_estimate_uses_words_per_minute() {
        let provider = StaticTts { bytes: vec![1] };
        let text = vec!["word"; 300].join(" ");
        let secs = provider.estimate_duration(&text);
        assert!((secs - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn silent_provider_emits_valid_frames_with_fixed_duration() {
        let bytes = SilentTts::silent_mp3();
        assert_eq!(bytes.len(), SILENT_FRAME_COUNT * SILENT_FRAME_LEN);
        assert_eq!(&bytes[..4], &SILENT_FRAME_HEADER);
        assert_eq!(
            &bytes[SILENT_FRAME_LEN..SILENT_FRAME_LEN + 4],
            &SILENT_FRAME_HEADER
        );
        assert!((SilentTts.estimate_duration("whatever words") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn chunks_respect_limit_and_order() {
        let text = vec!["word"; 100].join(" ");
        let chunks = chunk_text(&text, 50);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn oversized_word_is_hard_split() {
        let text = format!("small {} small", "x".repeat(450));
        let chunks = chunk_text(&text, 200);
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
        let rejoined: String = chunks.concat();
        assert!(rejoined.contains(&"x".repeat(200)));
    }

    #[tokio::test]
    async fn chain_falls_through_to_next_provider() {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer = SpeechSynthesizer::new(vec![
            Arc::new(FailingTts),
            Arc::new(StaticTts { bytes: vec![0xFF, 0xFB, 1, 2, 3] }),
        ]);

        let (filename, duration) = synthesizer
            .synthesize_to_file("one two three", dir.path())
            .await;

        let filename = filename.unwrap();
        assert!(filename.ends_with(".mp3"));
        let on_disk = std::fs::read(dir.path().join(&filename)).unwrap();
        assert_eq!(on_disk, vec![0xFF, 0xFB, 1, 2, 3]);
        assert!(duration > 0.0);

        // Nothing but the artifact is left in the output directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn empty_result_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer = SpeechSynthesizer::new(vec![
            Arc::new(StaticTts { bytes: Vec::new() }),
            Arc::new(StaticTts { bytes: vec![9, 9] }),
        ]);

        let (filename, _) = synthesizer.synthesize_to_file("hi", dir.path()).await;
        let on_disk = std::fs::read(dir.path().join(filename.unwrap())).unwrap();
        assert_eq!(on_disk, vec![9, 9]);
    }

    #[tokio::test]
    async fn total_failure_returns_none_and_zero() {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer = SpeechSynthesizer::new(vec![Arc::new(FailingTts)]);

        let (filename, duration) = synthesizer.synthesize_to_file("hi", dir.path()).await;
        assert!(filename.is_none());
        assert_eq!(duration, 0.0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn silent_fallback_completes_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer =
            SpeechSynthesizer::new(vec![Arc::new(FailingTts), Arc::new(SilentTts)]);

        let (filename, duration) = synthesizer.synthesize_to_file("hi", dir.path()).await;
        assert!(filename.is_some());
        assert!((duration - SILENT_DURATION_SECS).abs() < f64::EPSILON);
    }
}
