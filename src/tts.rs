//! Narration: podcast script → one audio clip per dialogue line.
//!
//! Each line is synthesised with the voice of its speaker. Lines run
//! concurrently up to a limit but come back in script order, and a line that
//! fails carries its [`SpeechError`] without stopping the others.
//!
//! The production backend, [`HttpSpeechBackend`], talks to an
//! OpenAI-compatible `/audio/speech` endpoint (Groq's PlayAI voices by
//! default).

use crate::config::VoicePair;
use crate::error::{ProviderError, SpeechError, StudyGenError};
use crate::output::{PodcastScript, Speaker};
use crate::progress::NarrationProgressCallback;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest text sent in a single synthesis request, in characters.
pub const MAX_SPEECH_CHARS: usize = 10_000;

pub const DEFAULT_SPEECH_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_SPEECH_MODEL: &str = "playai-tts";
pub const DEFAULT_SPEECH_FORMAT: &str = "wav";

/// A text-to-speech service.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesise `text` with `voice`, returning encoded audio.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError>;
}

/// [`SpeechBackend`] over HTTP.
pub struct HttpSpeechBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    response_format: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl HttpSpeechBackend {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, StudyGenError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StudyGenError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: DEFAULT_SPEECH_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_SPEECH_MODEL.to_string(),
            response_format: DEFAULT_SPEECH_FORMAT.to_string(),
            timeout_secs,
        })
    }

    /// Backend keyed from `GROQ_API_KEY`, with `STUDYGEN_TTS_BASE_URL` and
    /// `STUDYGEN_TTS_MODEL` overrides.
    pub fn from_env(timeout_secs: u64) -> Result<Self, StudyGenError> {
        let api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| StudyGenError::ProviderNotConfigured {
                provider: "tts".to_string(),
                hint: "Set GROQ_API_KEY to enable narration.".to_string(),
            })?;

        let mut backend = Self::new(api_key, timeout_secs)?;
        if let Ok(url) = std::env::var("STUDYGEN_TTS_BASE_URL") {
            backend = backend.with_base_url(url);
        }
        if let Ok(model) = std::env::var("STUDYGEN_TTS_MODEL") {
            backend = backend.with_model(model);
        }
        Ok(backend)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = SpeechRequest {
            model: &self.model,
            voice,
            input: text,
            response_format: &self.response_format,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ProviderError::from_message(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_message(format!("HTTP {status}: {detail}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_message(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// One narrated dialogue line.
#[derive(Debug, Clone)]
pub struct NarratedLine {
    /// Position of the line in the script.
    pub index: usize,
    pub speaker: Speaker,
    pub text: String,
    pub voice: String,
    pub audio: Result<Vec<u8>, SpeechError>,
}

impl NarratedLine {
    pub fn is_ok(&self) -> bool {
        self.audio.is_ok()
    }

    /// `line_{index:03}_speaker{n}.wav`
    pub fn file_name(&self) -> String {
        format!("line_{:03}_speaker{}.wav", self.index, self.speaker.number())
    }
}

/// Synthesise every line of `script`, at most `concurrency` at a time.
///
/// Output is in script order. Empty lines are reported as
/// [`SpeechError::EmptyText`] without calling the backend.
pub async fn narrate(
    script: &PodcastScript,
    backend: &dyn SpeechBackend,
    voices: VoicePair,
    concurrency: usize,
    progress: Option<&dyn NarrationProgressCallback>,
) -> Vec<NarratedLine> {
    let (voice1, voice2) = voices.voices();
    let total = script.dialogue.len();
    info!(
        backend = backend.name(),
        lines = total,
        voice1,
        voice2,
        "Narrating podcast script"
    );
    if let Some(cb) = progress {
        cb.on_narration_start(total);
    }

    let narrated: Vec<NarratedLine> = stream::iter(script.dialogue.iter().enumerate().map(
        |(index, line)| {
            let voice = match line.speaker {
                Speaker::One => voice1,
                Speaker::Two => voice2,
            };
            async move {
                if let Some(cb) = progress {
                    cb.on_line_start(index, total);
                }
                let audio = synthesize_line(backend, index, &line.text, voice).await;
                if let Some(cb) = progress {
                    match &audio {
                        Ok(bytes) => cb.on_line_complete(index, total, bytes.len()),
                        Err(e) => cb.on_line_error(index, total, &e.to_string()),
                    }
                }
                NarratedLine {
                    index,
                    speaker: line.speaker,
                    text: line.text.clone(),
                    voice: voice.to_string(),
                    audio,
                }
            }
        },
    ))
    .buffered(concurrency.max(1))
    .collect()
    .await;

    let success = narrated.iter().filter(|l| l.is_ok()).count();
    info!(lines = total, success, "Narration finished");
    if let Some(cb) = progress {
        cb.on_narration_complete(total, success);
    }
    narrated
}

async fn synthesize_line(
    backend: &dyn SpeechBackend,
    index: usize,
    text: &str,
    voice: &str,
) -> Result<Vec<u8>, SpeechError> {
    let text = text.trim();
    if text.is_empty() {
        warn!(index, "Skipping empty dialogue line");
        return Err(SpeechError::EmptyText { index });
    }

    let text = match text.char_indices().nth(MAX_SPEECH_CHARS) {
        Some((cut, _)) => {
            warn!(index, limit = MAX_SPEECH_CHARS, "Dialogue line too long; truncating");
            &text[..cut]
        }
        None => text,
    };

    debug!(index, voice, chars = text.chars().count(), "Synthesising line");
    backend.synthesize(text, voice).await.map_err(|e| {
        warn!(index, error = %e, "Speech synthesis failed");
        SpeechError::SynthesisFailed {
            index,
            detail: e.to_string(),
        }
    })
}

/// Write every successful line to `dir` as `line_{index:03}_speaker{n}.wav`.
///
/// Creates `dir` if needed. Returns the written paths in script order.
pub async fn write_audio_files(
    dir: &Path,
    lines: &[NarratedLine],
) -> Result<Vec<PathBuf>, StudyGenError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StudyGenError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::new();
    for line in lines {
        let Ok(audio) = &line.audio else {
            continue;
        };
        let path = dir.join(line.file_name());
        let tmp_path = path.with_extension("wav.tmp");
        tokio::fs::write(&tmp_path, audio)
            .await
            .map_err(|e| StudyGenError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StudyGenError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!(path = %path.display(), bytes = audio.len(), "Saved audio");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DialogueLine;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Returns the text length as a little "audio" payload; fails on "boom".
    struct EchoBackend {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl EchoBackend {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), voice.to_string()));
            if text.contains("boom") {
                return Err(ProviderError::from_message("HTTP 500: boom"));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn script(lines: Vec<DialogueLine>) -> PodcastScript {
        PodcastScript {
            id: Uuid::new_v4(),
            document_id: "doc".into(),
            speaker1: "Alex".into(),
            speaker2: "Jordan".into(),
            dialogue: lines,
            fallback: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lines_keep_order_and_voices() {
        let backend = EchoBackend::new();
        let s = script(vec![
            DialogueLine::new(Speaker::One, "Welcome to the show."),
            DialogueLine::new(Speaker::Two, "Glad to be here today."),
            DialogueLine::new(Speaker::One, "Let's get started then."),
        ]);
        let out = narrate(&s, &backend, VoicePair::MaleFemale, 3, None).await;

        let indices: Vec<usize> = out.iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(out[0].voice, "Fritz-PlayAI");
        assert_eq!(out[1].voice, "Cheyenne-PlayAI");
        assert_eq!(out[2].audio.as_deref().unwrap(), b"Let's get started then.");
    }

    #[tokio::test]
    async fn failed_and_empty_lines_do_not_abort() {
        let backend = EchoBackend::new();
        let s = script(vec![
            DialogueLine::new(Speaker::One, "This line goes boom."),
            DialogueLine::new(Speaker::Two, "   "),
            DialogueLine::new(Speaker::One, "This one is fine."),
        ]);
        let out = narrate(&s, &backend, VoicePair::MaleMale, 1, None).await;

        assert!(matches!(
            out[0].audio,
            Err(SpeechError::SynthesisFailed { index: 0, .. })
        ));
        assert!(matches!(out[1].audio, Err(SpeechError::EmptyText { index: 1 })));
        assert!(out[2].is_ok());
        // empty line never reaches the backend
        assert_eq!(backend.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn long_text_is_truncated() {
        let backend = EchoBackend::new();
        let long = "a".repeat(MAX_SPEECH_CHARS + 500);
        let s = script(vec![DialogueLine::new(Speaker::Two, long)]);
        let out = narrate(&s, &backend, VoicePair::FemaleFemale, 2, None).await;
        assert_eq!(out[0].audio.as_ref().unwrap().len(), MAX_SPEECH_CHARS);
        assert_eq!(backend.calls.lock().unwrap()[0].1, "Deedee-PlayAI");
    }

    #[tokio::test]
    async fn audio_files_are_named_by_index_and_speaker() {
        let backend = EchoBackend::new();
        let s = script(vec![
            DialogueLine::new(Speaker::One, "First line of audio."),
            DialogueLine::new(Speaker::Two, "Second line goes boom."),
            DialogueLine::new(Speaker::Two, "Third line of audio."),
        ]);
        let out = narrate(&s, &backend, VoicePair::MaleFemale, 2, None).await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("episode");
        let paths = write_audio_files(&target, &out).await.unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["line_000_speaker1.wav", "line_002_speaker2.wav"]);
        let bytes = std::fs::read(&paths[1]).unwrap();
        assert_eq!(bytes, b"Third line of audio.");
    }
}
