//! Generation backend boundary: send a prompt, get text back.
//!
//! Prompt engineering lives in [`crate::prompts`] and all parsing in
//! [`super::extract`] / [`super::dialogue`]; this module owns four things:
//!
//! 1. the [`CompletionBackend`] seam, so tests and alternative providers can
//!    be swapped in without touching the pipeline;
//! 2. lazy, once-only construction of the backend handle;
//! 3. timeout, cancellation and optional retry with exponential backoff;
//! 4. translating every call failure into a sentinel string.
//!
//! ## Sentinel contract
//!
//! [`GenerationInvoker::invoke`] never returns a provider failure as `Err`.
//! Transport errors, rate limits, timeouts and cancellation all come back as
//! `Ok` text beginning with [`crate::error::ERROR_SENTINEL_PREFIX`], which the
//! parsers treat as "no usable content". The only `Err` is a configuration
//! failure while building the backend on first use.

use crate::config::GenerationConfig;
use crate::error::{ProviderError, StudyGenError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A text-generation service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Complete a single user prompt.
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, ProviderError>;
}

/// [`CompletionBackend`] backed by an `edgequake-llm` provider.
pub struct LlmBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl LlmBackend {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let messages = vec![ChatMessage::user_with_images(prompt, Vec::new())];
        let options = CompletionOptions {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ProviderError::from_message(format!("{e}")))?;

        debug!(
            backend = %self.name,
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "Completion finished"
        );
        Ok(response.content)
    }
}

type BackendFactory =
    Arc<dyn Fn() -> Result<Arc<dyn CompletionBackend>, StudyGenError> + Send + Sync>;

/// Owns the backend handle and the call policy.
///
/// Cheap to share behind an `Arc`; concurrent pipelines reuse one backend.
pub struct GenerationInvoker {
    backend: OnceCell<Arc<dyn CompletionBackend>>,
    factory: BackendFactory,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
}

impl fmt::Debug for GenerationInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationInvoker")
            .field("initialised", &self.backend.initialized())
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenerationInvoker {
    /// Invoker over an already constructed backend.
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &GenerationConfig) -> Self {
        Self::with_factory(move || Ok(Arc::clone(&backend)), config)
    }

    /// Invoker that builds its backend on first use.
    ///
    /// `factory` runs at most once, even when the first calls race.
    pub fn with_factory<F>(factory: F, config: &GenerationConfig) -> Self
    where
        F: Fn() -> Result<Arc<dyn CompletionBackend>, StudyGenError> + Send + Sync + 'static,
    {
        Self {
            backend: OnceCell::new(),
            factory: Arc::new(factory),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Invoker that resolves an `edgequake-llm` provider from `config` on first use.
    ///
    /// Missing credentials are not detected here; they surface as
    /// [`StudyGenError::ProviderNotConfigured`] from the first `invoke`.
    pub fn from_config(config: &GenerationConfig) -> Self {
        let settings = config.clone();
        Self::with_factory(move || resolve_backend(&settings), config)
    }

    /// Whether the backend has been constructed yet.
    pub fn is_initialised(&self) -> bool {
        self.backend.initialized()
    }

    async fn backend(&self) -> Result<&Arc<dyn CompletionBackend>, StudyGenError> {
        self.backend
            .get_or_try_init(|| async { (self.factory)() })
            .await
    }

    /// Send `prompt` and return the generated text or a sentinel string.
    pub async fn invoke(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<String, StudyGenError> {
        let backend = self.backend().await?;
        let start = Instant::now();
        let mut last_err = ProviderError::Api {
            message: "no attempt made".to_string(),
        };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    backend = backend.name(),
                    "retry {}/{} after {}ms", attempt, self.max_retries, backoff
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        last_err = ProviderError::Cancelled;
                        break;
                    }
                    _ = sleep(Duration::from_millis(backoff)) => {}
                }
            }

            match self
                .attempt(backend.as_ref(), prompt, max_tokens, temperature, cancel)
                .await
            {
                Ok(text) => {
                    info!(
                        backend = backend.name(),
                        chars = text.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Generation succeeded"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        attempt = attempt + 1,
                        error = %e,
                        "Generation attempt failed"
                    );
                    let retryable = e.is_retryable();
                    last_err = e;
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Ok(last_err.sentinel())
    }

    async fn attempt(
        &self,
        backend: &dyn CompletionBackend,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            res = tokio::time::timeout(self.timeout, backend.complete(prompt, max_tokens, temperature)) => {
                match res {
                    Ok(inner) => inner,
                    Err(_) => Err(ProviderError::Timeout { secs: self.timeout.as_secs() }),
                }
            }
        }
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), via
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, with `config.model`.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_backend(config: &GenerationConfig) -> Result<Arc<dyn CompletionBackend>, StudyGenError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(LlmBackend::new("custom", Arc::clone(provider))));
    }

    match route(config, |key| std::env::var(key).ok()) {
        ProviderRoute::Named { provider, model } => create_backend(&provider, &model),
        ProviderRoute::AutoDetect => {
            if let Some(ref model) = config.model {
                warn!(model = %model, "no provider named; auto-detected provider uses its default model");
            }
            let (llm_provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| StudyGenError::ProviderNotConfigured {
                    provider: "auto".to_string(),
                    hint: format!(
                        "No LLM provider could be auto-detected from environment.\n\
                        Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                        Error: {}",
                        e
                    ),
                })?;
            Ok(Arc::new(LlmBackend::new("auto", llm_provider)))
        }
    }
}

/// Exponential backoff before retry `attempt` (1-based), capped at [`MAX_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
        .min(MAX_BACKOFF_MS)
}

/// Upper bound on a single retry delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Where a backend without a pre-built provider comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProviderRoute {
    Named { provider: String, model: String },
    AutoDetect,
}

/// Steps 2 to 5 of [`resolve_backend`], with environment lookup injected.
fn route(config: &GenerationConfig, env: impl Fn(&str) -> Option<String>) -> ProviderRoute {
    let set = |key: &str| env(key).filter(|v| !v.is_empty());

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return ProviderRoute::Named {
            provider: name.clone(),
            model: model.to_string(),
        };
    }

    if let (Some(provider), Some(model)) = (set("EDGEQUAKE_LLM_PROVIDER"), set("EDGEQUAKE_MODEL")) {
        return ProviderRoute::Named { provider, model };
    }

    if set("OPENAI_API_KEY").is_some() {
        return ProviderRoute::Named {
            provider: "openai".to_string(),
            model: config.model.as_deref().unwrap_or(DEFAULT_MODEL).to_string(),
        };
    }

    ProviderRoute::AutoDetect
}

/// Model used with a named provider when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

fn create_backend(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn CompletionBackend>, StudyGenError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StudyGenError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(LlmBackend::new(
        format!("{provider_name}/{model}"),
        provider,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_error_sentinel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a queue of results, then repeats the last one.
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new(vec![Ok("late".into())])
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _prompt: &str,
            _max_tokens: usize,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                sleep(d).await;
            }
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            }
        }
    }

    fn config() -> GenerationConfig {
        GenerationConfig::builder()
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn success_returns_text() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("[1]".into())]));
        let invoker = GenerationInvoker::new(backend, &config());
        let out = invoker
            .invoke("p", 10, 0.5, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "[1]");
    }

    #[tokio::test]
    async fn provider_error_becomes_sentinel() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(ProviderError::Api {
            message: "500".into(),
        })]));
        let invoker = GenerationInvoker::new(backend.clone(), &config());
        let out = invoker
            .invoke("p", 10, 0.5, &CancellationToken::new())
            .await
            .unwrap();
        assert!(is_error_sentinel(&out), "got: {out}");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1, "no retries by default");
    }

    #[tokio::test]
    async fn retries_when_configured() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ProviderError::RateLimited {
                message: "429".into(),
            }),
            Ok("ok".into()),
        ]));
        let cfg = GenerationConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let invoker = GenerationInvoker::new(backend.clone(), &cfg);
        let out = invoker
            .invoke("p", 10, 0.5, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_returns_sentinel() {
        let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(30)));
        let invoker = GenerationInvoker::new(backend, &config());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let out = invoker.invoke("p", 10, 0.5, &cancel).await.unwrap();
        assert_eq!(out, ProviderError::Cancelled.sentinel());
    }

    #[tokio::test]
    async fn timeout_returns_sentinel() {
        let backend = Arc::new(ScriptedBackend::slow(Duration::from_secs(10)));
        let cfg = GenerationConfig::builder()
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let invoker = GenerationInvoker::new(backend, &cfg);
        let out = invoker
            .invoke("p", 10, 0.5, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, ProviderError::Timeout { secs: 1 }.sentinel());
    }

    #[tokio::test]
    async fn factory_runs_once_across_concurrent_callers() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let invoker = Arc::new(GenerationInvoker::with_factory(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(ScriptedBackend::new(vec![Ok("x".into())])) as Arc<dyn CompletionBackend>)
            },
            &config(),
        ));
        assert!(!invoker.is_initialised());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let inv = Arc::clone(&invoker);
                tokio::spawn(async move {
                    inv.invoke("p", 1, 0.1, &CancellationToken::new())
                        .await
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), "x");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(invoker.is_initialised());
    }

    #[tokio::test]
    async fn configuration_error_surfaces_at_first_use() {
        let invoker = GenerationInvoker::with_factory(
            || {
                Err(StudyGenError::ProviderNotConfigured {
                    provider: "groq".into(),
                    hint: "GROQ_API_KEY not set".into(),
                })
            },
            &config(),
        );
        let err = invoker
            .invoke("p", 1, 0.1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StudyGenError::ProviderNotConfigured { .. }));
        assert!(!invoker.is_initialised());
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn named(provider: &str, model: &str) -> ProviderRoute {
        ProviderRoute::Named {
            provider: provider.into(),
            model: model.into(),
        }
    }

    #[test]
    fn openai_key_honours_configured_model() {
        let cfg = GenerationConfig::builder().model("gpt-4.1-mini").build().unwrap();
        let picked = route(&cfg, env_of(&[("OPENAI_API_KEY", "sk-dummy")]));
        assert_eq!(picked, named("openai", "gpt-4.1-mini"));
    }

    #[test]
    fn openai_key_without_model_uses_default() {
        let picked = route(&config(), env_of(&[("OPENAI_API_KEY", "sk-dummy")]));
        assert_eq!(picked, named("openai", DEFAULT_MODEL));
    }

    #[test]
    fn named_provider_and_env_pair_win_over_openai_key() {
        let cfg = GenerationConfig::builder()
            .provider_name("anthropic")
            .model("claude-x")
            .build()
            .unwrap();
        let env = env_of(&[
            ("OPENAI_API_KEY", "sk-dummy"),
            ("EDGEQUAKE_LLM_PROVIDER", "gemini"),
            ("EDGEQUAKE_MODEL", "gemini-pro"),
        ]);
        assert_eq!(route(&cfg, &env), named("anthropic", "claude-x"));
        assert_eq!(route(&config(), &env), named("gemini", "gemini-pro"));
    }

    #[test]
    fn empty_variables_fall_through_to_auto_detect() {
        let env = env_of(&[("OPENAI_API_KEY", ""), ("EDGEQUAKE_LLM_PROVIDER", "gemini")]);
        assert_eq!(route(&config(), env), ProviderRoute::AutoDetect);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 40), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, 2), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(500, u32::MAX), MAX_BACKOFF_MS);
    }
}
