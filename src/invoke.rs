//! Fallback-chain execution: one prompt is tried against an ordered list of
//! model candidates until one succeeds, with bounded wait-and-retry for
//! transient failures under the patient policy.

use crate::llm::{ChatMessage, ErrorKind, GenerationCall, ModelProviderAdapter, ProviderError};
use std::time::{Duration, Instant};

pub const MAX_RETRIES: u32 = 2;
pub const ELAPSED_CEILING: Duration = Duration::from_secs(30);
const RATE_LIMIT_DELAY: Duration = Duration::from_secs(2);
const TIMEOUT_DELAY: Duration = Duration::from_secs(1);

const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);
const MAX_TOKENS_RANGE: (u32, u32) = (100, 8192);

/// How failures are absorbed before giving up on a candidate.
///
/// Explanation requests wait out rate limits and timeouts; every other task
/// moves straight down the chain, so non-explanation tasks fail faster. Both
/// behaviors are user-observable and deliberate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Patient,
    Eager,
}

#[derive(Debug, Clone)]
pub struct ModelCandidate {
    pub identifier: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub model: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success(String),
    Failure { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone)]
pub struct GenParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
    pub stream: bool,
}

impl GenParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature, max_tokens, json_mode: false, stream: false }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Clamp into provider-safe ranges.
    fn clamped(&self) -> Self {
        Self {
            temperature: self.temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
            max_tokens: self.max_tokens.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1),
            json_mode: self.json_mode,
            stream: self.stream,
        }
    }
}

/// Everything one request produced: the ordered attempt log and either the
/// first successful raw text or a terminal failure.
#[derive(Debug)]
pub struct Invocation {
    pub attempts: Vec<GenerationAttempt>,
    pub outcome: Result<String, ChainFailure>,
}

#[derive(Debug, Clone)]
pub struct ChainFailure {
    /// Terminal classification for the request as a whole; the per-call
    /// tags live in `last` and the attempt log.
    pub kind: ErrorKind,
    pub last: ProviderError,
    pub attempted: Vec<String>,
    pub elapsed: Duration,
    pub retries_exhausted: bool,
}

impl ChainFailure {
    pub fn attempted_list(&self) -> String {
        format!("[{}]", self.attempted.join(", "))
    }

    /// Terminal user-facing message under the patient policy. The elapsed
    /// ceiling wins over the specific failure kind; rate limits and
    /// timeouts that used up their retries land in the generic arm, which
    /// carries the raw provider text.
    pub fn patient_message(&self) -> String {
        if self.elapsed > ELAPSED_CEILING {
            return "The explanation is taking too long to generate. Your code might be \
                    very complex. Try sharing a smaller portion of the code."
                .to_string();
        }
        match self.last.kind {
            ErrorKind::InputTooLarge => "The code is too large to explain in one go. \
                                         Please share a smaller snippet or break it into logical parts."
                .to_string(),
            ErrorKind::ModelUnavailable => {
                let model = self.attempted.first().map(String::as_str).unwrap_or("selected");
                format!(
                    "The model '{}' is currently unavailable. Try again later or pick a different model.",
                    model
                )
            }
            _ => format!(
                "Could not generate an explanation: {}. Please try again with a simpler code snippet.",
                self.last
            ),
        }
    }
}

/// Primary first unless it already appears among the fallbacks, then the
/// fallbacks with duplicates removed preserving first occurrence. A model is
/// never tried twice within one request.
pub fn build_chain(primary: &str, fallbacks: &[String]) -> Vec<ModelCandidate> {
    let mut chain: Vec<ModelCandidate> = Vec::with_capacity(fallbacks.len() + 1);
    if !fallbacks.iter().any(|m| m == primary) {
        chain.push(ModelCandidate { identifier: primary.to_string(), is_primary: true });
    }
    for model in fallbacks {
        if chain.iter().any(|c| &c.identifier == model) {
            continue;
        }
        chain.push(ModelCandidate { identifier: model.clone(), is_primary: model == primary });
    }
    chain
}

pub struct Invoker<'a> {
    adapter: &'a dyn ModelProviderAdapter,
    policy: RetryPolicy,
    rate_limit_delay: Duration,
    timeout_delay: Duration,
}

impl<'a> Invoker<'a> {
    pub fn new(adapter: &'a dyn ModelProviderAdapter, policy: RetryPolicy) -> Self {
        Self {
            adapter,
            policy,
            rate_limit_delay: RATE_LIMIT_DELAY,
            timeout_delay: TIMEOUT_DELAY,
        }
    }

    /// Override the fixed retry delays (tests shrink them to zero).
    pub fn with_delays(mut self, rate_limit: Duration, timeout: Duration) -> Self {
        self.rate_limit_delay = rate_limit;
        self.timeout_delay = timeout;
        self
    }

    /// Walk the candidate chain until the first success. Failures are
    /// recorded as attempts; under the patient policy rate limits and
    /// timeouts are retried on the same candidate with a fixed delay,
    /// bounded by `MAX_RETRIES` per request. Hitting the bound is terminal:
    /// the request reports without touching untried candidates.
    pub async fn run(
        &self,
        prompt: &str,
        primary: &str,
        fallbacks: &[String],
        params: &GenParams,
    ) -> Invocation {
        let params = params.clamped();
        let started = Instant::now();
        let chain = build_chain(primary, fallbacks);
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut retries = 0u32;
        let mut last_err =
            ProviderError::new(ErrorKind::Unknown, "no model candidates configured");

        for (idx, candidate) in chain.iter().enumerate() {
            loop {
                let call = GenerationCall {
                    model: candidate.identifier.clone(),
                    messages: vec![ChatMessage::user(prompt)],
                    temperature: params.temperature,
                    max_tokens: params.max_tokens,
                    json_mode: params.json_mode,
                };
                let result = if params.stream {
                    self.collect_stream(call).await
                } else {
                    self.adapter.generate(call).await
                };
                match result {
                    Ok(text) => {
                        attempts.push(GenerationAttempt {
                            model: candidate.identifier.clone(),
                            outcome: AttemptOutcome::Success(text.clone()),
                        });
                        return Invocation { attempts, outcome: Ok(text) };
                    }
                    Err(e) => {
                        attempts.push(GenerationAttempt {
                            model: candidate.identifier.clone(),
                            outcome: AttemptOutcome::Failure {
                                kind: e.kind,
                                message: e.message.clone(),
                            },
                        });
                        let transient =
                            matches!(e.kind, ErrorKind::RateLimited | ErrorKind::TimedOut);
                        if self.policy == RetryPolicy::Patient && transient {
                            if retries < MAX_RETRIES {
                                retries += 1;
                                let delay = if e.kind == ErrorKind::RateLimited {
                                    self.rate_limit_delay
                                } else {
                                    self.timeout_delay
                                };
                                tokio::time::sleep(delay).await;
                                continue;
                            }
                            // Retry bound hit: terminal, remaining
                            // candidates stay untried.
                            let attempted = chain[..=idx]
                                .iter()
                                .map(|c| c.identifier.clone())
                                .collect();
                            return Invocation {
                                attempts,
                                outcome: Err(ChainFailure {
                                    kind: ErrorKind::Exhausted,
                                    last: e,
                                    attempted,
                                    elapsed: started.elapsed(),
                                    retries_exhausted: true,
                                }),
                            };
                        }
                        last_err = e;
                        break;
                    }
                }
            }
        }

        let attempted = chain.into_iter().map(|c| c.identifier).collect();
        Invocation {
            attempts,
            outcome: Err(ChainFailure {
                kind: ErrorKind::Exhausted,
                last: last_err,
                attempted,
                elapsed: started.elapsed(),
                retries_exhausted: false,
            }),
        }
    }

    /// Accumulate a streamed response into one terminal string; a chunk
    /// error fails the whole candidate.
    async fn collect_stream(&self, call: GenerationCall) -> Result<String, ProviderError> {
        use futures_util::StreamExt;
        let mut stream = self.adapter.generate_stream(call).await?;
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            content.push_str(&chunk?);
        }
        if content.is_empty() {
            return Err(ProviderError::new(ErrorKind::Unknown, "empty response received"));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TextStream;
    use async_stream::try_stream;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Adapter returning a scripted sequence of outcomes.
    struct ScriptedAdapter {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(script: Vec<Result<String, ProviderError>>) -> Self {
            Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ModelProviderAdapter for ScriptedAdapter {
        async fn generate(&self, _call: GenerationCall) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::new(ErrorKind::Unknown, "script exhausted")))
        }

        async fn generate_stream(&self, call: GenerationCall) -> Result<TextStream, ProviderError> {
            let text = self.generate(call).await?;
            let s = try_stream! {
                for piece in text.split_inclusive(' ') {
                    yield piece.to_string();
                }
            };
            Ok(Box::pin(s))
        }
    }

    fn models(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chain_places_primary_first_and_dedupes() {
        let chain = build_chain("a", &models(&["b", "c", "b"]));
        let ids: Vec<&str> = chain.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(chain[0].is_primary);
        assert!(!chain[1].is_primary);
    }

    #[test]
    fn chain_keeps_fallback_order_when_primary_already_listed() {
        let chain = build_chain("b", &models(&["a", "b", "c"]));
        let ids: Vec<&str> = chain.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(chain[1].is_primary);
    }

    #[test]
    fn params_are_clamped_to_provider_safe_ranges() {
        let p = GenParams::new(2.5, 10).clamped();
        assert_eq!(p.temperature, 1.0);
        assert_eq!(p.max_tokens, 100);
        let p = GenParams::new(-0.3, 1_000_000).clamped();
        assert_eq!(p.temperature, 0.0);
        assert_eq!(p.max_tokens, 8192);
    }

    #[tokio::test]
    async fn degrades_through_chain_until_success() {
        let adapter = ScriptedAdapter::new(vec![
            Err(ProviderError::classify("model_decommissioned")),
            Err(ProviderError::classify("internal error")),
            Ok("generated text".to_string()),
        ]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Eager);
        let inv = invoker
            .run("prompt", "a", &models(&["b", "c"]), &GenParams::new(0.2, 1024))
            .await;
        assert_eq!(inv.attempts.len(), 3);
        assert!(matches!(inv.attempts[0].outcome, AttemptOutcome::Failure { .. }));
        assert!(matches!(inv.attempts[1].outcome, AttemptOutcome::Failure { .. }));
        assert!(matches!(inv.attempts[2].outcome, AttemptOutcome::Success(_)));
        assert_eq!(inv.attempts[2].model, "c");
        assert_eq!(inv.outcome.unwrap(), "generated text");
    }

    #[tokio::test]
    async fn success_short_circuits_remaining_candidates() {
        let adapter = ScriptedAdapter::new(vec![Ok("first".to_string())]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Eager);
        let inv = invoker
            .run("prompt", "a", &models(&["b", "c"]), &GenParams::new(0.2, 1024))
            .await;
        assert_eq!(adapter.calls(), 1);
        assert_eq!(inv.attempts.len(), 1);
    }

    #[tokio::test]
    async fn patient_policy_retries_rate_limits_then_reports() {
        let rate = || Err(ProviderError::classify("rate limit exceeded"));
        let adapter = ScriptedAdapter::new(vec![rate(), rate(), rate()]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Patient)
            .with_delays(Duration::ZERO, Duration::ZERO);
        let inv = invoker
            .run("prompt", "a", &models(&["b"]), &GenParams::new(0.2, 2048))
            .await;
        // initial call plus MAX_RETRIES retries on the same candidate;
        // hitting the bound is terminal, so "b" is never tried
        assert_eq!(adapter.calls(), 1 + MAX_RETRIES as usize);
        let failure = inv.outcome.unwrap_err();
        assert!(failure.retries_exhausted);
        assert_eq!(failure.kind, ErrorKind::Exhausted);
        assert_eq!(failure.attempted, vec!["a".to_string()]);
        let message = failure.patient_message();
        assert!(message.contains("Could not generate an explanation"));
        assert!(message.contains("rate limit exceeded"));
    }

    #[tokio::test]
    async fn patient_policy_degrades_on_non_transient_failure() {
        let adapter = ScriptedAdapter::new(vec![
            Err(ProviderError::classify("model_decommissioned")),
            Ok("from fallback".to_string()),
        ]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Patient)
            .with_delays(Duration::ZERO, Duration::ZERO);
        let inv = invoker.run("prompt", "a", &models(&["b"]), &GenParams::new(0.2, 2048)).await;
        assert_eq!(inv.outcome.unwrap(), "from fallback");
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn eager_policy_never_retries_transient_failures() {
        let adapter = ScriptedAdapter::new(vec![
            Err(ProviderError::classify("rate limit exceeded")),
            Err(ProviderError::classify("rate limit exceeded")),
        ]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Eager);
        let inv = invoker.run("prompt", "a", &models(&["b"]), &GenParams::new(0.2, 1024)).await;
        assert_eq!(adapter.calls(), 2);
        let failure = inv.outcome.unwrap_err();
        assert!(!failure.retries_exhausted);
        assert_eq!(failure.attempted, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn exhaustion_reports_all_attempted_models() {
        let boom = || Err(ProviderError::classify("internal error"));
        let adapter = ScriptedAdapter::new(vec![boom(), boom(), boom()]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Eager);
        let inv = invoker.run("prompt", "a", &models(&["b", "c"]), &GenParams::new(0.2, 1024)).await;
        let failure = inv.outcome.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Exhausted);
        assert_eq!(failure.attempted_list(), "[a, b, c]");
    }

    #[tokio::test]
    async fn streaming_accumulates_chunks_into_one_string() {
        let adapter = ScriptedAdapter::new(vec![Ok("streamed words here".to_string())]);
        let invoker = Invoker::new(&adapter, RetryPolicy::Eager);
        let inv = invoker
            .run("prompt", "a", &[], &GenParams::new(0.2, 1024).streaming(true))
            .await;
        assert_eq!(inv.outcome.unwrap(), "streamed words here");
    }

    #[test]
    fn patient_messages_select_by_kind() {
        let failure = |kind: ErrorKind, msg: &str| ChainFailure {
            kind: ErrorKind::Exhausted,
            last: ProviderError::new(kind, msg),
            attempted: vec!["model-a".into()],
            elapsed: Duration::from_secs(1),
            retries_exhausted: false,
        };
        assert!(failure(ErrorKind::InputTooLarge, "token limit")
            .patient_message()
            .contains("too large"));
        assert!(failure(ErrorKind::ModelUnavailable, "gone")
            .patient_message()
            .contains("'model-a' is currently unavailable"));
        assert!(failure(ErrorKind::Unknown, "boom")
            .patient_message()
            .contains("boom"));
        assert!(failure(ErrorKind::RateLimited, "rate limit exceeded")
            .patient_message()
            .contains("rate limit exceeded"));

        // the ceiling wins regardless of kind or exhausted retries
        let slow = ChainFailure {
            kind: ErrorKind::Exhausted,
            last: ProviderError::new(ErrorKind::RateLimited, "rate limit exceeded"),
            attempted: vec!["model-a".into()],
            elapsed: ELAPSED_CEILING + Duration::from_secs(1),
            retries_exhausted: true,
        };
        assert!(slow.patient_message().contains("taking too long"));
    }
}
