//! Risk rating orchestration.
//!
//! [`RiskMeter::rate`] serves the cached verdict while it is fresh and
//! otherwise asks the provider for a new one:
//!
//! 1. reject an empty batch
//! 2. return the cached verdict if fresh
//! 3. load the prompt template and build the user message
//! 4. call the provider (credential resolved at call time)
//! 5. extract and parse the verdict, caching it only on success
//!
//! Input and configuration problems are returned as errors. Provider and
//! parse failures are masked as fallback verdicts (indicator 42), which are
//! never cached so the next request retries.
//!
//! With miss coalescing enabled, one request (the leader) computes while
//! concurrent misses wait on a `watch` channel and receive the leader's
//! outcome, fallbacks included. If the leader is cancelled before
//! publishing, a waiter takes over.

pub mod prompt;
pub mod verdict;

pub use prompt::{build_user_message, NewsItem, PromptSource};
pub use verdict::{extract_payload, parse_verdict, Verdict};

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ResultCache};
use crate::config::{Config, MeterConfig};
use crate::error::{MeterError, Result};
use crate::providers::{ChatOptions, LLMProvider, Message, OpenAIProvider};

/// Outcome handed from a leader to its waiters. `Err` carries a
/// configuration error message.
type Outcome = std::result::Result<Verdict, String>;

/// Receiver for the computation in progress, if any.
type InFlightSlot = Mutex<Option<watch::Receiver<Option<Outcome>>>>;

/// Rates batches of news items through an [`LLMProvider`], caching the verdict.
pub struct RiskMeter {
    provider: Arc<dyn LLMProvider>,
    cache: ResultCache<Verdict>,
    prompt: PromptSource,
    model: String,
    options: ChatOptions,
    /// Present when miss coalescing is enabled.
    in_flight: Option<InFlightSlot>,
}

impl std::fmt::Debug for RiskMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskMeter")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("prompt", &self.prompt.path())
            .field("ttl", &self.cache.ttl())
            .field("coalesce_misses", &self.in_flight.is_some())
            .finish()
    }
}

/// Leader's claim on the in-flight slot. Dropping it clears the slot before
/// the sender goes away, so waiters never re-join a dead computation.
struct Leader<'a> {
    slot: &'a InFlightSlot,
    tx: watch::Sender<Option<Outcome>>,
}

impl Leader<'_> {
    fn publish(&self, outcome: &Result<Verdict>) {
        let shared = match outcome {
            Ok(verdict) => Ok(verdict.clone()),
            Err(MeterError::Config(msg)) => Err(msg.clone()),
            Err(other) => Err(other.to_string()),
        };
        // The slot still holds a receiver, so the send cannot fail.
        let _ = self.tx.send(Some(shared));
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        *lock_slot(self.slot) = None;
    }
}

enum Claim<'a> {
    Leader(Leader<'a>),
    Waiter(watch::Receiver<Option<Outcome>>),
}

fn lock_slot(slot: &InFlightSlot) -> MutexGuard<'_, Option<watch::Receiver<Option<Outcome>>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RiskMeter {
    pub fn new(provider: Arc<dyn LLMProvider>, prompt: PromptSource, config: &MeterConfig) -> Self {
        let mut options = ChatOptions::new().with_max_tokens(config.max_tokens);
        if let Some(temperature) = config.temperature {
            options = options.with_temperature(temperature);
        }
        Self {
            provider,
            cache: ResultCache::new(config.cache_ttl()),
            prompt,
            model: config.model.clone(),
            options,
            in_flight: config.coalesce_misses.then(|| Mutex::new(None)),
        }
    }

    /// Wire the OpenAI provider and prompt location from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = OpenAIProvider::from_config(&config.provider, &config.meter.model)?;
        let prompt = PromptSource::resolve(config.meter.prompt_path.as_deref())?;
        info!(
            provider = provider.name(),
            model = %config.meter.model,
            prompt = %prompt.path().display(),
            ttl_secs = config.meter.cache_ttl_secs,
            "Risk meter configured"
        );
        Ok(Self::new(Arc::new(provider), prompt, &config.meter))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Produce a verdict for `items`, from the cache when it is fresh.
    ///
    /// The cache holds one verdict for the whole process: a fresh verdict is
    /// returned regardless of which batch produced it. The same holds for a
    /// coalesced waiter, which receives the leader's verdict.
    pub async fn rate(&self, items: &[NewsItem]) -> Result<Verdict> {
        if items.is_empty() {
            return Err(MeterError::InvalidInput("No articles provided".into()));
        }

        if let Some(verdict) = self.cache.try_get_fresh() {
            debug!(indicator = verdict.indicator, "Serving cached verdict");
            return Ok(verdict);
        }

        let Some(slot) = &self.in_flight else {
            return self.compute(items).await;
        };

        loop {
            let claim = {
                let mut current = lock_slot(slot);
                match current.as_ref() {
                    Some(rx) => Claim::Waiter(rx.clone()),
                    None => {
                        // A previous leader may have stored since our first check.
                        if let Some(verdict) = self.cache.try_get_fresh() {
                            return Ok(verdict);
                        }
                        let (tx, rx) = watch::channel(None);
                        *current = Some(rx);
                        Claim::Leader(Leader { slot, tx })
                    }
                }
            };

            match claim {
                Claim::Leader(leader) => {
                    let outcome = self.compute(items).await;
                    leader.publish(&outcome);
                    return outcome;
                }
                Claim::Waiter(mut rx) => {
                    let published = match rx.wait_for(Option::is_some).await {
                        Ok(value) => (*value).clone(),
                        Err(_) => None,
                    };
                    match published {
                        Some(Ok(verdict)) => {
                            debug!(indicator = verdict.indicator, "Serving coalesced verdict");
                            return Ok(verdict);
                        }
                        Some(Err(msg)) => return Err(MeterError::Config(msg)),
                        None => debug!("Leader abandoned its computation, retrying"),
                    }
                }
            }
        }
    }

    async fn compute(&self, items: &[NewsItem]) -> Result<Verdict> {
        let system_prompt = self.prompt.load().await?;
        let user_message = build_user_message(items);
        let messages = vec![Message::system(system_prompt), Message::user(user_message)];

        info!(items = items.len(), model = %self.model, "Cache miss, requesting new verdict");

        let response = match self
            .provider
            .chat(messages, Some(&self.model), self.options.clone())
            .await
        {
            Ok(response) => response,
            Err(MeterError::Config(msg)) => return Err(MeterError::Config(msg)),
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Provider call failed");
                return Ok(Verdict::fallback_upstream());
            }
        };

        if let Some(usage) = response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Provider usage"
            );
        }

        match parse_verdict(&response.content) {
            Ok(verdict) => {
                info!(indicator = verdict.indicator, "New verdict cached");
                self.cache.store(verdict.clone());
                Ok(verdict)
            }
            Err(e) => {
                warn!(error = %e, "Provider output is not a valid verdict");
                Ok(Verdict::fallback_parse())
            }
        }
    }
}
