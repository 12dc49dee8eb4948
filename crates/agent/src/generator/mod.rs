//! The advisory generator: one farm context in, one 7-day plan out.
//!
//! The model only writes the summary and the daily actions. The assumptions
//! attached to the plan are copied from the context the request was built
//! from, so the change detector compares structured fields, never prose.
//!
//! A failed attempt (transport error or unusable reply) is retried with the
//! same request up to the configured retry count; after that the last
//! failure is surfaced as [`Error::GenerationFailure`].

pub mod prompt;
pub mod reply;

pub use prompt::Replan;
pub use reply::{ParsedReply, ReplyError, parse_reply};

use chrono::Utc;
use farmloop_config::AppConfig;
use farmloop_core::error::{Error, Result};
use farmloop_core::event::{DomainEvent, EventBus};
use farmloop_core::farm::{FarmContext, SessionId};
use farmloop_core::plan::{AdvisoryPlan, PlanAssumptions};
use farmloop_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Model and retry settings for plan generation.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,

    /// Extra attempts after the first failure
    pub retries: u32,

    /// Replies shorter than this are unusable
    pub min_response_chars: usize,

    /// Ask the backend for a JSON object reply
    pub json_mode: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model: "mistral".into(),
            temperature: 0.2,
            max_tokens: Some(1024),
            retries: 1,
            min_response_chars: 50,
            json_mode: false,
        }
    }
}

impl GeneratorSettings {
    /// Settings for the configured default provider.
    pub fn from_config(config: &AppConfig) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());

        Self {
            model,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            retries: config.advisory_loop.generation_retries,
            min_response_chars: config.advisory_loop.min_response_chars,
            json_mode: false,
        }
    }
}

pub struct AdvisoryGenerator {
    provider: Arc<dyn Provider>,
    settings: GeneratorSettings,
    event_bus: Option<Arc<EventBus>>,
}

impl AdvisoryGenerator {
    pub fn new(provider: Arc<dyn Provider>, settings: GeneratorSettings) -> Self {
        Self {
            provider,
            settings,
            event_bus: None,
        }
    }

    /// Publish a [`DomainEvent::GenerationRetried`] for each failed attempt.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Write a plan for `context`.
    ///
    /// With `replan` set, the prompt explains what changed and the new plan's
    /// iteration follows the superseded one.
    pub async fn generate(
        &self,
        session_id: &SessionId,
        context: &FarmContext,
        replan: Option<Replan<'_>>,
    ) -> Result<AdvisoryPlan> {
        let iteration = replan.map_or(1, |r| r.previous.iteration + 1);
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: vec![prompt::system_message(), prompt::briefing(context, replan)],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_mode: self.settings.json_mode,
        };

        let max_attempts = self.settings.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                session_id = %session_id,
                iteration,
                attempt,
                model = %request.model,
                "Requesting plan"
            );

            let failure = match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    match parse_reply(&response.message.content, self.settings.min_response_chars)
                    {
                        Ok(parsed) => {
                            info!(
                                session_id = %session_id,
                                iteration,
                                attempt,
                                model = %response.model,
                                tokens = response.usage.as_ref().map(|u| u.total_tokens),
                                "Plan generated"
                            );
                            return Ok(AdvisoryPlan::new(
                                iteration,
                                parsed.summary,
                                PlanAssumptions::from_context(context),
                                parsed.actions,
                                response.message.content,
                                response.model,
                            ));
                        }
                        Err(e) => format!("unusable reply: {e}"),
                    }
                }
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                warn!(
                    session_id = %session_id,
                    attempt,
                    error = %failure,
                    "Plan generation failed"
                );
                return Err(Error::GenerationFailure {
                    attempts: attempt,
                    reason: failure,
                });
            }

            warn!(
                session_id = %session_id,
                attempt,
                error = %failure,
                "Plan generation failed, retrying"
            );
            if let Some(bus) = &self.event_bus {
                bus.publish(DomainEvent::GenerationRetried {
                    session_id: session_id.to_string(),
                    attempt,
                    error_message: failure,
                    timestamp: Utc::now(),
                });
            }
        }
    }
}
