//! The advisory loop: a small state machine over the context builder,
//! generator and change detector.
//!
//! ```text
//! COLLECTING ──▶ ADVISING ──▶ EVALUATING ──▶ DONE
//!                   ▲              │
//!                   └── changed ───┘
//! ```
//!
//! The loop ends when a fresh context no longer contradicts the current plan,
//! or earlier when the iteration cap, the wall-clock budget or the replan
//! gate stops it. Every ending returns the plan that was current at the time.

use crate::context::ContextBuilder;
use crate::detector::ChangeDetector;
use crate::generator::{AdvisoryGenerator, Replan};
use async_trait::async_trait;
use chrono::Utc;
use farmloop_config::LoopConfig;
use farmloop_core::error::{Error, Result};
use farmloop_core::event::{DomainEvent, EventBus};
use farmloop_core::farm::{FarmContext, FarmInput, SessionId};
use farmloop_core::plan::{AdvisoryPlan, ChangeSignal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Collecting,
    Advising,
    Evaluating,
    Done(Termination),
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Fresh conditions matched the plan's assumptions
    Stable,
    /// Conditions still differed but the plan limit was reached
    IterationCap,
    /// The wall-clock budget ran out
    TimeBudget,
    /// The replan gate refused a regeneration
    Declined,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Stable => "stable",
            Termination::IterationCap => "iteration_cap",
            Termination::TimeBudget => "time_budget",
            Termination::Declined => "declined",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one advisory session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub final_plan: AdvisoryPlan,

    /// Earlier plans, oldest first
    pub superseded: Vec<AdvisoryPlan>,

    /// Plans generated, including the final one
    pub iterations: u32,

    pub termination: Termination,

    /// The most recent context the session observed
    pub final_context: FarmContext,
}

/// Consulted before each regeneration; returning false ends the session.
#[async_trait]
pub trait ReplanGate: Send + Sync {
    async fn approve(&self, current: &AdvisoryPlan, signal: &ChangeSignal) -> bool;
}

/// Approves every regeneration.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReplan;

#[async_trait]
impl ReplanGate for AlwaysReplan {
    async fn approve(&self, _current: &AdvisoryPlan, _signal: &ChangeSignal) -> bool {
        true
    }
}

/// Termination bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_iterations: u32,
    pub time_budget: Duration,

    /// Pause after issuing a plan before re-checking conditions
    pub recheck_interval: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

impl From<&LoopConfig> for LoopLimits {
    fn from(config: &LoopConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
            time_budget: Duration::from_secs(config.time_budget_secs),
            recheck_interval: Duration::from_secs(config.recheck_interval_secs),
        }
    }
}

/// Runs advisory sessions.
pub struct AdvisoryLoop {
    builder: ContextBuilder,
    generator: AdvisoryGenerator,
    detector: ChangeDetector,
    limits: LoopLimits,
    gate: Arc<dyn ReplanGate>,
    event_bus: Arc<EventBus>,
}

/// Mutable session state threaded through the state machine.
struct Session {
    id: SessionId,
    started: Instant,
    context: Option<FarmContext>,
    plan: Option<AdvisoryPlan>,
    superseded: Vec<AdvisoryPlan>,
    last_change: Option<String>,
    iterations: u32,
}

impl AdvisoryLoop {
    pub fn new(
        builder: ContextBuilder,
        generator: AdvisoryGenerator,
        detector: ChangeDetector,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            builder,
            generator,
            detector,
            limits: LoopLimits::default(),
            gate: Arc::new(AlwaysReplan),
            event_bus,
        }
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.limits.max_iterations = max.max(1);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn ReplanGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Run one session to completion.
    pub async fn run(&self, input: &FarmInput) -> Result<SessionOutcome> {
        let mut session = Session {
            id: SessionId::new(),
            started: Instant::now(),
            context: None,
            plan: None,
            superseded: Vec::new(),
            last_change: None,
            iterations: 0,
        };

        info!(
            session_id = %session.id,
            crop = %input.crop,
            location = %input.location,
            provider = self.generator.provider_name(),
            model = %self.generator.settings().model,
            tolerance = ?self.detector.tolerance(),
            max_iterations = self.limits.max_iterations,
            "Starting advisory session"
        );

        let termination = match self.drive(&mut session, input).await {
            Ok(termination) => termination,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Advisory session failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("session {}", session.id),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        self.event_bus.publish(DomainEvent::SessionFinished {
            session_id: session.id.to_string(),
            iterations: session.iterations,
            termination: termination.to_string(),
            timestamp: Utc::now(),
        });

        let (Some(final_plan), Some(final_context)) = (session.plan, session.context) else {
            return Err(Error::Internal("session finished without a plan".into()));
        };

        info!(
            session_id = %session.id,
            iterations = session.iterations,
            %termination,
            "Advisory session finished"
        );

        Ok(SessionOutcome {
            session_id: session.id,
            final_plan,
            superseded: session.superseded,
            iterations: session.iterations,
            termination,
            final_context,
        })
    }

    async fn drive(&self, session: &mut Session, input: &FarmInput) -> Result<Termination> {
        let mut state = LoopState::Collecting;
        loop {
            debug!(session_id = %session.id, ?state, "Loop state");
            state = match state {
                LoopState::Collecting => self.collect(session, input).await?,
                LoopState::Advising => self.advise(session).await?,
                LoopState::Evaluating => self.evaluate(session).await?,
                LoopState::Done(termination) => return Ok(termination),
            };
        }
    }

    async fn collect(&self, session: &mut Session, input: &FarmInput) -> Result<LoopState> {
        let Some(built) = self.within_budget(session, self.builder.build(input)).await else {
            return Err(Error::Internal(
                "time budget exhausted before the first context".into(),
            ));
        };
        let context = built?;
        self.publish_context(session, &context);
        session.context = Some(context);
        Ok(LoopState::Advising)
    }

    async fn advise(&self, session: &mut Session) -> Result<LoopState> {
        let Some(context) = session.context.as_ref() else {
            return Err(Error::Internal("advising without a context".into()));
        };

        let replan = match (&session.plan, &session.last_change) {
            (Some(previous), Some(reason)) => Some(Replan { previous, reason }),
            _ => None,
        };

        let generated = self
            .within_budget(session, self.generator.generate(&session.id, context, replan))
            .await;

        let plan = match generated {
            Some(result) => result?,
            None if session.plan.is_some() => {
                warn!(session_id = %session.id, "Time budget exhausted while replanning");
                return Ok(LoopState::Done(Termination::TimeBudget));
            }
            None => {
                return Err(Error::GenerationFailure {
                    attempts: 1,
                    reason: "time budget exhausted before the first plan".into(),
                });
            }
        };

        session.iterations += 1;
        self.event_bus.publish(DomainEvent::PlanGenerated {
            session_id: session.id.to_string(),
            plan_id: plan.id.clone(),
            iteration: plan.iteration,
            model: plan.model.clone(),
            tokens_used: None,
            timestamp: Utc::now(),
        });

        if let Some(previous) = session.plan.replace(plan) {
            session.superseded.push(previous);
        }
        session.last_change = None;
        Ok(LoopState::Evaluating)
    }

    async fn evaluate(&self, session: &mut Session) -> Result<LoopState> {
        if !self.limits.recheck_interval.is_zero() {
            let pause = self.limits.recheck_interval.min(self.remaining(session));
            debug!(session_id = %session.id, ?pause, "Waiting before re-check");
            tokio::time::sleep(pause).await;
        }

        let (Some(previous), Some(plan)) = (session.context.as_ref(), session.plan.as_ref()) else {
            return Err(Error::Internal("evaluating without a plan".into()));
        };

        let Some(refreshed) = self
            .within_budget(session, self.builder.refresh(previous))
            .await
        else {
            warn!(session_id = %session.id, "Time budget exhausted before re-check");
            return Ok(LoopState::Done(Termination::TimeBudget));
        };
        let refreshed = refreshed?;
        self.publish_context(session, &refreshed);

        let signal = self.detector.evaluate(&plan.assumptions, &refreshed);
        self.event_bus.publish(DomainEvent::ConditionsEvaluated {
            session_id: session.id.to_string(),
            iteration: session.iterations,
            changed: signal.changed,
            reason: signal.reason.clone(),
            timestamp: Utc::now(),
        });

        let next = if !signal.changed {
            info!(session_id = %session.id, iteration = session.iterations, "Conditions unchanged");
            LoopState::Done(Termination::Stable)
        } else if session.iterations >= self.limits.max_iterations {
            warn!(
                session_id = %session.id,
                iterations = session.iterations,
                reason = signal.reason.as_deref().unwrap_or_default(),
                "Conditions changed but iteration cap reached"
            );
            LoopState::Done(Termination::IterationCap)
        } else if !self.gate.approve(plan, &signal).await {
            info!(session_id = %session.id, "Replan declined");
            LoopState::Done(Termination::Declined)
        } else {
            info!(
                session_id = %session.id,
                reason = signal.reason.as_deref().unwrap_or_default(),
                "Conditions changed, replanning"
            );
            session.last_change = signal.reason;
            LoopState::Advising
        };

        session.context = Some(refreshed);
        Ok(next)
    }

    fn publish_context(&self, session: &Session, context: &FarmContext) {
        self.event_bus.publish(DomainEvent::ContextBuilt {
            session_id: session.id.to_string(),
            crop: context.crop.clone(),
            stage: context.crop_stage,
            precipitation: context.precipitation,
            timestamp: Utc::now(),
        });
    }

    fn remaining(&self, session: &Session) -> Duration {
        self.limits
            .time_budget
            .saturating_sub(session.started.elapsed())
    }

    /// Await `fut` within what is left of the budget; `None` on expiry.
    async fn within_budget<T>(&self, session: &Session, fut: impl Future<Output = T>) -> Option<T> {
        let remaining = self.remaining(session);
        if remaining.is_zero() {
            return None;
        }
        tokio::time::timeout(remaining, fut).await.ok()
    }
}
