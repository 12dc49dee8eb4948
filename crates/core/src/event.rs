//! Domain event system: decoupled observation of the advisory loop.
//!
//! The loop publishes an event at every state transition. Front ends (the CLI
//! progress output, tests) subscribe and react without the loop knowing
//! who is listening.

use crate::stage::CropStage;
use crate::weather::PrecipitationCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A farm context snapshot was assembled
    ContextBuilt {
        session_id: String,
        crop: String,
        stage: CropStage,
        precipitation: PrecipitationCategory,
        timestamp: DateTime<Utc>,
    },

    /// An advisory plan became current
    PlanGenerated {
        session_id: String,
        plan_id: String,
        iteration: u32,
        model: String,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },

    /// A generation attempt failed and will be retried
    GenerationRetried {
        session_id: String,
        attempt: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The change detector ran against refreshed conditions
    ConditionsEvaluated {
        session_id: String,
        iteration: u32,
        changed: bool,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The session reached its terminal state
    SessionFinished {
        session_id: String,
        iterations: u32,
        termination: String,
        timestamp: DateTime<Utc>,
    },

    /// An error ended the session
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. A slow
/// subscriber lags and loses events; it never blocks the publisher.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
