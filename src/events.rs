//! Typed lifecycle notifications.
//!
//! The bill processor publishes state-change events to registered
//! subscribers. Delivery is fire-and-forget: zero subscribers is fine,
//! publishing never blocks the pipeline on success or failure, and there is
//! no replay. Subscribers run on the pipeline thread and are expected to
//! hand work off (e.g. push onto a channel or websocket queue) rather than
//! do it inline.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PipelineEvent {
    BillProcessed { bill_id: Uuid, pharmacy_id: Uuid },
    BillDeleted { bill_id: Uuid, pharmacy_id: Uuid },
    MedicinesUpdated { pharmacy_id: Uuid },
}

impl PipelineEvent {
    /// Wire name of the event, as subscribers forward it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BillProcessed { .. } => "bill-processed",
            Self::BillDeleted { .. } => "bill-deleted",
            Self::MedicinesUpdated { .. } => "medicines-updated",
        }
    }

    pub fn pharmacy_id(&self) -> Uuid {
        match self {
            Self::BillProcessed { pharmacy_id, .. }
            | Self::BillDeleted { pharmacy_id, .. }
            | Self::MedicinesUpdated { pharmacy_id } => *pharmacy_id,
        }
    }
}

pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Publish/subscribe hub owned by the bill processor.
#[derive(Default)]
pub struct Notifier {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push(subscriber);
    }

    /// Deliver an event to every subscriber, at most once each.
    /// A poisoned lock (a subscriber panicked earlier) must not wedge
    /// later publishes.
    pub fn publish(&self, event: PipelineEvent) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        tracing::debug!(
            event = event.name(),
            pharmacy_id = %event.pharmacy_id(),
            subscriber_count = subscribers.len(),
            "Publishing pipeline event"
        );
        for subscriber in subscribers.iter() {
            subscriber.on_event(&event);
        }
    }
}
