//! Lifecycle events
//!
//! Observed models announce `created`, `updated` and `deleted` on an
//! `EventBus` after the write has succeeded. Event names have the form
//! `<entity in lowerCamel>:<event>`, e.g. `giftCard:created`.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::naming::lower_camel_case;
use crate::schema::ObserveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    #[serde(alias = "create")]
    Created,
    #[serde(alias = "update")]
    Updated,
    #[serde(alias = "delete")]
    Deleted,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Created => "created",
            LifecycleEvent::Updated => "updated",
            LifecycleEvent::Deleted => "deleted",
        }
    }

    pub fn event_name(&self, entity: &str) -> String {
        format!("{}:{}", lower_camel_case(entity), self.as_str())
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    #[error("Event dispatch failed: {message}")]
    Dispatch { message: String },
    #[error("Observer error: {message}")]
    Observer { message: String },
}

impl EventError {
    pub fn dispatch(message: &str) -> Self {
        Self::Dispatch {
            message: message.to_string(),
        }
    }

    pub fn observer(message: &str) -> Self {
        Self::Observer {
            message: message.to_string(),
        }
    }
}

/// Event-bus collaborator. Payload is the persisted row as JSON.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn dispatch(&self, event: &str, payload: &Value) -> Result<(), EventError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub name: String,
    pub payload: Value,
}

/// In-process bus that records every event it receives
#[derive(Debug, Clone, Default)]
pub struct MemoryEventBus {
    events: Arc<Mutex<Vec<DispatchedEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn dispatch(&self, event: &str, payload: &Value) -> Result<(), EventError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| EventError::dispatch("event log lock poisoned"))?;
        events.push(DispatchedEvent {
            name: event.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Fires lifecycle events for one entity, honoring its observe settings
pub struct LifecycleDispatcher<'a> {
    bus: Option<&'a Arc<dyn EventBus>>,
    entity: &'a str,
    observe: &'a ObserveConfig,
}

impl<'a> LifecycleDispatcher<'a> {
    pub fn new(
        bus: Option<&'a Arc<dyn EventBus>>,
        entity: &'a str,
        observe: &'a ObserveConfig,
    ) -> Self {
        Self {
            bus,
            entity,
            observe,
        }
    }

    /// Dispatch failures are logged and never surface to the caller
    pub async fn fire(&self, event: LifecycleEvent, payload: &Value) {
        let Some(bus) = self.bus else {
            return;
        };
        if !self.observe.observes(event) {
            return;
        }

        let name = event.event_name(self.entity);
        debug!("Dispatching lifecycle event {}", name);
        if let Err(e) = bus.dispatch(&name, payload).await {
            warn!("Lifecycle event {} failed: {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingBus;

    #[async_trait]
    impl EventBus for FailingBus {
        async fn dispatch(&self, _event: &str, _payload: &Value) -> Result<(), EventError> {
            Err(EventError::observer("listener crashed"))
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::Created.event_name("GiftCard"), "giftCard:created");
        assert_eq!(LifecycleEvent::Deleted.event_name("Order"), "order:deleted");
    }

    #[test]
    fn test_event_aliases() {
        let events: Vec<LifecycleEvent> = serde_yaml::from_str("[create, updated, delete]").unwrap();
        assert_eq!(
            events,
            vec![
                LifecycleEvent::Created,
                LifecycleEvent::Updated,
                LifecycleEvent::Deleted
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatcher_respects_observe_config() {
        let memory = MemoryEventBus::new();
        let bus: Arc<dyn EventBus> = Arc::new(memory.clone());
        let observe = ObserveConfig::Events(vec![LifecycleEvent::Created]);
        let dispatcher = LifecycleDispatcher::new(Some(&bus), "GiftCard", &observe);

        dispatcher.fire(LifecycleEvent::Created, &json!({"id": 1})).await;
        dispatcher.fire(LifecycleEvent::Updated, &json!({"id": 1})).await;

        assert_eq!(memory.names(), vec!["giftCard:created".to_string()]);
        assert_eq!(memory.events()[0].payload, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_dispatch_failures_are_swallowed() {
        let bus: Arc<dyn EventBus> = Arc::new(FailingBus);
        let observe = ObserveConfig::All(true);
        LifecycleDispatcher::new(Some(&bus), "Order", &observe)
            .fire(LifecycleEvent::Deleted, &json!({}))
            .await;
    }
}
