//! Topic-based event bus implementation.

use std::collections::HashMap;
use std::sync::Arc;

use combat_core::{CombatEvent, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Registration, attribute changes, deaths
    Entity,
    /// Modifier added/removed
    Stat,
    /// Effect executed/failed
    Effect,
    /// Condition lifecycle and ticks
    Condition,
    /// Damage and healing
    Combat,
    /// Casts, executions, cooldowns, chains
    Ability,
    /// Runtime lifecycle
    Runtime,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::Entity,
        Topic::Stat,
        Topic::Effect,
        Topic::Condition,
        Topic::Combat,
        Topic::Ability,
        Topic::Runtime,
    ];
}

impl From<combat_core::Topic> for Topic {
    fn from(topic: combat_core::Topic) -> Self {
        match topic {
            combat_core::Topic::Entity => Topic::Entity,
            combat_core::Topic::Stat => Topic::Stat,
            combat_core::Topic::Effect => Topic::Effect,
            combat_core::Topic::Condition => Topic::Condition,
            combat_core::Topic::Combat => Topic::Combat,
            combat_core::Topic::Ability => Topic::Ability,
        }
    }
}

/// Runtime lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    Started { at: Timestamp, seed: u64 },
    Stopped { at: Timestamp, updates: u64 },
}

/// Event wrapper that carries the topic and typed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Combat(CombatEvent),
    Runtime(RuntimeEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Combat(event) => event.topic().into(),
            Event::Runtime(_) => Topic::Runtime,
        }
    }

    /// Short event name, e.g. `damage_dealt`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Combat(event) => event.name(),
            Event::Runtime(RuntimeEvent::Started { .. }) => "runtime_started",
            Event::Runtime(RuntimeEvent::Stopped { .. }) => "runtime_stopped",
        }
    }

    /// One JSON object per event, for line-oriented transports.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Topic-based event bus
///
/// Allows consumers to subscribe to specific topics and only receive
/// events they care about. Channels are created up front and never change,
/// so publishing never blocks.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<HashMap<Topic, broadcast::Sender<Event>>>,
}

impl EventBus {
    /// Creates a new event bus with default capacity for each topic
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a new event bus with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        let channels = Topic::ALL
            .into_iter()
            .map(|topic| (topic, broadcast::channel(capacity.max(1)).0))
            .collect();

        Self {
            channels: Arc::new(channels),
        }
    }

    /// Publish an event to its corresponding topic
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        let Some(tx) = self.channels.get(&topic) else {
            return;
        };
        if tx.send(event).is_err() {
            // No subscribers for this topic - this is normal, not an error
            tracing::trace!(target: "runtime::events", ?topic, "no subscribers");
        }
    }

    /// Subscribe to a specific topic
    ///
    /// Returns a receiver that will only receive events for that topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        match self.channels.get(&topic) {
            Some(tx) => tx.subscribe(),
            // Every topic has a channel; this arm only yields a closed receiver.
            None => broadcast::channel(1).1,
        }
    }

    /// Subscribe to multiple topics
    ///
    /// Returns receivers for each requested topic.
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
    }

    /// Number of live receivers on `topic`.
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.channels.get(&topic).map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use combat_core::EntityId;

    use super::*;

    #[tokio::test]
    async fn events_route_by_topic() {
        let bus = EventBus::with_capacity(8);
        let mut entity_rx = bus.subscribe(Topic::Entity);
        let mut ability_rx = bus.subscribe(Topic::Ability);

        bus.publish(Event::Combat(CombatEvent::EntityDied { entity: EntityId(3) }));

        let event = entity_rx.recv().await.unwrap();
        assert_eq!(event.name(), "entity_died");
        assert!(ability_rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(Event::Runtime(RuntimeEvent::Stopped {
            at: Timestamp(5),
            updates: 1,
        }));
        assert_eq!(bus.receiver_count(Topic::Runtime), 0);
    }

    #[test]
    fn events_serialize_as_json() {
        let json = Event::Combat(CombatEvent::EntityDied { entity: EntityId(3) })
            .to_json()
            .unwrap();
        assert!(json.contains("EntityDied"));
    }
}
