//! Topic-based event bus for runtime events.
//!
//! Every event the combat core publishes is relayed here, tagged with its
//! topic, so transport adapters subscribe only to what they forward.

mod bus;

pub use bus::{Event, EventBus, RuntimeEvent, Topic};
