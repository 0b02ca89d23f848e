//! Event stream of the marking pool
//!
//! Workers publish a [`GradingEvent`] for every change they make to shared
//! state. Subscribers receive them through a Tokio broadcast channel: the
//! binary's progress log follows a filtered stream, and tests check protocol
//! properties against the full one.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Workers    │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    drain, EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use types::GradingEvent;
