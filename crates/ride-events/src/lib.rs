//! Event Bus Adapter (spec §4.5).
//!
//! The core owns the `EventBus` trait and a default in-process
//! implementation; a real deployment swaps in a durable broker behind the
//! same trait without touching any publisher or subscriber.

pub mod bus;
pub mod event;
pub mod room;

pub use bus::{EventBus, InMemoryEventBus};
pub use event::DomainEvent;
pub use room::NegotiationRooms;
