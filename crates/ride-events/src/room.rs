//! WebSocket fan-out bookkeeping for negotiation sessions (§4.5).
//!
//! This module does not speak WebSocket — the transport is out of scope
//! (§1) — it owns the *routing decision*: which connected party (the whole
//! room, or one specific driver) a given negotiation event is delivered to,
//! and the room lifecycle (closed on completion/cancellation/expiry).

use {
    dashmap::DashMap,
    std::sync::Arc,
    tokio::sync::broadcast,
    uuid::Uuid,
};

/// A message queued for delivery to one or more members of a room.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub event: crate::DomainEvent,
    pub target: Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Broadcast to every connected party in the room (rider + all driver
    /// offerers): session start, acceptance, cancellation, expiry.
    Room,
    /// Delivered only to the driver named by `driver_id`: offer rejection,
    /// counter-offers addressed to a specific driver.
    Driver(Uuid),
}

struct Room {
    sender: broadcast::Sender<RoomMessage>,
}

/// Keyed by negotiation session id. Members subscribe to the room's channel
/// and filter on `Target` themselves (a driver only acts on `Target::Room`
/// or `Target::Driver(self)`).
#[derive(Clone, Default)]
pub struct NegotiationRooms {
    rooms: Arc<DashMap<Uuid, Room>>,
}

impl NegotiationRooms {
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&self, session_id: Uuid) -> broadcast::Sender<RoomMessage> {
        self.rooms
            .entry(session_id)
            .or_insert_with(|| Room {
                sender: broadcast::channel(256).0,
            })
            .sender
            .clone()
    }

    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<RoomMessage> {
        self.room(session_id).subscribe()
    }

    pub fn broadcast_to_room(&self, session_id: Uuid, event: crate::DomainEvent) {
        let _ = self.room(session_id).send(RoomMessage {
            event,
            target: Target::Room,
        });
    }

    pub fn send_to_driver(&self, session_id: Uuid, driver_id: Uuid, event: crate::DomainEvent) {
        let _ = self.room(session_id).send(RoomMessage {
            event,
            target: Target::Driver(driver_id),
        });
    }

    /// Closes the room: no more senders can reach it, and its entry is
    /// dropped so the map doesn't grow unbounded across the session
    /// lifetime of the service (§4.5 "Rooms are closed on session
    /// completion/cancellation/expiry").
    pub fn close(&self, session_id: Uuid) {
        self.rooms.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_targeted_message_is_not_room_targeted() {
        let rooms = NegotiationRooms::new();
        let session_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();
        let mut rx = rooms.subscribe(session_id);

        rooms.send_to_driver(
            session_id,
            driver_id,
            crate::DomainEvent::new("negotiation", "offer.rejected", serde_json::json!({})),
        );

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.target, Target::Driver(driver_id));
    }

    #[test]
    fn closing_room_drops_its_entry() {
        let rooms = NegotiationRooms::new();
        let session_id = Uuid::new_v4();
        let _rx = rooms.subscribe(session_id);
        rooms.close(session_id);
        assert!(rooms.rooms.get(&session_id).is_none());
    }
}
