//! Room registry: membership, history, and broadcast
//!
//! The registry owns every room for the lifetime of the process. All
//! membership and history mutation goes through one process-wide lock;
//! correctness under concurrent session tasks is bought with coarse locking
//! rather than per-room locks, which caps cross-room parallelism (a known
//! scalability limit, kept deliberately).
//!
//! Registry operations are synchronous and short. They never perform I/O
//! under the lock: delivering a broadcast is a non-blocking send into the
//! recipient session's outbox channel, drained by that session's writer task.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::protocol;
use crate::server::history::{History, Message};

/// Identifies one connection's session across the registry
pub type SessionId = Uuid;

/// Room index in `0..room_count`
pub type RoomId = usize;

/// Sender half of a session's outgoing line channel.
///
/// Cloned into the registry at join time so broadcasts can reach the session
/// without touching its socket; the session's writer task owns the other end.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Queue one line for delivery. Returns false if the receiving session
    /// is gone; the caller decides whether that matters.
    pub fn deliver(&self, line: String) -> bool {
        self.tx.send(line).is_ok()
    }
}

/// One room member as tracked by the registry
#[derive(Debug, Clone)]
struct Member {
    session_id: SessionId,
    pseudo: String,
    outbox: Outbox,
}

/// A single room: join-ordered members plus bounded history
#[derive(Debug)]
struct Room {
    members: Vec<Member>,
    history: History,
}

impl Room {
    fn new(history_capacity: usize) -> Self {
        Self {
            members: Vec::new(),
            history: History::new(history_capacity),
        }
    }
}

/// Fixed collection of rooms behind the single registry lock
pub struct RoomRegistry {
    rooms: Mutex<Vec<Room>>,
    room_capacity: usize,
}

impl RoomRegistry {
    /// Create the registry with `config.room_count` empty rooms
    pub fn new(config: &RelayConfig) -> Self {
        let rooms = (0..config.room_count)
            .map(|_| Room::new(config.history_capacity))
            .collect();
        Self {
            rooms: Mutex::new(rooms),
            room_capacity: config.room_capacity,
        }
    }

    /// Number of rooms
    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    /// Current member count of a room
    pub fn member_count(&self, room_id: RoomId) -> usize {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(room_id).map(|r| r.members.len()).unwrap_or(0)
    }

    /// Add a session to a room, queueing the history replay and the join
    /// confirmation on its outbox before the lock is released.
    ///
    /// Membership insert and replay delivery happen in one critical section,
    /// so the replay the joiner receives is exactly the room state at join
    /// time and nothing broadcast after the join can overtake it in the
    /// joiner's outbox: a later message follows the replay, never precedes
    /// it and never duplicates into it.
    pub fn join(
        &self,
        room_id: RoomId,
        session_id: SessionId,
        pseudo: &str,
        outbox: Outbox,
    ) -> Result<()> {
        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| RelayError::room_not_found(format!("no room {}", room_id)))?;
        if room.members.len() >= self.room_capacity {
            return Err(RelayError::room_full(format!(
                "room {} is at capacity {}",
                room_id, self.room_capacity
            )));
        }
        for message in room.history.iter() {
            outbox.deliver(protocol::history_line(&message.sender, &message.text));
        }
        outbox.deliver(protocol::joined_line(room_id));
        room.members.push(Member {
            session_id,
            pseudo: pseudo.to_string(),
            outbox,
        });
        debug!(
            "session {} ({}) joined room {} ({} members)",
            session_id,
            pseudo,
            room_id,
            room.members.len()
        );
        Ok(())
    }

    /// Remove a session from a room, keeping the relative order of the rest.
    ///
    /// Idempotent: removing a session that is not a member is a no-op, so the
    /// deregistration guard may fire on any exit path without bookkeeping.
    pub fn leave(&self, room_id: RoomId, session_id: SessionId) {
        let mut rooms = self.rooms.lock().unwrap();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        if let Some(pos) = room.members.iter().position(|m| m.session_id == session_id) {
            let member = room.members.remove(pos);
            debug!(
                "session {} ({}) left room {} ({} members)",
                session_id,
                member.pseudo,
                room_id,
                room.members.len()
            );
        }
    }

    /// The room's current history, oldest first
    pub fn history_snapshot(&self, room_id: RoomId) -> Vec<Message> {
        let rooms = self.rooms.lock().unwrap();
        rooms
            .get(room_id)
            .map(|r| r.history.snapshot())
            .unwrap_or_default()
    }

    /// Append a message to a room's history, evicting FIFO at capacity
    pub fn append_history(&self, room_id: RoomId, message: Message) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(room_id) {
            room.history.push(message);
        }
    }

    /// Deliver a message to every member of a room except the sender.
    ///
    /// Best effort per recipient: a dead outbox is logged and skipped, the
    /// remaining members still receive the message. Removing the broken
    /// member is its own session's job when its read loop fails.
    pub fn broadcast(&self, room_id: RoomId, message: &Message, exclude: SessionId) {
        let rooms = self.rooms.lock().unwrap();
        let Some(room) = rooms.get(room_id) else {
            return;
        };
        let line = protocol::relay_line(&message.sender, &message.text);
        for member in &room.members {
            if member.session_id == exclude {
                continue;
            }
            if !member.outbox.deliver(line.clone()) {
                warn!(
                    "dropping broadcast to session {} ({}) in room {}: outbox closed",
                    member.session_id, member.pseudo, room_id
                );
            }
        }
    }

    /// Append a message to history and broadcast it in one critical section.
    ///
    /// This is the Active-loop primitive: holding the lock across both steps
    /// guarantees a concurrent joiner sees the message either in its history
    /// replay or as a broadcast, never both and never neither.
    pub fn record_and_broadcast(&self, room_id: RoomId, message: Message, exclude: SessionId) {
        let mut rooms = self.rooms.lock().unwrap();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        let line = protocol::relay_line(&message.sender, &message.text);
        room.history.push(message);
        for member in &room.members {
            if member.session_id == exclude {
                continue;
            }
            if !member.outbox.deliver(line.clone()) {
                warn!(
                    "dropping broadcast to session {} ({}) in room {}: outbox closed",
                    member.session_id, member.pseudo, room_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> RoomRegistry {
        RoomRegistry::new(&RelayConfig::default())
    }

    fn test_member() -> (SessionId, Outbox, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::new_v4(), Outbox::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_join_increments_count() {
        let registry = test_registry();
        for expected in 1..=3 {
            let (id, outbox, _rx) = test_member();
            registry.join(0, id, "alice", outbox).unwrap();
            assert_eq!(registry.member_count(0), expected);
        }
    }

    #[test]
    fn test_join_at_capacity_rejected() {
        let registry = test_registry();
        let mut outboxes = Vec::new();
        for _ in 0..5 {
            let (id, outbox, rx) = test_member();
            registry.join(0, id, "member", outbox).unwrap();
            outboxes.push(rx);
        }

        let (id, outbox, _rx) = test_member();
        let result = registry.join(0, id, "late", outbox);
        assert!(matches!(result, Err(RelayError::RoomFull(_))));
        assert_eq!(registry.member_count(0), 5);
    }

    #[test]
    fn test_join_unknown_room() {
        let registry = test_registry();
        let (id, outbox, _rx) = test_member();
        let result = registry.join(99, id, "alice", outbox);
        assert!(matches!(result, Err(RelayError::RoomNotFound(_))));
    }

    #[test]
    fn test_leave_preserves_order_and_is_idempotent() {
        let registry = test_registry();
        let (a, outbox_a, _rx_a) = test_member();
        let (b, outbox_b, mut rx_b) = test_member();
        let (c, outbox_c, mut rx_c) = test_member();
        registry.join(0, a, "a", outbox_a).unwrap();
        registry.join(0, b, "b", outbox_b).unwrap();
        registry.join(0, c, "c", outbox_c).unwrap();

        registry.leave(0, a);
        assert_eq!(registry.member_count(0), 2);

        // repeated leave is a no-op
        registry.leave(0, a);
        assert_eq!(registry.member_count(0), 2);

        // b and c kept their relative order: both still receive broadcasts
        let (ghost, _outbox, _rx) = test_member();
        registry.broadcast(0, &Message::new("x", "ping"), ghost);
        assert_eq!(drain(&mut rx_b), vec!["x->ping\n"]);
        assert_eq!(drain(&mut rx_c), vec!["x->ping\n"]);
    }

    #[test]
    fn test_leave_unknown_room_is_noop() {
        let registry = test_registry();
        registry.leave(99, Uuid::new_v4());
    }

    #[test]
    fn test_broadcast_excludes_sender_and_other_rooms() {
        let registry = test_registry();
        let (a, outbox_a, mut rx_a) = test_member();
        let (b, outbox_b, mut rx_b) = test_member();
        let (c, outbox_c, mut rx_c) = test_member();
        registry.join(0, a, "alice", outbox_a).unwrap();
        registry.join(0, b, "bob", outbox_b).unwrap();
        registry.join(1, c, "carol", outbox_c).unwrap();

        registry.broadcast(0, &Message::new("alice", "hello"), a);

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["alice->hello\n"]);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_broadcast_survives_dead_outbox() {
        let registry = test_registry();
        let (a, outbox_a, _rx_a) = test_member();
        let (b, outbox_b, rx_b) = test_member();
        let (c, outbox_c, mut rx_c) = test_member();
        registry.join(0, a, "alice", outbox_a).unwrap();
        registry.join(0, b, "bob", outbox_b).unwrap();
        registry.join(0, c, "carol", outbox_c).unwrap();

        // bob's session is gone but still registered
        drop(rx_b);

        registry.broadcast(0, &Message::new("alice", "hi"), a);
        assert_eq!(drain(&mut rx_c), vec!["alice->hi\n"]);
        // bob is still a member; removal is his session's own job
        assert_eq!(registry.member_count(0), 3);
    }

    #[test]
    fn test_join_replays_history_into_outbox() {
        let registry = test_registry();
        registry.append_history(0, Message::new("alice", "hi"));

        let (b, outbox_b, mut rx_b) = test_member();
        registry.join(0, b, "bob", outbox_b).unwrap();
        assert_eq!(drain(&mut rx_b), vec!["alice: hi\n", "You are in room 0\n"]);
    }

    #[test]
    fn test_history_fifo_through_registry() {
        let registry = test_registry();
        for i in 1..=11 {
            registry.append_history(0, Message::new("alice", format!("msg {}", i)));
        }

        let snapshot = registry.history_snapshot(0);
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot[0].text, "msg 2");
        assert_eq!(snapshot[9].text, "msg 11");
    }

    #[test]
    fn test_two_member_round_scenario() {
        let registry = test_registry();

        // A joins an empty room and speaks to nobody
        let (a, outbox_a, mut rx_a) = test_member();
        registry.join(0, a, "A", outbox_a).unwrap();
        assert_eq!(registry.member_count(0), 1);
        assert_eq!(drain(&mut rx_a), vec!["You are in room 0\n"]);

        registry.record_and_broadcast(0, Message::new("A", "hi"), a);
        assert_eq!(registry.history_snapshot(0), vec![Message::new("A", "hi")]);
        assert!(drain(&mut rx_a).is_empty());

        // B joins, replays A's message, then answers
        let (b, outbox_b, mut rx_b) = test_member();
        registry.join(0, b, "B", outbox_b).unwrap();
        assert_eq!(registry.member_count(0), 2);
        assert_eq!(drain(&mut rx_b), vec!["A: hi\n", "You are in room 0\n"]);

        registry.record_and_broadcast(0, Message::new("B", "bye"), b);
        assert_eq!(
            registry.history_snapshot(0),
            vec![Message::new("A", "hi"), Message::new("B", "bye")]
        );
        assert_eq!(drain(&mut rx_a), vec!["B->bye\n"]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_record_and_broadcast_orders_history_before_delivery() {
        let registry = test_registry();
        let (a, outbox_a, _rx_a) = test_member();
        registry.join(0, a, "A", outbox_a).unwrap();

        registry.record_and_broadcast(0, Message::new("A", "hi"), a);

        // a joiner after the broadcast sees the message in its replay only
        let (b, outbox_b, mut rx_b) = test_member();
        registry.join(0, b, "B", outbox_b).unwrap();
        assert_eq!(drain(&mut rx_b), vec!["A: hi\n", "You are in room 0\n"]);
    }

    #[test]
    fn test_broadcast_after_join_never_overtakes_replay() {
        let registry = test_registry();
        let (a, outbox_a, _rx_a) = test_member();
        registry.join(0, a, "A", outbox_a).unwrap();
        registry.record_and_broadcast(0, Message::new("A", "old"), a);

        // replay is queued on B's outbox inside the join critical section,
        // so a message recorded right after the join lands strictly behind it
        let (b, outbox_b, mut rx_b) = test_member();
        registry.join(0, b, "B", outbox_b).unwrap();
        registry.record_and_broadcast(0, Message::new("A", "new"), a);

        assert_eq!(
            drain(&mut rx_b),
            vec!["A: old\n", "You are in room 0\n", "A->new\n"]
        );
    }
}
