use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::OrderId;

pub type MemberId = Uuid;

/// Opaque payload relayed between room members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

type Room = HashMap<MemberId, mpsc::UnboundedSender<Frame>>;

/// Live connections per order.
///
/// A member stays registered exactly as long as its [`RoomMember`] guard is
/// alive. Rooms are dropped as soon as their last member leaves.
#[derive(Default)]
pub struct ChatRoomRegistry {
    rooms: DashMap<OrderId, Room>,
}

pub struct RoomMembership {
    pub member: RoomMember,
    pub outbound: mpsc::UnboundedReceiver<Frame>,
}

impl RoomMembership {
    pub fn into_parts(self) -> (RoomMember, mpsc::UnboundedReceiver<Frame>) {
        (self.member, self.outbound)
    }
}

pub struct RoomMember {
    registry: Arc<ChatRoomRegistry>,
    order_id: OrderId,
    member_id: MemberId,
}

impl RoomMember {
    pub fn id(&self) -> MemberId {
        self.member_id
    }

    /// Sends `frame` to every other member of this room.
    pub fn broadcast(&self, frame: Frame) -> usize {
        self.registry
            .broadcast(self.order_id, Some(self.member_id), frame)
    }
}

impl Drop for RoomMember {
    fn drop(&mut self) {
        self.registry.leave(self.order_id, self.member_id);
    }
}

impl ChatRoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(self: &Arc<Self>, order_id: OrderId) -> RoomMembership {
        let (tx, rx) = mpsc::unbounded_channel();
        let member_id = Uuid::new_v4();

        self.rooms.entry(order_id).or_default().insert(member_id, tx);
        debug!(order_id, member_id = %member_id, "chat member joined");

        RoomMembership {
            member: RoomMember {
                registry: self.clone(),
                order_id,
                member_id,
            },
            outbound: rx,
        }
    }

    pub fn leave(&self, order_id: OrderId, member_id: MemberId) -> bool {
        let removed = {
            let Some(mut room) = self.rooms.get_mut(&order_id) else {
                return false;
            };
            room.remove(&member_id).is_some()
        };

        self.rooms.remove_if(&order_id, |_, room| room.is_empty());

        if removed {
            debug!(order_id, member_id = %member_id, "chat member left");
        }
        removed
    }

    /// Delivers `frame` to every member except `from`. A member whose channel
    /// is already closed is pruned and skipped; delivery to the rest goes on.
    pub fn broadcast(&self, order_id: OrderId, from: Option<MemberId>, frame: Frame) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        if let Some(room) = self.rooms.get(&order_id) {
            for (member_id, tx) in room.iter() {
                if Some(*member_id) == from {
                    continue;
                }

                if tx.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    warn!(order_id, member_id = %member_id, "chat peer unreachable; pruning");
                    closed.push(*member_id);
                }
            }
        }

        for member_id in closed {
            self.leave(order_id, member_id);
        }

        delivered
    }

    pub fn member_count(&self, order_id: OrderId) -> usize {
        self.rooms.get(&order_id).map(|room| room.len()).unwrap_or(0)
    }

    pub fn member_total(&self) -> usize {
        self.rooms.iter().map(|room| room.value().len()).sum()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
