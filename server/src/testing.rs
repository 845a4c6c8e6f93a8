//! Outbox doubles shared by the unit tests.

use crate::registry::{Outbound, Outbox, SendError};
use shared::{PlayerId, ServerMessage};
use std::sync::{Arc, Mutex};

/// Every frame sent to any recorded connection, in global send order.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(PlayerId, Outbound)>>>,
}

impl Journal {
    pub fn outbox(&self, id: PlayerId) -> Box<dyn Outbox> {
        Box::new(RecordingOutbox {
            id,
            journal: self.clone(),
        })
    }

    pub fn frames(&self) -> Vec<(PlayerId, Outbound)> {
        self.entries.lock().unwrap().clone()
    }

    /// Decoded text messages in send order, tagged with their recipient.
    pub fn messages(&self) -> Vec<(PlayerId, ServerMessage)> {
        self.frames()
            .into_iter()
            .filter_map(|(id, frame)| match frame {
                Outbound::Text(text) => Some((id, shared::decode::<ServerMessage>(&text).unwrap())),
                _ => None,
            })
            .collect()
    }

    pub fn messages_for(&self, id: PlayerId) -> Vec<ServerMessage> {
        self.messages()
            .into_iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

struct RecordingOutbox {
    id: PlayerId,
    journal: Journal,
}

impl Outbox for RecordingOutbox {
    fn send(&self, frame: Outbound) -> Result<(), SendError> {
        self.journal.entries.lock().unwrap().push((self.id, frame));
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Claims to be open but fails every send, like a socket that died mid-write.
pub struct FailingOutbox;

impl Outbox for FailingOutbox {
    fn send(&self, _frame: Outbound) -> Result<(), SendError> {
        Err(SendError::Closed)
    }

    fn is_open(&self) -> bool {
        true
    }
}
