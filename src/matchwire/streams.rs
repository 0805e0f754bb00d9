//! Per-conversation broadcast channels for message updates.
//!
//! Lets a renderer learn that the read-only snapshot changed without
//! polling, with lazy stream creation and automatic cleanup when all
//! receivers are dropped.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::matchwire::conversation::Message;

const BUFFER_SIZE: usize = 100;

/// What triggered a message update.
///
/// The accompanying `message` field in [`ConversationUpdate`] always carries
/// the complete, current state of the affected message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateTrigger {
    /// A message was added to the conversation (push or optimistic send).
    NewMessage,

    /// A pending local send was confirmed delivered.
    DeliveryConfirmed,

    /// A pending local send failed; the message carries `Failed` status.
    DeliveryFailed,
}

/// One update pushed to subscribers of a conversation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationUpdate {
    /// What triggered this update.
    pub trigger: UpdateTrigger,

    /// The complete, current state of the affected message.
    pub message: Message,
}

pub struct ConversationStreams {
    streams: DashMap<String, broadcast::Sender<ConversationUpdate>>,
}

impl ConversationStreams {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }

    pub fn subscribe(&self, match_id: &str) -> broadcast::Receiver<ConversationUpdate> {
        self.streams
            .entry(match_id.to_string())
            .or_insert_with(|| broadcast::channel(BUFFER_SIZE).0)
            .subscribe()
    }

    pub fn emit(&self, match_id: &str, update: ConversationUpdate) {
        if let Some(sender) = self.streams.get(match_id) {
            // Attempt to send; if all receivers dropped, clean up
            if sender.send(update).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.streams.remove(match_id);
            }
        }
    }
}

impl Default for ConversationStreams {
    fn default() -> Self {
        Self::new()
    }
}
