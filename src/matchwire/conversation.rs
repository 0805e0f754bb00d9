use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery state of a single message.
///
/// Remote messages enter as `Sent`. Optimistic local messages enter as
/// `Pending` and move to `Sent` on a transport ack or a push echo sharing
/// their id, or to `Failed` when delivery is reported lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// One chat message as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the conversation. Optimistic sends use `local-{n}`.
    pub id: String,

    /// The match this message belongs to.
    pub match_id: String,

    /// Author of the message.
    pub sender_id: String,

    /// Message text.
    pub body: String,

    /// Creation time; the log is kept non-decreasing in this field.
    pub created_at: DateTime<Utc>,

    /// Delivery state, meaningful for optimistic local sends.
    pub status: DeliveryStatus,
}

/// What [`ConversationLog::append_from_event`] did with a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New message, inserted at its ordered position.
    Inserted,
    /// Echo of a pending local send; the local copy was confirmed instead.
    Reconciled,
    /// Already present, dropped.
    Duplicate,
}

/// Ordered message log for one conversation.
///
/// Invariants: ids are unique within the log; `created_at` is non-decreasing
/// with ties kept in arrival order; local sends keep submission order at the
/// tail regardless of timestamps.
#[derive(Debug)]
pub struct ConversationLog {
    match_id: String,
    messages: Vec<Message>,
    seen_ids: HashSet<String>,
    local_seq: u64,
}

impl ConversationLog {
    pub fn new(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            messages: Vec::new(),
            seen_ids: HashSet::new(),
            local_seq: 0,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Replaces the log with fetched history, ascending by `created_at`.
    /// The sort is stable, so fetch order breaks timestamp ties.
    pub fn load(&mut self, history: Vec<Message>) {
        self.messages.clear();
        self.seen_ids.clear();
        for message in history {
            if self.seen_ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.sort_by_key(|m| m.created_at);
    }

    /// Applies one pushed message.
    ///
    /// Duplicates by id are dropped; a duplicate that echoes a pending local
    /// send confirms it instead of inserting a second copy. Out-of-order
    /// arrivals are placed by scanning from the tail, where near-in-order
    /// delivery makes the insert O(1).
    pub fn append_from_event(&mut self, message: Message) -> AppendOutcome {
        if self.seen_ids.contains(&message.id) {
            if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id)
                && existing.status == DeliveryStatus::Pending
            {
                existing.status = DeliveryStatus::Sent;
                return AppendOutcome::Reconciled;
            }
            return AppendOutcome::Duplicate;
        }

        self.seen_ids.insert(message.id.clone());
        let mut idx = self.messages.len();
        while idx > 0 && self.messages[idx - 1].created_at > message.created_at {
            idx -= 1;
        }
        self.messages.insert(idx, message);
        AppendOutcome::Inserted
    }

    /// Appends a provisional message at the tail and returns it for
    /// immediate rendering. Submission order is the log order for local
    /// sends, even when acknowledgements come back out of order.
    pub fn send_optimistic(&mut self, sender_id: &str, body: &str) -> Message {
        self.local_seq += 1;
        let message = Message {
            id: format!("local-{}", self.local_seq),
            match_id: self.match_id.clone(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            status: DeliveryStatus::Pending,
        };
        self.seen_ids.insert(message.id.clone());
        self.messages.push(message.clone());
        message
    }

    /// Confirms a pending local send. Returns whether a message changed.
    pub fn mark_sent(&mut self, local_id: &str) -> bool {
        self.transition(local_id, DeliveryStatus::Sent)
    }

    /// Flags a pending local send as failed. The failure is visible on that
    /// one message only; nothing else in the log changes.
    pub fn mark_failed(&mut self, local_id: &str) -> bool {
        self.transition(local_id, DeliveryStatus::Failed)
    }

    fn transition(&mut self, local_id: &str, to: DeliveryStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == local_id) {
            Some(message) if message.status == DeliveryStatus::Pending => {
                message.status = to;
                true
            }
            _ => false,
        }
    }
}

/// Per-match logs for one session. Exactly one log is push-subscribed at a
/// time; a log is dropped when the user navigates away from it.
#[derive(Debug, Default)]
pub struct ConversationStore {
    logs: HashMap<String, ConversationLog>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            logs: HashMap::new(),
        }
    }

    pub fn open(&mut self, match_id: &str) -> &mut ConversationLog {
        self.logs
            .entry(match_id.to_string())
            .or_insert_with(|| ConversationLog::new(match_id))
    }

    pub fn get(&self, match_id: &str) -> Option<&ConversationLog> {
        self.logs.get(match_id)
    }

    pub fn get_mut(&mut self, match_id: &str) -> Option<&mut ConversationLog> {
        self.logs.get_mut(match_id)
    }

    /// Drops the log for a conversation the user left.
    pub fn close(&mut self, match_id: &str) {
        self.logs.remove(match_id);
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
