use crate::matchwire::conversation::Message;
use crate::matchwire::matches::MatchSummary;

/// Events the transport delivers into the session processing queue.
///
/// Every event carries the subscription id of the channel binding it was
/// delivered on; the session validates the id against the live binding before
/// applying the event, so replays from released subscriptions are dropped.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// A new mutual match for the signed-in user.
    MatchCreated {
        subscription_id: String,
        summary: MatchSummary,
    },
    /// A message pushed for one conversation.
    MessageReceived {
        subscription_id: String,
        message: Message,
    },
    /// A transport-level notice for logging/monitoring purposes.
    ChannelNotice {
        subscription_id: String,
        detail: String,
    },
}

impl PushEvent {
    /// The subscription id the transport tagged this event with.
    pub fn subscription_id(&self) -> &str {
        match self {
            PushEvent::MatchCreated {
                subscription_id, ..
            }
            | PushEvent::MessageReceived {
                subscription_id, ..
            }
            | PushEvent::ChannelNotice {
                subscription_id, ..
            } => subscription_id,
        }
    }
}
