//! Subscription registry for the session's push channels.
//!
//! Enforces at-most-one live binding per channel, releases bindings
//! idempotently, and tears everything down at logout.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use crate::matchwire::error::{MatchwireError, Result};
use crate::transport::{Transport, TransportHandle};
use crate::types::PushEvent;

/// A logical category of push events the session can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Match-created events for the signed-in user.
    Matches,
    /// Message events for one conversation.
    Conversation(String),
}

impl Channel {
    /// Stable key hashed into the subscription id.
    fn key(&self) -> String {
        match self {
            Channel::Matches => "matches".to_string(),
            Channel::Conversation(match_id) => format!("conversation:{match_id}"),
        }
    }

    /// Suffix identifying the channel class in subscription ids.
    fn class(&self) -> &'static str {
        match self {
            Channel::Matches => "matches",
            Channel::Conversation(_) => "messages",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Matches => write!(f, "matches"),
            Channel::Conversation(match_id) => write!(f, "messages:{match_id}"),
        }
    }
}

/// One live channel binding.
///
/// Dropping the handle does not release the registration; release goes
/// through [`SubscriptionRegistry::unsubscribe`], which is safe to call more
/// than once with the same handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    token: Uuid,
    channel: Channel,
    subscription_id: String,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }
}

struct ActiveSubscription {
    token: Uuid,
    subscription_id: String,
    transport_handle: TransportHandle,
}

/// Tracks which push channels are live for the session.
///
/// No more than one live binding may exist per channel; a duplicate
/// subscribe is a lifecycle bug and fails with `AlreadySubscribed`.
pub struct SubscriptionRegistry {
    transport: Arc<dyn Transport>,
    sink: Sender<PushEvent>,
    session_salt: [u8; 16],
    active: Mutex<HashMap<Channel, ActiveSubscription>>,
}

impl SubscriptionRegistry {
    pub fn new(transport: Arc<dyn Transport>, sink: Sender<PushEvent>) -> Self {
        // Random per-session salt so subscription ids are not correlatable
        // across restarts.
        let mut session_salt = [0u8; 16];
        rand::rng().fill_bytes(&mut session_salt);

        Self {
            transport,
            sink,
            session_salt,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Create a short hash from a channel key for use in subscription IDs.
    /// Uses first 12 characters of SHA256, salted per session.
    fn channel_hash(&self, channel: &Channel) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.session_salt);
        hasher.update(channel.key().as_bytes());
        let hash = hasher.finalize();
        format!("{:x}", hash)[..12].to_string()
    }

    /// Subscription IDs follow the format: {hashed_channel}_{channel_class}.
    pub(crate) fn subscription_id_for(&self, channel: &Channel) -> String {
        format!("{}_{}", self.channel_hash(channel), channel.class())
    }

    /// Opens a push binding for `channel`.
    pub async fn subscribe(&self, channel: Channel) -> Result<SubscriptionHandle> {
        let mut active = self.active.lock().await;
        if active.contains_key(&channel) {
            tracing::error!(
                target: "matchwire::subscriptions",
                "Duplicate subscribe for live channel {}",
                channel
            );
            return Err(MatchwireError::AlreadySubscribed(channel));
        }

        let subscription_id = self.subscription_id_for(&channel);
        let transport_handle = self
            .transport
            .subscribe(&subscription_id, &channel, self.sink.clone())
            .await?;

        let token = Uuid::new_v4();
        active.insert(
            channel.clone(),
            ActiveSubscription {
                token,
                subscription_id: subscription_id.clone(),
                transport_handle,
            },
        );

        tracing::debug!(
            target: "matchwire::subscriptions",
            "Subscribed {} as {}",
            channel,
            subscription_id
        );

        Ok(SubscriptionHandle {
            token,
            channel,
            subscription_id,
        })
    }

    /// Releases a binding. Idempotent: a second release of the same handle,
    /// or of a handle superseded by a newer binding, is a no-op.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let released = {
            let mut active = self.active.lock().await;
            match active.get(&handle.channel) {
                Some(live) if live.token == handle.token => active.remove(&handle.channel),
                _ => None,
            }
        };

        if let Some(live) = released {
            self.transport.unsubscribe(live.transport_handle).await?;
            tracing::debug!(
                target: "matchwire::subscriptions",
                "Released {} ({})",
                handle.channel,
                live.subscription_id
            );
        }
        Ok(())
    }

    /// True when `subscription_id` names the live binding for `channel`.
    /// Events tagged with anything else are stale deliveries.
    pub async fn is_current(&self, channel: &Channel, subscription_id: &str) -> bool {
        self.active
            .lock()
            .await
            .get(channel)
            .is_some_and(|live| live.subscription_id == subscription_id)
    }

    pub async fn live_channels(&self) -> Vec<Channel> {
        self.active.lock().await.keys().cloned().collect()
    }

    /// Releases every live binding. Session teardown must call this before
    /// the registry is discarded.
    pub async fn release_all(&self) -> Result<()> {
        let drained: Vec<ActiveSubscription> = {
            let mut active = self.active.lock().await;
            active.drain().map(|(_, sub)| sub).collect()
        };

        let results = futures::future::join_all(
            drained
                .into_iter()
                .map(|sub| self.transport.unsubscribe(sub.transport_handle)),
        )
        .await;

        for result in results {
            result?;
        }
        Ok(())
    }
}
