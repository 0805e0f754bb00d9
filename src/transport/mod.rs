//! Transport seam for the session core.
//!
//! The wire protocol (sockets, reconnects, retry policy) lives behind this
//! trait; the session only sees fetch results and a stream of [`PushEvent`]s
//! delivered into its queue.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

use crate::matchwire::conversation::Message;
use crate::matchwire::deck::{ProfileCard, SwipeDirection};
use crate::matchwire::matches::MatchSummary;
use crate::matchwire::subscriptions::Channel;
use crate::types::PushEvent;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Transient failure; the caller may retry the operation.
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Push channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Opaque token for one live transport registration. Returned by
/// [`Transport::subscribe`] and redeemed by [`Transport::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

/// Backend contract the session core consumes.
///
/// Implementations deliver push events for a subscribed channel into `sink`,
/// tagging each with the `subscription_id` the channel was registered under.
/// Events must be delivered in the order the backend emits them; the session
/// does not reorder across channels.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Full ordered match list for the user.
    async fn fetch_matches(&self, user_id: &str) -> Result<Vec<MatchSummary>>;

    /// Message history for one conversation, ascending by creation time.
    async fn fetch_messages(&self, match_id: &str) -> Result<Vec<Message>>;

    /// Delivers one message. `Ok` acknowledges acceptance by the backend,
    /// not receipt by the peer.
    async fn send_message(&self, match_id: &str, body: &str) -> Result<()>;

    /// Candidate profiles for the swipe deck.
    async fn fetch_profiles(&self, user_id: &str) -> Result<Vec<ProfileCard>>;

    /// Records a swipe decision. A resulting mutual match is announced on
    /// the match-created channel, not in this response.
    async fn record_swipe(
        &self,
        user_id: &str,
        target_id: &str,
        direction: SwipeDirection,
    ) -> Result<()>;

    /// Opens a push registration for `channel`, delivering its events into
    /// `sink` tagged with `subscription_id`.
    async fn subscribe(
        &self,
        subscription_id: &str,
        channel: &Channel,
        sink: Sender<PushEvent>,
    ) -> Result<TransportHandle>;

    /// Releases a registration. Releasing an unknown handle is not an error.
    async fn unsubscribe(&self, handle: TransportHandle) -> Result<()>;
}
