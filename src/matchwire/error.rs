use thiserror::Error;

use crate::matchwire::subscriptions::Channel;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, MatchwireError>;

#[derive(Error, Debug)]
pub enum MatchwireError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// Transient; retry policy belongs to the caller.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A live binding already exists for the channel. Hitting this through
    /// the session API indicates a subscription lifecycle bug.
    #[error("Already subscribed to channel {0}")]
    AlreadySubscribed(Channel),

    #[error("No session is signed in")]
    NotLoggedIn,

    #[error("A session is already signed in")]
    AlreadyLoggedIn,

    #[error("No active conversation")]
    NoActiveConversation,

    #[error("Unknown match: {0}")]
    MatchNotFound(String),

    #[error("No profiles left to swipe")]
    DeckExhausted,

    /// An async completion arrived after its context was torn down. Never
    /// surfaced past the session boundary; discarded with a debug log.
    #[error("Completion arrived for a torn-down context")]
    StaleResult,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
