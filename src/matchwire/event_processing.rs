use std::sync::{Arc, Weak};

use tokio::sync::mpsc::Receiver;

use crate::matchwire::Matchwire;
use crate::matchwire::conversation::{AppendOutcome, Message};
use crate::matchwire::error::Result;
use crate::matchwire::matches::MatchSummary;
use crate::matchwire::streams::{ConversationUpdate, UpdateTrigger};
use crate::matchwire::subscriptions::Channel;
use crate::types::PushEvent;

impl Matchwire {
    // ============================================================================
    // EVENT PROCESSING
    // ============================================================================

    /// Start the event processing loop in a background task. The task holds
    /// a weak reference so dropping the last session handle ends the loop.
    pub(crate) fn start_event_processing_loop(
        matchwire: &Arc<Matchwire>,
        receiver: Receiver<PushEvent>,
        shutdown_receiver: Receiver<()>,
    ) {
        let weak = Arc::downgrade(matchwire);
        tokio::spawn(async move {
            Self::process_events(weak, receiver, shutdown_receiver).await;
        });
    }

    /// Main event processing loop. Events for a channel apply in delivery
    /// order; the loop never reorders across channels.
    async fn process_events(
        matchwire: Weak<Matchwire>,
        mut receiver: Receiver<PushEvent>,
        mut shutdown: Receiver<()>,
    ) {
        tracing::debug!(
            target: "matchwire::process_events",
            "Starting event processing loop"
        );

        let mut shutting_down = false;

        loop {
            tokio::select! {
                Some(event) = receiver.recv() => {
                    let Some(matchwire) = matchwire.upgrade() else {
                        break;
                    };

                    match event {
                        PushEvent::MatchCreated { subscription_id, summary } => {
                            if let Err(e) = matchwire.process_match_created(summary, &subscription_id).await {
                                tracing::error!(
                                    target: "matchwire::process_events",
                                    "Error processing match event: {}",
                                    e
                                );
                            }
                        }
                        PushEvent::MessageReceived { subscription_id, message } => {
                            if let Err(e) = matchwire.process_message_received(message, &subscription_id).await {
                                tracing::error!(
                                    target: "matchwire::process_events",
                                    "Error processing message event: {}",
                                    e
                                );
                            }
                        }
                        PushEvent::ChannelNotice { subscription_id, detail } => {
                            matchwire.process_channel_notice(&subscription_id, &detail);
                        }
                    }
                }
                Some(_) = shutdown.recv(), if !shutting_down => {
                    tracing::info!(
                        target: "matchwire::process_events",
                        "Received shutdown signal, finishing current queue..."
                    );
                    shutting_down = true;
                    // Continue processing remaining events in queue, but don't wait for new shutdown signals
                }
                else => {
                    if shutting_down {
                        tracing::debug!(
                            target: "matchwire::process_events",
                            "Queue flushed, shutting down event processor"
                        );
                    } else {
                        tracing::debug!(
                            target: "matchwire::process_events",
                            "All channels closed, exiting event processing loop"
                        );
                    }
                    break;
                }
            }
        }
    }

    /// Applies a pushed match-created event. Events tagged with anything but
    /// the live match-channel subscription id are stale replays and dropped.
    pub(crate) async fn process_match_created(
        &self,
        summary: MatchSummary,
        subscription_id: &str,
    ) -> Result<()> {
        if !self
            .registry
            .is_current(&Channel::Matches, subscription_id)
            .await
        {
            tracing::debug!(
                target: "matchwire::process_match_created",
                "Dropping match event from stale subscription {}",
                subscription_id
            );
            return Ok(());
        }

        let mut state = self.state.write().await;
        let Some(session) = state.as_mut() else {
            tracing::debug!(
                target: "matchwire::process_match_created",
                "Dropping match event: no signed-in session"
            );
            return Ok(());
        };

        if session.matches.upsert_from_event(summary.clone()) {
            tracing::info!(
                target: "matchwire::process_match_created",
                "New match {} ({})",
                summary.id,
                summary.display_name
            );
        }
        Ok(())
    }

    /// Applies a pushed message to the active conversation's log. Messages
    /// for a released or superseded conversation channel are dropped.
    pub(crate) async fn process_message_received(
        &self,
        message: Message,
        subscription_id: &str,
    ) -> Result<()> {
        let channel = Channel::Conversation(message.match_id.clone());
        if !self.registry.is_current(&channel, subscription_id).await {
            tracing::debug!(
                target: "matchwire::process_message_received",
                "Dropping message from stale subscription {}",
                subscription_id
            );
            return Ok(());
        }

        let match_id = message.match_id.clone();
        let update = {
            let mut state = self.state.write().await;
            let Some(session) = state.as_mut() else {
                tracing::debug!(
                    target: "matchwire::process_message_received",
                    "Dropping message: no signed-in session"
                );
                return Ok(());
            };
            if session.active_conversation.as_deref() != Some(match_id.as_str()) {
                tracing::debug!(
                    target: "matchwire::process_message_received",
                    "Dropping message for inactive conversation {}",
                    match_id
                );
                return Ok(());
            }

            let pushed = message.clone();
            let log = session.conversations.open(&match_id);
            match log.append_from_event(message) {
                AppendOutcome::Inserted => Some(ConversationUpdate {
                    trigger: UpdateTrigger::NewMessage,
                    message: pushed,
                }),
                AppendOutcome::Reconciled => {
                    log.get(&pushed.id).cloned().map(|message| ConversationUpdate {
                        trigger: UpdateTrigger::DeliveryConfirmed,
                        message,
                    })
                }
                AppendOutcome::Duplicate => {
                    tracing::debug!(
                        target: "matchwire::process_message_received",
                        "Duplicate message {} dropped",
                        pushed.id
                    );
                    None
                }
            }
        };

        if let Some(update) = update {
            self.streams.emit(&match_id, update);
        }
        Ok(())
    }

    /// Transport notices are logged for monitoring only.
    pub(crate) fn process_channel_notice(&self, subscription_id: &str, detail: &str) {
        tracing::debug!(
            target: "matchwire::process_channel_notice",
            "Notice on {}: {}",
            subscription_id,
            detail
        );
    }
}
