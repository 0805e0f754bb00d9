use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Candidate profile shown on the swipe screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCard {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Ordered stack tags, may be empty.
    pub tags: Vec<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwipeDirection {
    Like,
    Pass,
}

/// Outcome of the most recent swipe, kept for the feedback overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeFeedback {
    pub target_id: String,
    pub direction: SwipeDirection,
}

/// Ordered stack of candidate profiles; the front card is swiped first.
///
/// Refilled by full replacement from a profile fetch. A swipe removes the
/// top card immediately; whether it produced a match is announced later on
/// the match-created channel.
#[derive(Debug, Default)]
pub struct SwipeDeck {
    cards: VecDeque<ProfileCard>,
    last_feedback: Option<SwipeFeedback>,
}

impl SwipeDeck {
    pub fn new() -> Self {
        Self {
            cards: VecDeque::new(),
            last_feedback: None,
        }
    }

    /// Replaces the deck with a fetched candidate list.
    pub fn replace(&mut self, cards: Vec<ProfileCard>) {
        self.cards = cards.into();
    }

    /// Removes and returns the top card, remembering the swipe for the
    /// feedback overlay. Returns None on an exhausted deck.
    pub fn swipe(&mut self, direction: SwipeDirection) -> Option<ProfileCard> {
        let card = self.cards.pop_front()?;
        self.last_feedback = Some(SwipeFeedback {
            target_id: card.id.clone(),
            direction,
        });
        Some(card)
    }

    pub fn peek(&self) -> Option<&ProfileCard> {
        self.cards.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfileCard> {
        self.cards.iter()
    }

    pub fn last_feedback(&self) -> Option<&SwipeFeedback> {
        self.last_feedback.as_ref()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
