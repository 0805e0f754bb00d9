use serde::{Deserialize, Serialize};

/// Summary of one match for the match list and chat header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Stable identifier, shared with the conversation keyed by it.
    pub id: String,

    /// Display name of the matched user.
    pub display_name: String,

    /// Avatar to render next to the name (None renders a placeholder).
    pub avatar_url: Option<String>,

    /// Ordered stack tags shown under the name, may be empty.
    pub tags: Vec<String>,
}

/// Ordered set of the signed-in user's matches, most recent first.
///
/// Updated by full fetch (`replace`, last-fetch-wins) and by match-created
/// push events (`upsert_from_event`). One instance exists per session.
#[derive(Debug, Default)]
pub struct MatchSet {
    entries: Vec<MatchSummary>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Replaces the whole set with a fetched list. The previous contents are
    /// discarded unconditionally; there is no merge with stale data.
    pub fn replace(&mut self, list: Vec<MatchSummary>) {
        self.entries = list;
    }

    /// Applies a match announced by a push event. A new match is prepended
    /// (most recent first); an existing entry is left untouched, since the
    /// event payload is minimal and the next full fetch reconciles fields.
    ///
    /// Returns whether an entry was inserted.
    pub fn upsert_from_event(&mut self, summary: MatchSummary) -> bool {
        if self.entries.iter().any(|m| m.id == summary.id) {
            return false;
        }
        self.entries.insert(0, summary);
        true
    }

    pub fn get(&self, id: &str) -> Option<&MatchSummary> {
        self.entries.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn as_slice(&self) -> &[MatchSummary] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
