//! Core value types for the memory subsystem.
//!
//! * [`Channel`]: the agent-specific conversation track a turn belongs to.
//!   Closed set: every session carries one log per channel.
//! * [`ConversationTurn`]: one timestamped user or assistant message.
//! * [`ChannelLog`]: capacity-bounded, FIFO-evicting sequence of turns.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Channel ──────────────────────────────────────────────────────────────────

/// Agent channel partitioning a session's memory.
///
/// Each agent handler reads and writes only its own channel so that, e.g.,
/// order-intake dialogue never leaks into the consulting prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Intent classification of the raw utterance.
    Classify,
    /// Order intake dialogue.
    CreateOrder,
    /// Product consulting (the retrieval-backed channel).
    Consulting,
    /// Order status lookup.
    CheckOrder,
}

impl Channel {
    /// Every channel, in the order logs are materialised.
    pub const ALL: [Channel; 4] = [
        Channel::Classify,
        Channel::CreateOrder,
        Channel::Consulting,
        Channel::CheckOrder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Classify => "classify",
            Channel::CreateOrder => "create_order",
            Channel::Consulting => "consulting",
            Channel::CheckOrder => "check_order",
        }
    }

    /// Position of this channel in [`Channel::ALL`].
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown channel: {s}"))
    }
}

// ── Role ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ConversationTurn ─────────────────────────────────────────────────────────

/// A single message in a channel log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, Utc::now())
    }

    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { role, content: content.into(), timestamp }
    }
}

// ── ChannelLog ───────────────────────────────────────────────────────────────

/// Ordered turns for one (session, channel) pair.
///
/// Holds at most `cap` turns; pushing past the cap drops from the front.
#[derive(Debug, Clone, Default)]
pub struct ChannelLog {
    turns: VecDeque<ConversationTurn>,
}

impl ChannelLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `turn`, then evict the oldest turns until `len() <= cap`.
    pub fn push(&mut self, turn: ConversationTurn, cap: usize) {
        self.turns.push_back(turn);
        self.truncate_front(cap);
    }

    /// Keep only the newest `cap` turns.
    pub fn truncate_front(&mut self, cap: usize) {
        while self.turns.len() > cap {
            self.turns.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.turns.back().map(|t| t.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Snapshot of all turns, oldest first.
    pub fn to_vec(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }
}

impl FromIterator<ConversationTurn> for ChannelLog {
    fn from_iter<I: IntoIterator<Item = ConversationTurn>>(iter: I) -> Self {
        Self { turns: iter.into_iter().collect() }
    }
}
