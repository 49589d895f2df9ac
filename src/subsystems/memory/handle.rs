//! [`SessionHandle`]: cheap, cloneable access to one session's channel logs.
//!
//! Handles are returned by [`SessionMemory::ensure`](super::SessionMemory::ensure).
//! Every operation takes the session's own mutex for the duration of a
//! single read or write, so concurrent requests on the same session are
//! serialised while different sessions never contend.
//!
//! Never hold a handle's lock across an `.await`: read what you need, drop
//! the lock, call out, then append.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{Channel, ChannelLog, ConversationTurn, Role};

/// All channel logs of one session. Always fully materialised.
#[derive(Debug, Default)]
pub(crate) struct SessionLogs {
    logs: [ChannelLog; Channel::ALL.len()],
}

impl SessionLogs {
    pub(crate) fn log(&self, channel: Channel) -> &ChannelLog {
        &self.logs[channel.index()]
    }

    pub(crate) fn log_mut(&mut self, channel: Channel) -> &mut ChannelLog {
        &mut self.logs[channel.index()]
    }

    /// Most recent turn timestamp across all channels.
    pub(crate) fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.logs.iter().filter_map(ChannelLog::last_timestamp).max()
    }
}

/// Per-channel statistics for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub channel: Channel,
    pub message_count: usize,
    pub last_message: Option<DateTime<Utc>>,
}

/// Overview of a session, as printed by the console `/info` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub channels: Vec<ChannelInfo>,
}

/// Shared handle to a single session's logs.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    logs: Arc<Mutex<SessionLogs>>,
    cap: usize,
}

impl SessionHandle {
    pub(crate) fn new(session_id: String, logs: Arc<Mutex<SessionLogs>>, cap: usize) -> Self {
        Self { session_id, logs, cap }
    }

    fn lock(&self) -> MutexGuard<'_, SessionLogs> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the channel's turns, oldest first.
    pub fn history(&self, channel: Channel) -> Vec<ConversationTurn> {
        self.lock().log(channel).to_vec()
    }

    /// Append a turn stamped with the current time.
    pub fn append(&self, channel: Channel, role: Role, content: impl Into<String>) {
        self.append_turn(channel, ConversationTurn::new(role, content));
    }

    /// Append a pre-built turn, then cap the log.
    pub fn append_turn(&self, channel: Channel, turn: ConversationTurn) {
        let mut logs = self.lock();
        let log = logs.log_mut(channel);
        log.push(turn, self.cap);
        tracing::trace!(
            session_id = %self.session_id,
            %channel,
            len = log.len(),
            "turn appended"
        );
    }

    /// Append a user turn and its reply under one lock, so a concurrent
    /// exchange on the same session lands before or after, never between.
    pub fn append_exchange(
        &self,
        channel: Channel,
        user: impl Into<String>,
        reply: impl Into<String>,
    ) {
        let now = Utc::now();
        let mut logs = self.lock();
        let log = logs.log_mut(channel);
        log.push(ConversationTurn::at(Role::User, user, now), self.cap);
        log.push(ConversationTurn::at(Role::Assistant, reply, now), self.cap);
        tracing::trace!(
            session_id = %self.session_id,
            %channel,
            len = log.len(),
            "exchange appended"
        );
    }

    pub fn clear_channel(&self, channel: Channel) {
        self.lock().log_mut(channel).clear();
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.lock().last_activity()
    }

    pub fn info(&self) -> SessionInfo {
        let logs = self.lock();
        SessionInfo {
            session_id: self.session_id.clone(),
            channels: Channel::ALL
                .into_iter()
                .map(|channel| {
                    let log = logs.log(channel);
                    ChannelInfo {
                        channel,
                        message_count: log.len(),
                        last_message: log.last_timestamp(),
                    }
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("cap", &self.cap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(cap: usize) -> SessionHandle {
        SessionHandle::new("s1".into(), Arc::new(Mutex::new(SessionLogs::default())), cap)
    }

    #[test]
    fn channels_are_isolated() {
        let h = handle(10);
        h.append(Channel::Consulting, Role::User, "sơn 2k giá bao nhiêu");
        h.append(Channel::CreateOrder, Role::User, "đặt 2 lon");

        let consulting = h.history(Channel::Consulting);
        assert_eq!(consulting.len(), 1);
        assert_eq!(consulting[0].content, "sơn 2k giá bao nhiêu");
        assert_eq!(h.history(Channel::CreateOrder)[0].content, "đặt 2 lon");
        assert!(h.history(Channel::Classify).is_empty());
    }

    #[test]
    fn concurrent_exchanges_stay_paired() {
        let h = handle(1000);
        let workers: Vec<_> = (0..8)
            .map(|w| {
                let h = h.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        h.append_exchange(Channel::Consulting, format!("hỏi {w}-{i}"), format!("đáp {w}-{i}"));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let history = h.history(Channel::Consulting);
        assert_eq!(history.len(), 400);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content.replacen("hỏi", "đáp", 1), pair[1].content);
        }
    }

    #[test]
    fn exchange_respects_cap() {
        let h = handle(3);
        h.append_exchange(Channel::Consulting, "a", "b");
        h.append_exchange(Channel::Consulting, "c", "d");
        let kept: Vec<_> = h.history(Channel::Consulting).into_iter().map(|t| t.content).collect();
        assert_eq!(kept, ["b", "c", "d"]);
    }

    #[test]
    fn clones_share_state() {
        let a = handle(10);
        let b = a.clone();
        a.append(Channel::Consulting, Role::Assistant, "dạ");
        assert_eq!(b.history(Channel::Consulting).len(), 1);
    }

    #[test]
    fn clear_channel_leaves_others() {
        let h = handle(10);
        h.append(Channel::Consulting, Role::User, "a");
        h.append(Channel::CheckOrder, Role::User, "b");
        h.clear_channel(Channel::Consulting);
        assert!(h.history(Channel::Consulting).is_empty());
        assert_eq!(h.history(Channel::CheckOrder).len(), 1);
    }

    #[test]
    fn info_reports_every_channel() {
        let h = handle(10);
        h.append(Channel::Consulting, Role::User, "a");
        let info = h.info();
        assert_eq!(info.channels.len(), Channel::ALL.len());
        let consulting = info
            .channels
            .iter()
            .find(|c| c.channel == Channel::Consulting)
            .unwrap();
        assert_eq!(consulting.message_count, 1);
        assert!(consulting.last_message.is_some());
    }
}
